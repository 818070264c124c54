//! Decoupled/Coupled lifecycle of an identity record.
//!
//! ```text
//!            couple()
//!   Decoupled ───────► Coupled
//!       ▲                 │
//!       └─────────────────┘
//!            decouple()
//! ```
//!
//! The state is derived: `decoupled == (login name is unset)`. Stores call
//! [`IdentityRecord::recompute_decoupled`] after every load, and the record
//! recomputes on its own whenever the login-name field is written.
//! [`IdentityRecord::couple`] only clears the flag; the caller sets the
//! login name and credential around it.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::record::{IdentityRecord, CREDENTIAL_FIELD, LOGIN_NAME_FIELD};

/// Coupling state of an identity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouplingState {
    /// No login credentials.
    Decoupled,
    /// Has login credentials.
    Coupled,
}

impl fmt::Display for CouplingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decoupled => write!(f, "decoupled"),
            Self::Coupled => write!(f, "coupled"),
        }
    }
}

impl IdentityRecord {
    /// Whether the record currently has no login credentials.
    #[must_use]
    pub fn is_decoupled(&self) -> bool {
        self.decoupled
    }

    /// Current coupling state.
    #[must_use]
    pub fn state(&self) -> CouplingState {
        if self.decoupled {
            CouplingState::Decoupled
        } else {
            CouplingState::Coupled
        }
    }

    /// Re-derive the decoupled flag from the login-name field.
    pub fn recompute_decoupled(&mut self) -> CouplingState {
        self.decoupled = self.login_name().is_none();
        self.state()
    }

    /// Transition to `Coupled`. Returns the previous state.
    ///
    /// No fields are touched. If the login name is still unset the next
    /// recompute flips the record back to `Decoupled`.
    pub fn couple(&mut self) -> CouplingState {
        let previous = self.state();
        self.decoupled = false;
        debug!(identity_id = ?self.id, from = %previous, "Identity coupled");
        previous
    }

    /// Transition to `Decoupled`. Returns the previous state.
    ///
    /// Login name and credential are set to null; their old values are
    /// discarded.
    pub fn decouple(&mut self) -> CouplingState {
        let previous = self.state();
        self.fields
            .insert(LOGIN_NAME_FIELD.to_string(), serde_json::Value::Null);
        self.fields
            .insert(CREDENTIAL_FIELD.to_string(), serde_json::Value::Null);
        self.decoupled = true;
        debug!(identity_id = ?self.id, from = %previous, "Identity decoupled");
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MAIL_FIELD;
    use serde_json::Value;

    fn coupled_record() -> IdentityRecord {
        IdentityRecord::new()
            .with_field(LOGIN_NAME_FIELD, "carol")
            .with_field(CREDENTIAL_FIELD, "$2y$hash")
            .with_field(MAIL_FIELD, "carol@example.com")
    }

    #[test]
    fn test_state_follows_login_name() {
        assert_eq!(coupled_record().state(), CouplingState::Coupled);
        assert_eq!(IdentityRecord::new().state(), CouplingState::Decoupled);
    }

    #[test]
    fn test_decouple_clears_credentials() {
        let mut record = coupled_record();
        let previous = record.decouple();

        assert_eq!(previous, CouplingState::Coupled);
        assert!(record.is_decoupled());
        assert_eq!(record.field(LOGIN_NAME_FIELD), Some(&Value::Null));
        assert_eq!(record.field(CREDENTIAL_FIELD), Some(&Value::Null));
        assert_eq!(record.mail(), Some("carol@example.com"));
    }

    #[test]
    fn test_decouple_is_reentrant() {
        let mut record = IdentityRecord::new();
        assert_eq!(record.decouple(), CouplingState::Decoupled);
        assert!(record.is_decoupled());
    }

    #[test]
    fn test_couple_then_set_name_survives_recompute() {
        let mut record = IdentityRecord::new().with_field(MAIL_FIELD, "dan@example.com");
        assert_eq!(record.couple(), CouplingState::Decoupled);
        record.set_field(LOGIN_NAME_FIELD, "dan");
        assert_eq!(record.recompute_decoupled(), CouplingState::Coupled);
    }

    #[test]
    fn test_couple_without_name_reverts_on_recompute() {
        let mut record = IdentityRecord::new();
        record.couple();
        assert!(!record.is_decoupled());
        assert_eq!(record.recompute_decoupled(), CouplingState::Decoupled);
    }

    #[test]
    fn test_flag_matches_login_name_after_transitions() {
        let mut record = coupled_record();
        record.decouple();
        assert_eq!(record.is_decoupled(), record.login_name().is_none());
        record.set_field(LOGIN_NAME_FIELD, "carol2");
        record.couple();
        assert_eq!(record.is_decoupled(), record.login_name().is_none());
    }
}
