//! Error types for decoupled-auth.
//!
//! Only store failures and operator misconfiguration are hard errors.
//! Ambiguous matches, missing owners and schema drift are reported on the
//! returned outcome instead (see [`crate::types::AmbiguousMatch`],
//! [`crate::services::profile::MissingOwner`] and
//! [`crate::services::reconcile::SkippedField`]).

use decoupled_core::StoreError;
use thiserror::Error;

/// Errors that can occur during acquisition, registration and coupling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    /// Storage collaborator failure, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration value is invalid.
    #[error("Configuration invalid for {var}: {reason}")]
    ConfigInvalid { var: String, reason: String },
}

impl AcquisitionError {
    /// Returns true if this error came from the storage collaborator.
    #[must_use]
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Result type for acquisition operations.
pub type Result<T> = std::result::Result<T, AcquisitionError>;
