//! Strongly Typed Identifiers
//!
//! Identity records carry two identifiers: a store-allocated serial
//! [`IdentityId`] that grows in creation order, and a globally unique
//! [`ExternalId`]. Secondary records use [`ProfileId`].
//!
//! # Example
//!
//! ```
//! use decoupled_core::{ExternalId, IdentityId};
//!
//! let id = IdentityId::new(7);
//! let external = ExternalId::new();
//!
//! fn requires_identity(id: IdentityId) -> u64 {
//!     id.get()
//! }
//!
//! assert_eq!(requires_identity(id), 7);
//! // requires_identity(external); // This would not compile!
//! # let _ = external;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse
    pub id_type: &'static str,
    /// The underlying parse error message
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to define a UUID-backed identifier type
macro_rules! define_uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }
    };
}

/// Store-allocated identifier of an identity record.
///
/// Stores hand these out monotonically, so ordering by `IdentityId` is
/// ordering by creation. Match results rely on that for a reproducible
/// "first match".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(u64);

impl IdentityId {
    /// Wraps a raw serial value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw serial value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for IdentityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IdentityId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse::<u64>().map(Self).map_err(|e| ParseIdError {
            id_type: "IdentityId",
            message: e.to_string(),
        })
    }
}

impl From<u64> for IdentityId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

define_uuid_id!(
    /// Globally unique identifier of an identity record.
    ///
    /// Unlike [`IdentityId`] this value is meaningful outside the store
    /// (sync, export) and survives a merge unchanged.
    ///
    /// # Example
    ///
    /// ```
    /// use decoupled_core::ExternalId;
    ///
    /// let id: ExternalId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
    /// assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    /// ```
    ExternalId
);

define_uuid_id!(
    /// Identifier of a secondary profile-like record.
    ProfileId
);
