//! Store Error Types
//!
//! Every identity and profile store reports failures through [`StoreError`].
//! The acquisition engine never swallows or retries these; they reach the
//! caller unchanged because the caller owns the transaction boundary.
//!
//! # Example
//!
//! ```
//! use decoupled_core::{StoreError, StoreOperation, StoreResult};
//!
//! fn lookup(healthy: bool) -> StoreResult<u64> {
//!     if !healthy {
//!         return Err(StoreError::Backend {
//!             operation: StoreOperation::Find,
//!             message: "connection reset".to_string(),
//!         });
//!     }
//!     Ok(1)
//! }
//!
//! assert!(lookup(false).is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The store operation a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOperation {
    /// Query by field conditions.
    Find,
    /// Create a new record from an initial field set.
    Create,
    /// Load several records by id.
    Load,
    /// Insert or update a record.
    Save,
}

impl StoreOperation {
    /// Stable lowercase name, used in logs and serialized errors.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::Create => "create",
            Self::Load => "load",
            Self::Save => "save",
        }
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreError {
    /// The backend could not complete the operation.
    #[error("Store {operation} failed: {message}")]
    Backend {
        /// Operation that failed
        operation: StoreOperation,
        /// Backend-provided description
        message: String,
    },

    /// An update targeted a key that does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of record (e.g., "Identity", "Profile")
        resource: String,
        /// Identifier that was looked up
        id: String,
    },

    /// An insert collided with an existing key.
    #[error("Store conflict: {message}")]
    Conflict {
        /// Description of the colliding key
        message: String,
    },
}

impl StoreError {
    /// Convenience constructor for [`StoreError::Backend`].
    pub fn backend(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`StoreError::NotFound`].
    pub fn not_found(resource: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }
}

/// Type alias for Results using `StoreError`.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
