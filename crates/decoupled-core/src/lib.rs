//! decoupled-core
//!
//! Shared types and traits for decoupled identities.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (IdentityId, ExternalId, ProfileId)
//! - [`traits`] - Ownership trait for secondary records (Owned)
//! - [`error`] - Store failure taxonomy (StoreError)
//!
//! # Example
//!
//! ```
//! use decoupled_core::{IdentityId, StoreError, StoreResult};
//!
//! fn load(id: IdentityId) -> StoreResult<()> {
//!     Err(StoreError::not_found("Identity", id))
//! }
//!
//! assert!(load(IdentityId::new(1)).is_err());
//! ```

pub mod error;
pub mod ids;
pub mod traits;

// Re-export main types for convenient access
pub use error::{StoreError, StoreOperation, StoreResult};
pub use ids::{ExternalId, IdentityId, ParseIdError, ProfileId};
pub use traits::Owned;
