//! Ownership Traits
//!
//! Secondary records (profiles and similar per-bundle data) point back at
//! the identity that owns them. The link is a weak back-reference: the owner
//! may have been deleted by something outside this workspace, so consumers
//! must treat a dangling owner as "skip", never as a failure.
//!
//! # Example
//!
//! ```
//! use decoupled_core::{IdentityId, Owned};
//!
//! struct Address {
//!     owner: Option<IdentityId>,
//! }
//!
//! impl Owned for Address {
//!     fn owner_id(&self) -> Option<IdentityId> {
//!         self.owner
//!     }
//! }
//!
//! let address = Address { owner: Some(IdentityId::new(3)) };
//! assert!(address.is_owned_by(IdentityId::new(3)));
//! ```

use crate::ids::IdentityId;

/// Trait for records linked to exactly one owning identity.
///
/// This trait is object-safe.
pub trait Owned {
    /// The owning identity, if one has been assigned yet.
    fn owner_id(&self) -> Option<IdentityId>;

    /// Whether this record is owned by `identity`.
    fn is_owned_by(&self, identity: IdentityId) -> bool {
        self.owner_id() == Some(identity)
    }
}
