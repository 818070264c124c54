//! Service layer for decoupled identities.
//!
//! This module provides the acquisition engine and the workflows built on it:
//! merge-on-acquire, registration and profile ownership.

pub mod acquisition;
pub mod profile;
pub mod reconcile;
pub mod registration;

// Re-export commonly used types
pub use acquisition::AcquisitionService;
pub use profile::{
    InMemoryProfileStore, MailPropagation, MissingOwner, OwnerResolution, Profile, ProfileService,
    ProfileStore,
};
pub use reconcile::{FieldReconciler, MergeReport, SkipReason, SkippedField};
pub use registration::{RegistrationOutcome, RegistrationService, REGISTRATION_LABEL};
