//! Acquisition, merge and coupling of identities without login credentials.
//!
//! A "decoupled" identity is an account record with no login name, e.g. one
//! created from an order or a customer profile that only carried an email.
//! This crate finds or creates such records from partial match data, and
//! later merges them into a real account when the person registers.
//!
//! # Features
//!
//! - Find-or-create by candidate field values with Default and First modes
//! - Ambiguity signalling when several records match
//! - Field reconciliation when a registration claims a decoupled record
//! - Decoupled/Coupled lifecycle derived from the login-name field
//! - Profile ownership with tolerance for deleted owners
//! - Operator settings read on every registration
//! - Audit logging keyed by the caller's context label
//!
//! # Services
//!
//! The [`services`] module provides business logic for:
//! - [`services::AcquisitionService`] - Find or create identity records
//! - [`services::FieldReconciler`] - Merge an acquired record into a new entity
//! - [`services::RegistrationService`] - Registration-time acquisition and decoupling
//! - [`services::ProfileService`] - Link profiles to their owning identities
//!
//! # Audit
//!
//! The [`audit`] module provides:
//! - [`audit::AcquisitionAuditStore`] trait for pluggable storage backends
//! - [`audit::InMemoryAcquisitionAuditStore`] for testing

pub mod audit;
pub mod config;
pub mod coupling;
pub mod error;
pub mod policy;
pub mod record;
pub mod services;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{
    AcquisitionSettings, EnvSettingsProvider, SettingsProvider, StaticSettingsProvider,
};
pub use coupling::CouplingState;
pub use error::{AcquisitionError, Result};
pub use policy::{FieldMatchPolicy, MatchPolicy};
pub use record::{FieldMap, IdentityRecord};
pub use store::{FieldCondition, IdentityStore, InMemoryIdentityStore};
pub use types::{
    AcquisitionContext, AcquisitionMethod, AcquisitionResult, AmbiguousMatch, BehaviorMode,
};

// Re-export service types
pub use services::{
    AcquisitionService, FieldReconciler, MergeReport, Profile, ProfileService,
    RegistrationOutcome, RegistrationService,
};
