//! Common test utilities for decoupled-auth integration tests.
//!
//! All tests use in-memory stores for isolation and speed.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::{Arc, Once};

use decoupled_auth::audit::InMemoryAcquisitionAuditStore;
use decoupled_auth::config::{AcquisitionSettings, StaticSettingsProvider};
use decoupled_auth::policy::FieldMatchPolicy;
use decoupled_auth::services::{
    AcquisitionService, InMemoryProfileStore, ProfileService, RegistrationService,
};
use decoupled_auth::store::InMemoryIdentityStore;

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

/// Stores all the in-memory stores for test isolation.
#[derive(Clone)]
pub struct TestStores {
    pub identity_store: Arc<InMemoryIdentityStore>,
    pub profile_store: Arc<InMemoryProfileStore>,
    pub audit_store: Arc<InMemoryAcquisitionAuditStore>,
    pub settings: Arc<StaticSettingsProvider>,
}

impl TestStores {
    /// Create a new set of isolated test stores. Registration acquisition
    /// starts disabled.
    pub fn new() -> Self {
        Self {
            identity_store: Arc::new(InMemoryIdentityStore::new()),
            profile_store: Arc::new(InMemoryProfileStore::new()),
            audit_store: Arc::new(InMemoryAcquisitionAuditStore::new()),
            settings: Arc::new(StaticSettingsProvider::default()),
        }
    }

    /// Reset all stores to empty state and stop injecting failures.
    pub async fn reset(&self) {
        self.audit_store.clear().await;
        self.profile_store.clear().await;
        self.identity_store.clear().await;
        self.identity_store.clear_failures().await;
    }
}

impl Default for TestStores {
    fn default() -> Self {
        Self::new()
    }
}

/// All services for integration testing.
pub struct TestServices {
    pub acquisition: Arc<AcquisitionService>,
    pub registration: RegistrationService,
    pub profile: ProfileService,
}

impl TestServices {
    /// Create a new set of services backed by the provided stores.
    pub fn new(stores: &TestStores) -> Self {
        let acquisition = Arc::new(AcquisitionService::new(
            stores.identity_store.clone(),
            Arc::new(FieldMatchPolicy::default()),
            stores.audit_store.clone(),
        ));
        Self {
            registration: RegistrationService::new(acquisition.clone(), stores.settings.clone()),
            profile: ProfileService::new(stores.profile_store.clone(), acquisition.clone()),
            acquisition,
        }
    }
}

/// Test context containing stores and services.
pub struct TestContext {
    pub stores: TestStores,
    pub services: TestServices,
}

impl TestContext {
    /// Create a new isolated test context.
    pub fn new() -> Self {
        init_test_logging();
        let stores = TestStores::new();
        let services = TestServices::new(&stores);
        Self { stores, services }
    }

    /// Turn registration acquisition on or off.
    pub fn set_registration(&self, enabled: bool, prefer_first: bool) {
        self.stores.settings.set(AcquisitionSettings {
            registration_enabled: enabled,
            registration_prefer_first: prefer_first,
        });
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
