//! Test fixtures factory for integration tests.

use decoupled_auth::record::{
    FieldMap, IdentityRecord, CREDENTIAL_FIELD, DECOUPLED_PSEUDO_FIELD, LOGIN_NAME_FIELD,
    MAIL_FIELD,
};
use decoupled_auth::store::IdentityStore;
use decoupled_auth::types::AcquisitionContext;
use decoupled_core::IdentityId;
use serde_json::{json, Value};

use super::TestContext;

/// Build a field map from pairs.
pub fn values(pairs: &[(&str, Value)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

/// Candidate set matching decoupled records by email.
pub fn decoupled_by_mail(mail: &str) -> FieldMap {
    values(&[(MAIL_FIELD, json!(mail)), (DECOUPLED_PSEUDO_FIELD, json!(true))])
}

/// The checkout-style context: Default mode, creates decoupled records.
pub fn checkout_context() -> AcquisitionContext {
    AcquisitionContext::new("checkout").create_decoupled()
}

/// A registration form submission.
pub fn registration(name: &str, mail: &str) -> IdentityRecord {
    IdentityRecord::new()
        .with_field(LOGIN_NAME_FIELD, name)
        .with_field(CREDENTIAL_FIELD, "$2y$10$hashed")
        .with_field(MAIL_FIELD, mail)
}

/// Insert a decoupled identity directly into the store.
pub async fn create_decoupled(ctx: &TestContext, mail: &str, extra: &[(&str, Value)]) -> IdentityRecord {
    let mut fields = values(extra);
    fields.insert(MAIL_FIELD.to_string(), json!(mail));
    ctx.stores
        .identity_store
        .create(fields)
        .await
        .expect("Failed to create decoupled identity")
}

/// Insert a coupled identity directly into the store.
pub async fn create_coupled(ctx: &TestContext, name: &str, mail: &str) -> IdentityRecord {
    let fields = values(&[
        (LOGIN_NAME_FIELD, json!(name)),
        (CREDENTIAL_FIELD, json!("$2y$10$hashed")),
        (MAIL_FIELD, json!(mail)),
    ]);
    ctx.stores
        .identity_store
        .create(fields)
        .await
        .expect("Failed to create coupled identity")
}

/// Load an identity, panicking if it is gone.
pub async fn load(ctx: &TestContext, id: IdentityId) -> IdentityRecord {
    ctx.stores
        .identity_store
        .load(id)
        .await
        .expect("Load failed")
        .unwrap_or_else(|| panic!("Identity {id} not found"))
}
