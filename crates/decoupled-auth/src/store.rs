//! Identity storage trait and in-memory implementation.
//!
//! The engine only ever talks to an [`IdentityStore`]. Real deployments back
//! it with their own persistence; [`InMemoryIdentityStore`] is the reference
//! collaborator used by tests and embedders.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use decoupled_core::{ExternalId, IdentityId, StoreError, StoreOperation, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::record::{FieldMap, IdentityRecord};

// ============================================================================
// Query Conditions
// ============================================================================

/// A single field constraint in a store query.
///
/// Conditions on multi-valued (array) fields match when any element matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FieldCondition {
    /// Exact equality.
    Equals { field: String, value: Value },
    /// String equality ignoring case.
    EqualsIgnoreCase { field: String, value: String },
    /// Field is absent or empty.
    IsNull { field: String },
    /// Field is present and non-empty.
    IsNotNull { field: String },
}

impl FieldCondition {
    /// Exact equality condition.
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive string equality condition.
    pub fn equals_ignore_case(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::EqualsIgnoreCase {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field-is-unset condition.
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::IsNull {
            field: field.into(),
        }
    }

    /// Field-is-set condition.
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::IsNotNull {
            field: field.into(),
        }
    }

    /// The field this condition constrains.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Equals { field, .. }
            | Self::EqualsIgnoreCase { field, .. }
            | Self::IsNull { field }
            | Self::IsNotNull { field } => field,
        }
    }

    /// Evaluate this condition against a record.
    #[must_use]
    pub fn matches(&self, record: &IdentityRecord) -> bool {
        match self {
            Self::Equals { field, value } => record
                .field(field)
                .is_some_and(|actual| any_element(actual, |v| v == value)),
            Self::EqualsIgnoreCase { field, value } => {
                let expected = value.to_lowercase();
                record.field(field).is_some_and(|actual| {
                    any_element(actual, |v| {
                        v.as_str().is_some_and(|s| s.to_lowercase() == expected)
                    })
                })
            }
            Self::IsNull { field } => record.field_is_empty(field),
            Self::IsNotNull { field } => !record.field_is_empty(field),
        }
    }
}

fn any_element(actual: &Value, predicate: impl Fn(&Value) -> bool) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(&predicate),
        other => predicate(other),
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Trait for identity storage backends.
///
/// Implementations recompute each record's decoupled flag before handing it
/// out (see [`IdentityRecord::hydrate`]).
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Records satisfying every condition, ordered by ascending id.
    ///
    /// An empty result is not an error.
    async fn find_by_fields(&self, conditions: &[FieldCondition])
        -> StoreResult<Vec<IdentityRecord>>;

    /// Create and persist a record from an initial field set.
    async fn create(&self, initial: FieldMap) -> StoreResult<IdentityRecord>;

    /// Load records by id, ordered by ascending id. Unknown ids are skipped.
    async fn load_multiple(&self, ids: &[IdentityId]) -> StoreResult<Vec<IdentityRecord>>;

    /// Insert when [`IdentityRecord::is_new`], otherwise update the record
    /// stored under its id. Returns the persisted record.
    async fn save(&self, record: &IdentityRecord) -> StoreResult<IdentityRecord>;

    /// Load a single record.
    async fn load(&self, id: IdentityId) -> StoreResult<Option<IdentityRecord>> {
        Ok(self.load_multiple(&[id]).await?.into_iter().next())
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

#[derive(Debug, Clone)]
struct StoredIdentity {
    external_id: ExternalId,
    created_at: DateTime<Utc>,
    fields: FieldMap,
}

/// In-memory identity store.
#[derive(Debug)]
pub struct InMemoryIdentityStore {
    records: Arc<RwLock<BTreeMap<IdentityId, StoredIdentity>>>,
    next_id: AtomicU64,
    failures: Arc<RwLock<HashSet<StoreOperation>>>,
}

impl Default for InMemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIdentityStore {
    /// Create a new, empty store. Ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: AtomicU64::new(1),
            failures: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Make every subsequent call of `operation` fail (for testing).
    pub async fn fail_on(&self, operation: StoreOperation) {
        self.failures.write().await.insert(operation);
    }

    /// Stop injecting failures.
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Drop every record and restart ids at 1 (for testing).
    pub async fn clear(&self) {
        self.records.write().await.clear();
        self.next_id.store(1, Ordering::SeqCst);
    }

    /// Remove a record outright, bypassing any engine logic (for testing).
    pub async fn remove(&self, id: IdentityId) -> bool {
        self.records.write().await.remove(&id).is_some()
    }

    async fn check(&self, operation: StoreOperation) -> StoreResult<()> {
        if self.failures.read().await.contains(&operation) {
            return Err(StoreError::backend(operation, "injected failure"));
        }
        Ok(())
    }

    fn allocate_id(&self) -> IdentityId {
        IdentityId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn reserve_id(&self, id: IdentityId) {
        self.next_id.fetch_max(id.get() + 1, Ordering::SeqCst);
    }
}

fn to_record(id: IdentityId, stored: &StoredIdentity) -> IdentityRecord {
    IdentityRecord::hydrate(
        id,
        stored.external_id,
        stored.created_at,
        stored.fields.clone(),
    )
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_by_fields(
        &self,
        conditions: &[FieldCondition],
    ) -> StoreResult<Vec<IdentityRecord>> {
        self.check(StoreOperation::Find).await?;
        let records = self.records.read().await;

        // BTreeMap iteration is ascending by id, i.e. creation order.
        Ok(records
            .iter()
            .map(|(id, stored)| to_record(*id, stored))
            .filter(|record| conditions.iter().all(|c| c.matches(record)))
            .collect())
    }

    async fn create(&self, initial: FieldMap) -> StoreResult<IdentityRecord> {
        self.check(StoreOperation::Create).await?;
        let id = self.allocate_id();
        let stored = StoredIdentity {
            external_id: ExternalId::new(),
            created_at: Utc::now(),
            fields: initial,
        };
        let record = to_record(id, &stored);
        self.records.write().await.insert(id, stored);
        Ok(record)
    }

    async fn load_multiple(&self, ids: &[IdentityId]) -> StoreResult<Vec<IdentityRecord>> {
        self.check(StoreOperation::Load).await?;
        let records = self.records.read().await;

        let mut wanted: Vec<IdentityId> = ids.to_vec();
        wanted.sort_unstable();
        wanted.dedup();

        Ok(wanted
            .into_iter()
            .filter_map(|id| records.get(&id).map(|stored| to_record(id, stored)))
            .collect())
    }

    async fn save(&self, record: &IdentityRecord) -> StoreResult<IdentityRecord> {
        self.check(StoreOperation::Save).await?;
        let mut records = self.records.write().await;

        if record.is_new() {
            let id = match record.id {
                Some(id) if records.contains_key(&id) => {
                    return Err(StoreError::Conflict {
                        message: format!("identity {id} already exists"),
                    });
                }
                Some(id) => {
                    self.reserve_id(id);
                    id
                }
                None => self.allocate_id(),
            };
            let stored = StoredIdentity {
                external_id: record.external_id.unwrap_or_default(),
                created_at: record.created_at.unwrap_or_else(Utc::now),
                fields: record.fields.clone(),
            };
            let saved = to_record(id, &stored);
            records.insert(id, stored);
            return Ok(saved);
        }

        // is_new() is false only when an id is present.
        let id = record
            .id
            .ok_or_else(|| StoreError::not_found("Identity", "<unsaved>"))?;
        let stored = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Identity", id))?;
        if let Some(external_id) = record.external_id {
            stored.external_id = external_id;
        }
        if let Some(created_at) = record.created_at {
            stored.created_at = created_at;
        }
        stored.fields = record.fields.clone();
        Ok(to_record(id, stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{LOGIN_NAME_FIELD, MAIL_FIELD, ROLES_FIELD};
    use serde_json::json;

    fn mail_fields(mail: &str) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert(MAIL_FIELD.to_string(), json!(mail));
        fields
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let store = InMemoryIdentityStore::new();
        let first = store.create(mail_fields("a@example.com")).await.unwrap();
        let second = store.create(mail_fields("b@example.com")).await.unwrap();

        assert!(first.id.unwrap() < second.id.unwrap());
        assert!(first.external_id.is_some());
        assert!(first.created_at.is_some());
        assert!(first.is_decoupled());
        assert!(!first.is_new());
    }

    #[tokio::test]
    async fn test_clear_empties_store_and_restarts_ids() {
        let store = InMemoryIdentityStore::new();
        store.create(mail_fields("a@example.com")).await.unwrap();
        store.create(mail_fields("b@example.com")).await.unwrap();

        store.clear().await;
        assert!(store.is_empty().await);

        let created = store.create(mail_fields("c@example.com")).await.unwrap();
        assert_eq!(created.id, Some(IdentityId::new(1)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_find_is_ordered_by_creation() {
        let store = InMemoryIdentityStore::new();
        for _ in 0..3 {
            store.create(mail_fields("same@example.com")).await.unwrap();
        }

        let found = store
            .find_by_fields(&[FieldCondition::equals(MAIL_FIELD, "same@example.com")])
            .await
            .unwrap();
        let ids: Vec<u64> = found.iter().map(|r| r.id.unwrap().get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_find_no_match_is_empty() {
        let store = InMemoryIdentityStore::new();
        store.create(mail_fields("a@example.com")).await.unwrap();

        let found = store
            .find_by_fields(&[FieldCondition::equals(MAIL_FIELD, "z@example.com")])
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_conditions_ignore_case_and_null() {
        let store = InMemoryIdentityStore::new();
        store.create(mail_fields("Mixed@Example.com")).await.unwrap();
        let mut coupled = mail_fields("mixed@example.com");
        coupled.insert(LOGIN_NAME_FIELD.to_string(), json!("mixed"));
        store.create(coupled).await.unwrap();

        let decoupled_only = store
            .find_by_fields(&[
                FieldCondition::equals_ignore_case(MAIL_FIELD, "MIXED@example.COM"),
                FieldCondition::is_null(LOGIN_NAME_FIELD),
            ])
            .await
            .unwrap();
        assert_eq!(decoupled_only.len(), 1);
        assert!(decoupled_only[0].is_decoupled());

        let coupled_only = store
            .find_by_fields(&[FieldCondition::is_not_null(LOGIN_NAME_FIELD)])
            .await
            .unwrap();
        assert_eq!(coupled_only.len(), 1);
        assert!(!coupled_only[0].is_decoupled());
    }

    #[tokio::test]
    async fn test_equals_matches_any_array_element() {
        let store = InMemoryIdentityStore::new();
        let mut fields = mail_fields("r@example.com");
        fields.insert(ROLES_FIELD.to_string(), json!(["editor", "author"]));
        store.create(fields).await.unwrap();

        let found = store
            .find_by_fields(&[FieldCondition::equals(ROLES_FIELD, "author")])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_load_multiple_skips_unknown_ids() {
        let store = InMemoryIdentityStore::new();
        let a = store.create(mail_fields("a@example.com")).await.unwrap();
        let b = store.create(mail_fields("b@example.com")).await.unwrap();

        let loaded = store
            .load_multiple(&[b.id.unwrap(), IdentityId::new(99), a.id.unwrap()])
            .await
            .unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, a.id);
        assert_eq!(loaded[1].id, b.id);
    }

    #[tokio::test]
    async fn test_save_new_record_inserts() {
        let store = InMemoryIdentityStore::new();
        let record = IdentityRecord::new()
            .with_field(LOGIN_NAME_FIELD, "erin")
            .with_field(MAIL_FIELD, "erin@example.com");

        let saved = store.save(&record).await.unwrap();
        assert_eq!(saved.id, Some(IdentityId::new(1)));
        assert!(!saved.is_decoupled());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_save_existing_updates_in_place() {
        let store = InMemoryIdentityStore::new();
        let mut record = store.create(mail_fields("f@example.com")).await.unwrap();
        record.set_field(LOGIN_NAME_FIELD, "frank");

        let saved = store.save(&record).await.unwrap();
        assert_eq!(saved.id, record.id);
        assert!(!saved.is_decoupled());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_save_enforced_new_with_taken_id_conflicts() {
        let store = InMemoryIdentityStore::new();
        let mut record = store.create(mail_fields("g@example.com")).await.unwrap();
        record.set_enforce_is_new(true);

        let result = store.save(&record).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_save_update_of_missing_record_is_not_found() {
        let store = InMemoryIdentityStore::new();
        let record = store.create(mail_fields("h@example.com")).await.unwrap();
        store.remove(record.id.unwrap()).await;

        let result = store.save(&record).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_injected_failure_is_reported() {
        let store = InMemoryIdentityStore::new();
        store.fail_on(StoreOperation::Find).await;

        let result = store.find_by_fields(&[]).await;
        assert_eq!(
            result.unwrap_err(),
            StoreError::backend(StoreOperation::Find, "injected failure")
        );

        store.clear_failures().await;
        assert!(store.find_by_fields(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_recomputes_decoupled_flag() {
        let store = InMemoryIdentityStore::new();
        let mut record = store.create(mail_fields("i@example.com")).await.unwrap();
        record.set_field(LOGIN_NAME_FIELD, "ivy");
        store.save(&record).await.unwrap();

        let loaded = store.load(record.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(loaded.is_decoupled(), loaded.login_name().is_none());
        assert!(!loaded.is_decoupled());
    }
}
