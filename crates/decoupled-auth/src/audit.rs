//! Audit logging for acquisition, merge and coupling.
//!
//! Every acquisition records one event keyed by the caller's context label,
//! so operators can see which workflow (checkout, registration, profile
//! import...) created or reused which identity.
//!
//! # Example
//!
//! ```rust,ignore
//! use decoupled_auth::audit::{
//!     AcquisitionAuditAction, AcquisitionAuditEventInput, AcquisitionAuditStore,
//!     InMemoryAcquisitionAuditStore,
//! };
//!
//! let store = InMemoryAcquisitionAuditStore::new();
//! store
//!     .log_event(AcquisitionAuditEventInput {
//!         label: "checkout".to_string(),
//!         action: AcquisitionAuditAction::Created,
//!         ..Default::default()
//!     })
//!     .await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use decoupled_core::{IdentityId, StoreError, StoreOperation, StoreResult};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// What happened to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionAuditAction {
    /// An existing record was acquired.
    #[default]
    Matched,
    /// A new record was created by acquisition.
    Created,
    /// Nothing matched and nothing was created.
    NoMatch,
    /// A decoupled record was merged into a new submission.
    Merged,
    /// A record gained login credentials.
    Coupled,
    /// A record lost its login credentials.
    Decoupled,
}

impl std::fmt::Display for AcquisitionAuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Matched => write!(f, "matched"),
            Self::Created => write!(f, "created"),
            Self::NoMatch => write!(f, "no_match"),
            Self::Merged => write!(f, "merged"),
            Self::Coupled => write!(f, "coupled"),
            Self::Decoupled => write!(f, "decoupled"),
        }
    }
}

/// A recorded audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionAuditEvent {
    /// Unique identifier for the event.
    pub id: Uuid,
    /// Context label of the call that produced the event.
    pub label: String,
    /// Action performed.
    pub action: AcquisitionAuditAction,
    /// Identity involved (if any).
    pub identity_id: Option<IdentityId>,
    /// Number of records that matched the lookup.
    pub candidate_count: usize,
    /// Whether several records matched in Default mode.
    pub ambiguous: bool,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Additional metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Input for creating an audit event.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionAuditEventInput {
    /// Context label of the call that produced the event.
    pub label: String,
    /// Action performed.
    pub action: AcquisitionAuditAction,
    /// Identity involved (if any).
    pub identity_id: Option<IdentityId>,
    /// Number of records that matched the lookup.
    pub candidate_count: usize,
    /// Whether several records matched in Default mode.
    pub ambiguous: bool,
    /// Additional metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Filter for querying audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditEventFilter {
    /// Filter by context label.
    pub label: Option<String>,
    /// Filter by identity.
    pub identity_id: Option<IdentityId>,
    /// Filter by action type.
    pub action: Option<AcquisitionAuditAction>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

/// Trait for audit event storage backends.
#[async_trait::async_trait]
pub trait AcquisitionAuditStore: Send + Sync {
    /// Log an audit event.
    async fn log_event(&self, input: AcquisitionAuditEventInput)
        -> StoreResult<AcquisitionAuditEvent>;

    /// Query audit events, oldest first.
    async fn query_events(&self, filter: AuditEventFilter)
        -> StoreResult<Vec<AcquisitionAuditEvent>>;
}

/// In-memory audit store for testing.
#[derive(Debug, Default)]
pub struct InMemoryAcquisitionAuditStore {
    events: Arc<RwLock<Vec<AcquisitionAuditEvent>>>,
    fail_writes: AtomicBool,
}

impl InMemoryAcquisitionAuditStore {
    /// Create a new in-memory audit store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all events (for testing).
    pub async fn get_all(&self) -> Vec<AcquisitionAuditEvent> {
        self.events.read().await.clone()
    }

    /// Clear all events (for testing).
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }

    /// Get event count (for testing).
    pub async fn count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Make every subsequent write fail, or stop doing so (for testing).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl AcquisitionAuditStore for InMemoryAcquisitionAuditStore {
    async fn log_event(
        &self,
        input: AcquisitionAuditEventInput,
    ) -> StoreResult<AcquisitionAuditEvent> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend(
                StoreOperation::Create,
                "injected audit failure",
            ));
        }

        let event = AcquisitionAuditEvent {
            id: Uuid::new_v4(),
            label: input.label,
            action: input.action,
            identity_id: input.identity_id,
            candidate_count: input.candidate_count,
            ambiguous: input.ambiguous,
            timestamp: Utc::now(),
            metadata: input.metadata,
        };

        self.events.write().await.push(event.clone());
        Ok(event)
    }

    async fn query_events(
        &self,
        filter: AuditEventFilter,
    ) -> StoreResult<Vec<AcquisitionAuditEvent>> {
        let events = self.events.read().await;

        let results = events
            .iter()
            .filter(|e| filter.label.as_ref().is_none_or(|l| &e.label == l))
            .filter(|e| filter.identity_id.is_none_or(|id| e.identity_id == Some(id)))
            .filter(|e| filter.action.is_none_or(|a| e.action == a))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_and_query_by_label() {
        let store = InMemoryAcquisitionAuditStore::new();

        store
            .log_event(AcquisitionAuditEventInput {
                label: "checkout".to_string(),
                action: AcquisitionAuditAction::Created,
                identity_id: Some(IdentityId::new(1)),
                candidate_count: 0,
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .log_event(AcquisitionAuditEventInput {
                label: "user_register".to_string(),
                action: AcquisitionAuditAction::Matched,
                identity_id: Some(IdentityId::new(1)),
                candidate_count: 1,
                ..Default::default()
            })
            .await
            .unwrap();

        let checkout = store
            .query_events(AuditEventFilter {
                label: Some("checkout".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(checkout.len(), 1);
        assert_eq!(checkout[0].action, AcquisitionAuditAction::Created);

        let for_identity = store
            .query_events(AuditEventFilter {
                identity_id: Some(IdentityId::new(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(for_identity.len(), 2);
    }

    #[tokio::test]
    async fn test_query_limit_and_action() {
        let store = InMemoryAcquisitionAuditStore::new();
        for _ in 0..3 {
            store
                .log_event(AcquisitionAuditEventInput {
                    label: "import".to_string(),
                    action: AcquisitionAuditAction::NoMatch,
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let limited = store
            .query_events(AuditEventFilter {
                action: Some(AcquisitionAuditAction::NoMatch),
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(store.count().await, 3);

        store.clear().await;
        assert!(store.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let store = InMemoryAcquisitionAuditStore::new();
        store.fail_writes(true);

        let err = store
            .log_event(AcquisitionAuditEventInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));
        assert_eq!(store.count().await, 0);

        store.fail_writes(false);
        store
            .log_event(AcquisitionAuditEventInput::default())
            .await
            .unwrap();
        assert_eq!(store.count().await, 1);
    }

    #[test]
    fn test_action_display() {
        assert_eq!(AcquisitionAuditAction::NoMatch.to_string(), "no_match");
        assert_eq!(AcquisitionAuditAction::Decoupled.to_string(), "decoupled");
    }
}
