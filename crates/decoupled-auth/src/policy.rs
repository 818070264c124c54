//! Match policies: turning candidate values into store queries.

use std::collections::BTreeSet;

use async_trait::async_trait;
use decoupled_core::StoreResult;
use serde_json::Value;
use tracing::warn;

use crate::record::{FieldMap, IdentityRecord, DECOUPLED_PSEUDO_FIELD, LOGIN_NAME_FIELD, MAIL_FIELD};
use crate::store::{FieldCondition, IdentityStore};

/// Strategy for finding identity records that could match candidate values.
#[async_trait]
pub trait MatchPolicy: Send + Sync {
    /// Store conditions for a candidate set plus caller constraints.
    fn conditions(&self, candidates: &FieldMap, constraints: &[FieldCondition])
        -> Vec<FieldCondition>;

    /// Matching records in ascending id order.
    ///
    /// Never fails for "no match"; only store failures are errors.
    async fn find(
        &self,
        store: &dyn IdentityStore,
        candidates: &FieldMap,
        constraints: &[FieldCondition],
    ) -> StoreResult<Vec<IdentityRecord>> {
        let conditions = self.conditions(candidates, constraints);
        let mut records = store.find_by_fields(&conditions).await?;
        // First-match must not depend on backend default ordering.
        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}

/// Field-equality policy with per-field case rules.
///
/// - `decoupled: true|false` becomes a null/not-null check on the login name
/// - a `null` candidate value matches records where the field is unset
/// - string values on case-insensitive fields match ignoring case
/// - everything else is exact equality
#[derive(Debug, Clone)]
pub struct FieldMatchPolicy {
    case_insensitive: BTreeSet<String>,
}

impl Default for FieldMatchPolicy {
    /// Email matches ignore case; all other fields are exact.
    fn default() -> Self {
        Self::exact().with_case_insensitive(MAIL_FIELD)
    }
}

impl FieldMatchPolicy {
    /// A policy where every field matches exactly.
    #[must_use]
    pub fn exact() -> Self {
        Self {
            case_insensitive: BTreeSet::new(),
        }
    }

    /// Match `field` ignoring case.
    #[must_use]
    pub fn with_case_insensitive(mut self, field: impl Into<String>) -> Self {
        self.case_insensitive.insert(field.into());
        self
    }

    /// Whether `field` matches ignoring case.
    #[must_use]
    pub fn is_case_insensitive(&self, field: &str) -> bool {
        self.case_insensitive.contains(field)
    }

    fn condition_for(&self, field: &str, value: &Value) -> Option<FieldCondition> {
        if field == DECOUPLED_PSEUDO_FIELD {
            return match value.as_bool() {
                Some(true) => Some(FieldCondition::is_null(LOGIN_NAME_FIELD)),
                Some(false) => Some(FieldCondition::is_not_null(LOGIN_NAME_FIELD)),
                None => {
                    warn!(value = %value, "Ignoring non-boolean decoupled candidate");
                    None
                }
            };
        }

        match value {
            Value::Null => Some(FieldCondition::is_null(field)),
            Value::String(s) if self.is_case_insensitive(field) => {
                Some(FieldCondition::equals_ignore_case(field, s.clone()))
            }
            other => Some(FieldCondition::equals(field, other.clone())),
        }
    }
}

#[async_trait]
impl MatchPolicy for FieldMatchPolicy {
    fn conditions(
        &self,
        candidates: &FieldMap,
        constraints: &[FieldCondition],
    ) -> Vec<FieldCondition> {
        candidates
            .iter()
            .filter_map(|(field, value)| self.condition_for(field, value))
            .chain(constraints.iter().cloned())
            .collect()
    }
}
