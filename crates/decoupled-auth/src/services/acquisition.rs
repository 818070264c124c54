//! Acquisition engine: find-or-create an identity from partial match data.
//!
//! This module provides the `AcquisitionService`, which asks a
//! [`MatchPolicy`] for candidate records, applies the context's
//! [`BehaviorMode`] to pick one, and creates a record through the
//! [`IdentityStore`] when nothing matches and creation is allowed.
//!
//! Acquisition is convergent rather than pure: a record created by one call
//! is visible to the next call with the same candidates and context, so the
//! second call matches it instead of creating another. To keep that true,
//! a lookup that may create only uses candidate values the created record
//! will carry, and a record is only created when it satisfies the lookup.
//! Concurrent callers racing on the same values can both create; guarding
//! against that (e.g. a unique index on the match field) belongs to the
//! store.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::audit::{AcquisitionAuditAction, AcquisitionAuditEventInput, AcquisitionAuditStore};
use crate::error::Result;
use crate::policy::MatchPolicy;
use crate::record::{
    is_empty_value, FieldMap, IdentityRecord, CREDENTIAL_FIELD, DECOUPLED_PSEUDO_FIELD,
    LOGIN_NAME_FIELD,
};
use crate::store::{FieldCondition, IdentityStore};
use crate::types::{
    AcquisitionContext, AcquisitionMethod, AcquisitionResult, AmbiguousMatch, BehaviorMode,
};

/// Service that acquires identity records.
pub struct AcquisitionService {
    store: Arc<dyn IdentityStore>,
    policy: Arc<dyn MatchPolicy>,
    audit_store: Arc<dyn AcquisitionAuditStore>,
}

impl AcquisitionService {
    /// Create a new acquisition service.
    pub fn new(
        store: Arc<dyn IdentityStore>,
        policy: Arc<dyn MatchPolicy>,
        audit_store: Arc<dyn AcquisitionAuditStore>,
    ) -> Self {
        Self {
            store,
            policy,
            audit_store,
        }
    }

    /// The identity store this service acquires from.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    /// The audit store events are written to.
    #[must_use]
    pub fn audit_store(&self) -> &Arc<dyn AcquisitionAuditStore> {
        &self.audit_store
    }

    /// Find or create an identity record for `candidates`.
    ///
    /// Several matches in Default mode are not an error: the first is used
    /// and [`AcquisitionResult::ambiguity`] is set. Store failures propagate
    /// unchanged and are never retried here. Audit failures are logged and
    /// do not fail the call.
    ///
    /// When the context may create, candidate values that creation would
    /// drop or overwrite (credentials of a decoupled record, keys in
    /// [`AcquisitionContext::create_values`] with a different value) are left
    /// out of the lookup.
    #[instrument(skip_all, fields(label = %context.label, behavior = %context.behavior))]
    pub async fn acquire(
        &self,
        candidates: &FieldMap,
        context: &AcquisitionContext,
    ) -> Result<AcquisitionResult> {
        let lookup = if may_create(context) {
            lookup_candidates(candidates, &context.create_values)
        } else {
            candidates.clone()
        };

        if lookup.is_empty() {
            warn!("Acquisition requested without usable candidate values; skipping lookup");
            let result = no_match();
            self.log_outcome(context, &result, 0).await;
            return Ok(result);
        }

        let matches = self
            .policy
            .find(self.store.as_ref(), &lookup, &context.conditions)
            .await?;
        let candidate_count = matches.len();

        let result = match context.behavior {
            BehaviorMode::First => select_first(matches),
            BehaviorMode::Default => {
                self.select_or_create(matches, &lookup, candidates, context)
                    .await?
            }
        };

        info!(
            method = %result.method,
            identity_id = ?result.identity_id(),
            candidates = candidate_count,
            "Acquisition completed"
        );

        self.log_outcome(context, &result, candidate_count).await;
        Ok(result)
    }

    async fn select_or_create(
        &self,
        mut matches: Vec<IdentityRecord>,
        lookup: &FieldMap,
        candidates: &FieldMap,
        context: &AcquisitionContext,
    ) -> Result<AcquisitionResult> {
        if matches.is_empty() {
            if !context.allow_create {
                return Ok(no_match());
            }

            let mut initial = initial_fields(candidates, &context.create_values);
            apply_conditions(&mut initial, &context.conditions);

            // Only create what the same lookup would find next time.
            let draft = draft_record(&initial);
            let unmet: Vec<FieldCondition> = self
                .policy
                .conditions(lookup, &context.conditions)
                .into_iter()
                .filter(|c| !c.matches(&draft))
                .collect();
            if !unmet.is_empty() {
                warn!(
                    unmet = ?unmet,
                    "Created record could not satisfy the lookup; not creating"
                );
                return Ok(no_match());
            }

            let record = self.store.create(initial).await?;
            return Ok(AcquisitionResult {
                record: Some(record),
                method: AcquisitionMethod::CreatedNew,
                ambiguity: None,
            });
        }

        let chosen = if context.prefer_coupled {
            matches.iter().position(|r| !r.is_decoupled()).unwrap_or(0)
        } else {
            0
        };

        let ambiguity = match (matches.len() > 1, matches[chosen].id) {
            (true, Some(chosen_id)) => {
                let candidate_ids = matches.iter().filter_map(|r| r.id).collect::<Vec<_>>();
                warn!(
                    candidate_ids = ?candidate_ids,
                    chosen_id = %chosen_id,
                    "Ambiguous acquisition: several records matched"
                );
                Some(AmbiguousMatch {
                    candidate_ids,
                    chosen_id,
                })
            }
            _ => None,
        };

        Ok(AcquisitionResult {
            record: Some(matches.swap_remove(chosen)),
            method: AcquisitionMethod::MatchedExisting,
            ambiguity,
        })
    }

    async fn log_outcome(
        &self,
        context: &AcquisitionContext,
        result: &AcquisitionResult,
        candidate_count: usize,
    ) {
        let action = match result.method {
            AcquisitionMethod::MatchedExisting => AcquisitionAuditAction::Matched,
            AcquisitionMethod::CreatedNew => AcquisitionAuditAction::Created,
            AcquisitionMethod::NoMatchNoCreate => AcquisitionAuditAction::NoMatch,
        };

        let logged = self
            .audit_store
            .log_event(AcquisitionAuditEventInput {
                label: context.label.clone(),
                action,
                identity_id: result.identity_id(),
                candidate_count,
                ambiguous: result.is_ambiguous(),
                metadata: Some(json!({
                    "behavior": context.behavior,
                    "method": result.method,
                })),
            })
            .await;
        if let Err(e) = logged {
            warn!(error = %e, action = %action, "Failed to write acquisition audit event");
        }
    }
}

fn may_create(context: &AcquisitionContext) -> bool {
    context.behavior == BehaviorMode::Default && context.allow_create
}

fn no_match() -> AcquisitionResult {
    AcquisitionResult {
        record: None,
        method: AcquisitionMethod::NoMatchNoCreate,
        ambiguity: None,
    }
}

fn select_first(mut matches: Vec<IdentityRecord>) -> AcquisitionResult {
    if matches.is_empty() {
        return no_match();
    }
    AcquisitionResult {
        record: Some(matches.swap_remove(0)),
        method: AcquisitionMethod::MatchedExisting,
        ambiguity: None,
    }
}

fn strips_credentials(candidates: &FieldMap, create_values: &FieldMap) -> bool {
    create_values
        .get(DECOUPLED_PSEUDO_FIELD)
        .or_else(|| candidates.get(DECOUPLED_PSEUDO_FIELD))
        .and_then(Value::as_bool)
        == Some(true)
}

/// Candidate values a created record will still carry.
///
/// Drops keys that `create_values` overwrites with a different value, and
/// login name and credential when the record is created decoupled.
fn lookup_candidates(candidates: &FieldMap, create_values: &FieldMap) -> FieldMap {
    let strip = strips_credentials(candidates, create_values);
    candidates
        .iter()
        .filter(|(name, value)| create_values.get(name.as_str()).is_none_or(|v| v == *value))
        .filter(|(name, _)| !(strip && (*name == LOGIN_NAME_FIELD || *name == CREDENTIAL_FIELD)))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Initial field set for a created record.
///
/// Context values override candidate values. The `decoupled` pseudo-field is
/// dropped; when it is `true`, login name and credential are dropped too.
fn initial_fields(candidates: &FieldMap, create_values: &FieldMap) -> FieldMap {
    let strip = strips_credentials(candidates, create_values);
    let mut initial = candidates.clone();
    initial.extend(create_values.iter().map(|(k, v)| (k.clone(), v.clone())));

    initial.remove(DECOUPLED_PSEUDO_FIELD);
    if strip {
        initial.remove(LOGIN_NAME_FIELD);
        initial.remove(CREDENTIAL_FIELD);
    }
    initial
}

/// Fill unset fields from equality constraints so the record satisfies them.
fn apply_conditions(initial: &mut FieldMap, conditions: &[FieldCondition]) {
    for condition in conditions {
        let (field, value) = match condition {
            FieldCondition::Equals { field, value } => (field, value.clone()),
            FieldCondition::EqualsIgnoreCase { field, value } => {
                (field, Value::String(value.clone()))
            }
            FieldCondition::IsNull { .. } | FieldCondition::IsNotNull { .. } => continue,
        };
        if initial.get(field).is_none_or(is_empty_value) {
            initial.insert(field.clone(), value);
        }
    }
}

fn draft_record(initial: &FieldMap) -> IdentityRecord {
    let mut draft = IdentityRecord::new();
    draft.fields = initial.clone();
    draft.recompute_decoupled();
    draft
}

// ============================================================================
// Tests
// ============================================================================
