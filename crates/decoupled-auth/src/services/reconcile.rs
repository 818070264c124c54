//! Field reconciliation when a new submission claims a decoupled record.
//!
//! The new entity takes over the acquired record's identity (`id`,
//! `external_id`, `created_at`), keeps every value it was submitted with,
//! backfills empty fields from the acquired record, and gains the union of
//! both role sets. Afterwards it is no longer "new", so the store updates the
//! existing row instead of inserting.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::record::{is_empty_value, IdentityRecord, ROLES_FIELD};

/// Why a field was not reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The acquired record has no value for an identity property.
    MissingOnAcquired,
    /// The field is not part of the new entity's schema.
    NotInSchema,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingOnAcquired => write!(f, "missing_on_acquired"),
            Self::NotInSchema => write!(f, "not_in_schema"),
        }
    }
}

/// A field skipped because the two sides disagree on schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedField {
    /// Field name.
    pub field: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// What a merge did, field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Identity properties copied unconditionally.
    pub overridden: Vec<String>,
    /// Empty fields filled from the acquired record.
    pub backfilled: Vec<String>,
    /// Fields where the submitted value won.
    pub kept: Vec<String>,
    /// Roles added from the acquired record.
    pub roles_added: Vec<String>,
    /// Fields skipped due to schema drift.
    pub skipped: Vec<SkippedField>,
}

/// Merge rules for claiming an acquired record.
#[derive(Debug, Clone, Default)]
pub struct FieldReconciler {
    schema: Option<BTreeSet<String>>,
}

impl FieldReconciler {
    /// A reconciler that treats every field as known.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only backfill fields named in `fields`; others are skipped as drift.
    #[must_use]
    pub fn with_schema<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema: Some(fields.into_iter().map(Into::into).collect()),
        }
    }

    fn knows(&self, field: &str) -> bool {
        self.schema.as_ref().is_none_or(|s| s.contains(field))
    }

    /// Merge `acquired` into `entity`.
    ///
    /// Never fails: fields that exist on only one side are skipped and
    /// listed in [`MergeReport::skipped`].
    pub fn merge(&self, entity: &mut IdentityRecord, acquired: &IdentityRecord) -> MergeReport {
        let mut report = MergeReport::default();

        // Identity properties
        let mut override_or_skip = |name: &str, present: bool| {
            if present {
                report.overridden.push(name.to_string());
            } else {
                report.skipped.push(SkippedField {
                    field: name.to_string(),
                    reason: SkipReason::MissingOnAcquired,
                });
            }
        };
        if let Some(id) = acquired.id {
            entity.id = Some(id);
        }
        override_or_skip("id", acquired.id.is_some());
        if let Some(external_id) = acquired.external_id {
            entity.external_id = Some(external_id);
        }
        override_or_skip("external_id", acquired.external_id.is_some());
        if let Some(created_at) = acquired.created_at {
            entity.created_at = Some(created_at);
        }
        override_or_skip("created_at", acquired.created_at.is_some());

        // Backfill
        for (name, value) in &acquired.fields {
            if name == ROLES_FIELD {
                continue;
            }
            if !self.knows(name) {
                report.skipped.push(SkippedField {
                    field: name.clone(),
                    reason: SkipReason::NotInSchema,
                });
                continue;
            }
            if is_empty_value(value) {
                continue;
            }
            if entity.field_is_empty(name) {
                entity.set_field(name.clone(), value.clone());
                report.backfilled.push(name.clone());
            } else {
                report.kept.push(name.clone());
            }
        }

        // Roles are additive
        for role in acquired.roles() {
            if entity.add_role(&role) {
                report.roles_added.push(role);
            }
        }

        entity.set_enforce_is_new(false);
        entity.recompute_decoupled();

        if !report.skipped.is_empty() {
            debug!(
                identity_id = ?entity.id,
                skipped = ?report.skipped,
                "Schema drift during merge; fields skipped"
            );
        }
        report
    }
}
