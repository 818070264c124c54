//! Type definitions for the acquisition domain.
//!
//! Includes the per-call context, behavior modes and the acquisition result.

use std::fmt;
use std::str::FromStr;

use decoupled_core::IdentityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AcquisitionError;
use crate::record::{FieldMap, IdentityRecord, DECOUPLED_PSEUDO_FIELD, LOGIN_NAME_FIELD};
use crate::store::FieldCondition;

// ============================================================================
// Behavior Mode
// ============================================================================

/// Match-selection and creation policy for one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorMode {
    /// Use the single match, the first of several (with an ambiguity
    /// signal), or create when nothing matches and creation is allowed.
    #[default]
    Default,
    /// Use the first match regardless of count; never create.
    First,
}

impl fmt::Display for BehaviorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::First => write!(f, "first"),
        }
    }
}

impl FromStr for BehaviorMode {
    type Err = AcquisitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "first" => Ok(Self::First),
            _ => Err(AcquisitionError::ConfigInvalid {
                var: "behavior_mode".to_string(),
                reason: format!("Unknown behavior mode: {s}"),
            }),
        }
    }
}

// ============================================================================
// Acquisition Method
// ============================================================================

/// How an acquisition obtained its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMethod {
    /// An existing record was matched.
    MatchedExisting,
    /// No record matched and a new one was created.
    CreatedNew,
    /// No record matched and creation was not permitted.
    NoMatchNoCreate,
}

impl fmt::Display for AcquisitionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MatchedExisting => write!(f, "matched_existing"),
            Self::CreatedNew => write!(f, "created_new"),
            Self::NoMatchNoCreate => write!(f, "no_match_no_create"),
        }
    }
}

// ============================================================================
// Acquisition Context
// ============================================================================

/// Configuration for a single acquisition call.
///
/// Build one per call and do not mutate it while the call runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionContext {
    /// Free-text label used in logs and the audit trail.
    pub label: String,
    /// Selection and creation policy.
    pub behavior: BehaviorMode,
    /// Whether Default mode may create a record when nothing matches.
    pub allow_create: bool,
    /// Among several matches, prefer the first coupled one.
    pub prefer_coupled: bool,
    /// Hard constraints added to every lookup.
    pub conditions: Vec<FieldCondition>,
    /// Values forced onto a created record, overriding candidate values.
    pub create_values: FieldMap,
}

impl AcquisitionContext {
    /// A Default-mode context that may create.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            behavior: BehaviorMode::Default,
            allow_create: true,
            prefer_coupled: false,
            conditions: Vec::new(),
            create_values: FieldMap::new(),
        }
    }

    /// Set the behavior mode.
    #[must_use]
    pub fn with_behavior(mut self, behavior: BehaviorMode) -> Self {
        self.behavior = behavior;
        self
    }

    /// Allow or forbid creation.
    #[must_use]
    pub fn with_allow_create(mut self, allow_create: bool) -> Self {
        self.allow_create = allow_create;
        self
    }

    /// Prefer coupled records among several matches.
    #[must_use]
    pub fn with_prefer_coupled(mut self, prefer_coupled: bool) -> Self {
        self.prefer_coupled = prefer_coupled;
        self
    }

    /// Add a hard lookup constraint.
    #[must_use]
    pub fn with_condition(mut self, condition: FieldCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Restrict lookups to decoupled records.
    #[must_use]
    pub fn decoupled_only(self) -> Self {
        self.with_condition(FieldCondition::is_null(LOGIN_NAME_FIELD))
    }

    /// Force a value onto records this call creates.
    #[must_use]
    pub fn with_create_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.create_values.insert(name.into(), value.into());
        self
    }

    /// Force records this call creates to be decoupled.
    #[must_use]
    pub fn create_decoupled(self) -> Self {
        self.with_create_value(DECOUPLED_PSEUDO_FIELD, true)
    }
}

// ============================================================================
// Acquisition Result
// ============================================================================

/// Soft signal: several records matched in Default mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousMatch {
    /// Every matching id, in match order.
    pub candidate_ids: Vec<IdentityId>,
    /// The id that was chosen.
    pub chosen_id: IdentityId,
}

/// Outcome of one acquisition call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionResult {
    /// The matched or created record, if any.
    pub record: Option<IdentityRecord>,
    /// How the record was obtained.
    pub method: AcquisitionMethod,
    /// Set when several records matched in Default mode.
    pub ambiguity: Option<AmbiguousMatch>,
}

impl AcquisitionResult {
    /// Whether an ambiguity signal was raised.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.ambiguity.is_some()
    }

    /// The acquired record's id, if any.
    #[must_use]
    pub fn identity_id(&self) -> Option<IdentityId> {
        self.record.as_ref().and_then(|r| r.id)
    }

    /// Split into the record and method.
    #[must_use]
    pub fn into_parts(self) -> (Option<IdentityRecord>, AcquisitionMethod) {
        (self.record, self.method)
    }
}
