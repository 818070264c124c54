//! Registration path: claiming a decoupled record when a user signs up.
//!
//! When enabled by the operator, a submitted account is matched by email
//! against decoupled records only. A match is merged into the submission,
//! which is then saved over the matched record and coupled. Without a match
//! (or with acquisition disabled) the submission is inserted as usual.

use std::sync::Arc;

use decoupled_core::{IdentityId, StoreError};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::audit::{AcquisitionAuditAction, AcquisitionAuditEventInput};
use crate::config::SettingsProvider;
use crate::coupling::CouplingState;
use crate::error::Result;
use crate::record::{FieldMap, IdentityRecord, MAIL_FIELD};
use crate::services::acquisition::AcquisitionService;
use crate::services::reconcile::{FieldReconciler, MergeReport};
use crate::types::{AcquisitionContext, AcquisitionResult};

/// Context label used for registration lookups.
pub const REGISTRATION_LABEL: &str = "user_register";

/// What happened to a submitted account.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    /// The persisted record.
    pub record: IdentityRecord,
    /// Lookup result, when acquisition ran.
    pub acquisition: Option<AcquisitionResult>,
    /// Merge report, when a decoupled record was claimed.
    pub merge: Option<MergeReport>,
}

impl RegistrationOutcome {
    /// Whether the submission took over an existing record.
    #[must_use]
    pub fn was_merged(&self) -> bool {
        self.merge.is_some()
    }
}

/// Service for registration-time acquisition and administrative decoupling.
pub struct RegistrationService {
    acquisition: Arc<AcquisitionService>,
    settings: Arc<dyn SettingsProvider>,
    reconciler: FieldReconciler,
}

impl RegistrationService {
    /// Create a new registration service.
    pub fn new(acquisition: Arc<AcquisitionService>, settings: Arc<dyn SettingsProvider>) -> Self {
        Self {
            acquisition,
            settings,
            reconciler: FieldReconciler::new(),
        }
    }

    /// Use a schema-aware reconciler.
    #[must_use]
    pub fn with_reconciler(mut self, reconciler: FieldReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Register a submitted account.
    ///
    /// Settings are read on every call. Audit events are written only after
    /// the save succeeds; an audit failure is logged and does not fail the
    /// registration.
    #[instrument(skip_all, fields(label = REGISTRATION_LABEL))]
    pub async fn register(&self, mut entity: IdentityRecord) -> Result<RegistrationOutcome> {
        let settings = self.settings.current()?;

        let mut acquisition = None;
        let mut merge = None;
        let mut claimed_state = None;

        if !settings.registration_enabled {
            debug!("Registration acquisition disabled");
        } else if let Some(mail) = entity.mail().map(str::to_owned) {
            let context = AcquisitionContext::new(REGISTRATION_LABEL)
                .with_behavior(settings.registration_behavior())
                .with_allow_create(false)
                .decoupled_only();
            let candidates = FieldMap::from([(MAIL_FIELD.to_string(), Value::String(mail))]);

            let result = self.acquisition.acquire(&candidates, &context).await?;
            if let Some(acquired) = &result.record {
                claimed_state = Some(acquired.state());
                merge = Some(self.reconciler.merge(&mut entity, acquired));
            }
            acquisition = Some(result);
        } else {
            debug!("Submission has no mail; skipping acquisition");
        }

        if entity.login_name().is_some() {
            entity.couple();
        }

        let record = self.acquisition.store().save(&entity).await?;

        if let Some(report) = &merge {
            self.log(
                AcquisitionAuditAction::Merged,
                REGISTRATION_LABEL,
                record.id,
                Some(json!({
                    "backfilled": &report.backfilled,
                    "roles_added": &report.roles_added,
                    "skipped": &report.skipped,
                })),
            )
            .await;
        }
        if claimed_state == Some(CouplingState::Decoupled) && !record.is_decoupled() {
            self.log(
                AcquisitionAuditAction::Coupled,
                REGISTRATION_LABEL,
                record.id,
                None,
            )
            .await;
        }

        info!(
            identity_id = ?record.id,
            merged = merge.is_some(),
            "Registration saved"
        );

        Ok(RegistrationOutcome {
            record,
            acquisition,
            merge,
        })
    }

    /// Strip login credentials from an identity.
    ///
    /// The previous login name and credential are discarded.
    #[instrument(skip_all, fields(identity_id = %id, label = %label))]
    pub async fn decouple_identity(&self, id: IdentityId, label: &str) -> Result<IdentityRecord> {
        let store = self.acquisition.store();
        let mut record = store
            .load(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Identity", id))?;

        let previous = record.decouple();
        let saved = store.save(&record).await?;

        self.log(
            AcquisitionAuditAction::Decoupled,
            label,
            saved.id,
            Some(json!({ "previous_state": previous })),
        )
        .await;

        info!(from = %previous, "Identity decoupled");
        Ok(saved)
    }

    async fn log(
        &self,
        action: AcquisitionAuditAction,
        label: &str,
        identity_id: Option<IdentityId>,
        metadata: Option<Value>,
    ) {
        let logged = self
            .acquisition
            .audit_store()
            .log_event(AcquisitionAuditEventInput {
                label: label.to_string(),
                action,
                identity_id,
                metadata,
                ..Default::default()
            })
            .await;
        if let Err(e) = logged {
            warn!(error = %e, action = %action, "Failed to write registration audit event");
        }
    }
}
