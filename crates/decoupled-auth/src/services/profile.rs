//! Secondary profile records and their owning identities.
//!
//! A profile (billing address, customer profile, ...) belongs to one
//! identity through a weak `owner_id` link. Owners can disappear without the
//! profile being told, so every operation here treats a dangling owner as
//! [`MissingOwner`] and skips the dependent work instead of failing.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use decoupled_core::{IdentityId, Owned, ProfileId, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::record::{FieldMap, IdentityRecord, MAIL_FIELD};
use crate::services::acquisition::AcquisitionService;
use crate::types::{AcquisitionContext, AcquisitionResult};

// ============================================================================
// Profile
// ============================================================================

/// A per-bundle record linked to an owning identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile id.
    pub id: ProfileId,
    /// Sub-type, e.g. `"billing"` or `"customer"`.
    pub bundle: String,
    /// Owning identity, once linked.
    pub owner_id: Option<IdentityId>,
    /// Field values.
    pub fields: FieldMap,
}

impl Profile {
    /// An unowned profile of `bundle`.
    #[must_use]
    pub fn new(bundle: impl Into<String>) -> Self {
        Self {
            id: ProfileId::new(),
            bundle: bundle.into(),
            owner_id: None,
            fields: FieldMap::new(),
        }
    }

    /// Builder-style owner setter.
    #[must_use]
    pub fn with_owner(mut self, owner_id: IdentityId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// The profile's email address, when set to a non-empty string.
    #[must_use]
    pub fn mail(&self) -> Option<&str> {
        self.fields
            .get(MAIL_FIELD)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

impl Owned for Profile {
    fn owner_id(&self) -> Option<IdentityId> {
        self.owner_id
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Trait for profile storage backends.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Get a profile by id.
    async fn get(&self, id: ProfileId) -> StoreResult<Option<Profile>>;

    /// Insert or replace a profile.
    async fn save(&self, profile: &Profile) -> StoreResult<Profile>;

    /// Profiles owned by `owner_id`.
    async fn list_by_owner(&self, owner_id: IdentityId) -> StoreResult<Vec<Profile>>;
}

/// In-memory profile store for testing.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: Arc<RwLock<BTreeMap<ProfileId, Profile>>>,
}

impl InMemoryProfileStore {
    /// Create a new in-memory profile store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get profile count (for testing).
    pub async fn count(&self) -> usize {
        self.profiles.read().await.len()
    }

    /// Clear all profiles (for testing).
    pub async fn clear(&self) {
        self.profiles.write().await.clear();
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, id: ProfileId) -> StoreResult<Option<Profile>> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn save(&self, profile: &Profile) -> StoreResult<Profile> {
        self.profiles
            .write()
            .await
            .insert(profile.id, profile.clone());
        Ok(profile.clone())
    }

    async fn list_by_owner(&self, owner_id: IdentityId) -> StoreResult<Vec<Profile>> {
        Ok(self
            .profiles
            .read()
            .await
            .values()
            .filter(|p| p.is_owned_by(owner_id))
            .cloned()
            .collect())
    }
}

// ============================================================================
// Owner Resolution
// ============================================================================

/// A profile whose owner no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MissingOwner {
    /// The profile.
    pub profile_id: ProfileId,
    /// The owner it points at.
    pub owner_id: IdentityId,
}

/// Profiles split by whether their owner could be loaded.
#[derive(Debug, Clone, Default)]
pub struct OwnerResolution {
    /// Profiles paired with their loaded owner.
    pub resolved: Vec<(Profile, IdentityRecord)>,
    /// Profiles pointing at an owner that is gone.
    pub missing: Vec<MissingOwner>,
    /// Profiles with no owner assigned.
    pub unowned: Vec<ProfileId>,
}

/// Result of pushing a profile's email to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum MailPropagation {
    /// The owner's email was changed.
    Updated(IdentityRecord),
    /// The owner already had that email, or the profile has none.
    Unchanged,
    /// The profile has no owner.
    NoOwner,
    /// The owner no longer exists.
    MissingOwner(MissingOwner),
    /// The owner can log in and manages its own email.
    OwnerCoupled,
}

// ============================================================================
// Service
// ============================================================================

/// Service linking profiles to identities.
pub struct ProfileService {
    profiles: Arc<dyn ProfileStore>,
    acquisition: Arc<AcquisitionService>,
}

impl ProfileService {
    /// Create a new profile service.
    pub fn new(profiles: Arc<dyn ProfileStore>, acquisition: Arc<AcquisitionService>) -> Self {
        Self {
            profiles,
            acquisition,
        }
    }

    /// Load the owners of `profiles` in one batch.
    pub async fn resolve_owners(&self, profiles: &[Profile]) -> Result<OwnerResolution> {
        let ids: Vec<IdentityId> = profiles.iter().filter_map(|p| p.owner_id).collect();
        let owners: BTreeMap<IdentityId, IdentityRecord> = self
            .acquisition
            .store()
            .load_multiple(&ids)
            .await?
            .into_iter()
            .filter_map(|r| r.id.map(|id| (id, r)))
            .collect();

        let mut resolution = OwnerResolution::default();
        for profile in profiles {
            let Some(owner_id) = profile.owner_id else {
                resolution.unowned.push(profile.id);
                continue;
            };
            match owners.get(&owner_id) {
                Some(owner) => resolution.resolved.push((profile.clone(), owner.clone())),
                None => {
                    debug!(profile_id = %profile.id, owner_id = %owner_id, "Profile owner missing; skipping");
                    resolution.missing.push(MissingOwner {
                        profile_id: profile.id,
                        owner_id,
                    });
                }
            }
        }
        Ok(resolution)
    }

    /// Find or create an owner for an unowned profile from its email.
    ///
    /// Coupled identities are preferred; otherwise a decoupled identity is
    /// reused or created. Returns `None` when the profile already has an
    /// owner or has no email. If saving the profile fails, `profile` is left
    /// unowned so the call can be retried.
    #[instrument(skip_all, fields(profile_id = %profile.id, label = %label))]
    pub async fn acquire_owner(
        &self,
        profile: &mut Profile,
        label: &str,
    ) -> Result<Option<AcquisitionResult>> {
        if profile.owner_id.is_some() {
            debug!("Profile already owned");
            return Ok(None);
        }
        let Some(mail) = profile.mail().map(str::to_owned) else {
            debug!("Profile has no mail; cannot acquire owner");
            return Ok(None);
        };

        let context = AcquisitionContext::new(label)
            .with_prefer_coupled(true)
            .create_decoupled();
        let candidates = FieldMap::from([(MAIL_FIELD.to_string(), Value::String(mail))]);
        let result = self.acquisition.acquire(&candidates, &context).await?;

        if let Some(owner_id) = result.identity_id() {
            // The caller's profile only changes once the link is persisted
            let mut linked = profile.clone();
            linked.owner_id = Some(owner_id);
            *profile = self.profiles.save(&linked).await?;
            info!(owner_id = %owner_id, method = %result.method, "Profile owner linked");
        }
        Ok(Some(result))
    }

    /// Copy a profile's email onto its decoupled owner.
    #[instrument(skip_all, fields(profile_id = %profile.id))]
    pub async fn propagate_mail(&self, profile: &Profile) -> Result<MailPropagation> {
        let Some(owner_id) = profile.owner_id else {
            return Ok(MailPropagation::NoOwner);
        };
        let store = self.acquisition.store();
        let Some(mut owner) = store.load(owner_id).await? else {
            debug!(owner_id = %owner_id, "Profile owner missing; skipping mail propagation");
            return Ok(MailPropagation::MissingOwner(MissingOwner {
                profile_id: profile.id,
                owner_id,
            }));
        };
        if !owner.is_decoupled() {
            return Ok(MailPropagation::OwnerCoupled);
        }
        let Some(mail) = profile.mail() else {
            return Ok(MailPropagation::Unchanged);
        };
        if owner.mail() == Some(mail) {
            return Ok(MailPropagation::Unchanged);
        }

        owner.set_field(MAIL_FIELD, mail);
        let saved = store.save(&owner).await?;
        debug!(owner_id = %owner_id, "Owner mail updated from profile");
        Ok(MailPropagation::Updated(saved))
    }

    /// Profiles owned by `owner_id`.
    pub async fn profiles_for(&self, owner_id: IdentityId) -> Result<Vec<Profile>> {
        Ok(self.profiles.list_by_owner(owner_id).await?)
    }
}
