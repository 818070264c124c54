//! Operator settings for registration-time acquisition.
//!
//! Settings are read through a [`SettingsProvider`] on every registration
//! call, so a change takes effect on the next submission without a restart.

use std::env;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{AcquisitionError, Result};
use crate::types::BehaviorMode;

/// Default variable enabling acquisition during registration.
pub const ENV_ACQUIRE_ON_REGISTER: &str = "DECOUPLED_AUTH_ACQUIRE_ON_REGISTER";
/// Default variable selecting first-match behavior during registration.
pub const ENV_REGISTER_PREFER_FIRST: &str = "DECOUPLED_AUTH_REGISTER_PREFER_FIRST";

/// The two operator switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    /// Look for a decoupled record to claim when a user registers.
    pub registration_enabled: bool,
    /// Use [`BehaviorMode::First`] instead of [`BehaviorMode::Default`]
    /// for that lookup.
    pub registration_prefer_first: bool,
}

impl AcquisitionSettings {
    /// Behavior mode for registration lookups.
    #[must_use]
    pub fn registration_behavior(&self) -> BehaviorMode {
        if self.registration_prefer_first {
            BehaviorMode::First
        } else {
            BehaviorMode::Default
        }
    }
}

/// Source of the current settings.
pub trait SettingsProvider: Send + Sync {
    /// Read the settings as they are right now.
    fn current(&self) -> Result<AcquisitionSettings>;
}

// ============================================================================
// Environment
// ============================================================================

/// Reads settings from environment variables on every call.
///
/// Accepted values (case-insensitive): `1`, `true`, `yes`, `on` and
/// `0`, `false`, `no`, `off`. An unset variable means `false`.
#[derive(Debug, Clone)]
pub struct EnvSettingsProvider {
    acquire_var: String,
    prefer_first_var: String,
}

impl Default for EnvSettingsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvSettingsProvider {
    /// Provider using [`ENV_ACQUIRE_ON_REGISTER`] and
    /// [`ENV_REGISTER_PREFER_FIRST`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            acquire_var: ENV_ACQUIRE_ON_REGISTER.to_string(),
            prefer_first_var: ENV_REGISTER_PREFER_FIRST.to_string(),
        }
    }

    /// Read the enable switch from a different variable.
    #[must_use]
    pub fn acquire_var(mut self, var: impl Into<String>) -> Self {
        self.acquire_var = var.into();
        self
    }

    /// Read the first-match switch from a different variable.
    #[must_use]
    pub fn prefer_first_var(mut self, var: impl Into<String>) -> Self {
        self.prefer_first_var = var.into();
        self
    }
}

impl SettingsProvider for EnvSettingsProvider {
    fn current(&self) -> Result<AcquisitionSettings> {
        Ok(AcquisitionSettings {
            registration_enabled: read_flag(&self.acquire_var)?,
            registration_prefer_first: read_flag(&self.prefer_first_var)?,
        })
    }
}

fn read_flag(var: &str) -> Result<bool> {
    match env::var(var) {
        Ok(raw) => parse_flag(var, &raw),
        Err(_) => Ok(false),
    }
}

/// Parse an operator boolean.
pub fn parse_flag(var: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(AcquisitionError::ConfigInvalid {
            var: var.to_string(),
            reason: format!("expected a boolean, got {raw:?}"),
        }),
    }
}

// ============================================================================
// In-process
// ============================================================================

/// Settings held in memory and changeable at runtime.
#[derive(Debug, Default)]
pub struct StaticSettingsProvider {
    settings: RwLock<AcquisitionSettings>,
}

impl StaticSettingsProvider {
    /// Provider starting from `settings`.
    #[must_use]
    pub fn new(settings: AcquisitionSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Replace the current settings.
    pub fn set(&self, settings: AcquisitionSettings) {
        // A poisoned lock still holds a plain Copy value; take it over.
        let mut guard = self
            .settings
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = settings;
    }
}

impl SettingsProvider for StaticSettingsProvider {
    fn current(&self) -> Result<AcquisitionSettings> {
        Ok(*self
            .settings
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner))
    }
}
