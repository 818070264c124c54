//! Identity records and their field map.
//!
//! A record is a bag of named JSON values plus three system properties
//! (`id`, `external_id`, `created_at`) that a merge copies as a unit.
//! The `decoupled` flag is derived from the login-name field and is never
//! stored independently.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use decoupled_core::{ExternalId, IdentityId};
use serde::Serialize;
use serde_json::Value;

/// Ordered mapping of field name to value.
pub type FieldMap = BTreeMap<String, Value>;

/// Primary login-name field. A record without it is decoupled.
pub const LOGIN_NAME_FIELD: &str = "name";
/// Credential field, cleared together with the login name on decouple.
pub const CREDENTIAL_FIELD: &str = "pass";
/// Email field, the usual match key.
pub const MAIL_FIELD: &str = "mail";
/// Multi-valued role field, merged by union.
pub const ROLES_FIELD: &str = "roles";
/// Pseudo-field accepted in candidate values and creation values.
///
/// It is translated into a condition on [`LOGIN_NAME_FIELD`] and is never
/// written to a record.
pub const DECOUPLED_PSEUDO_FIELD: &str = "decoupled";

/// Whether a field value counts as unset.
///
/// `null`, `""`, `[]` and `{}` are empty. `false` and `0` are values.
#[must_use]
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// An identity record, coupled or decoupled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityRecord {
    /// Store-allocated id; `None` until first insert.
    pub id: Option<IdentityId>,
    /// Globally unique id; `None` until first insert.
    pub external_id: Option<ExternalId>,
    /// Creation timestamp; `None` until first insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Extensible field values.
    pub fields: FieldMap,
    pub(crate) decoupled: bool,
    #[serde(skip)]
    pub(crate) enforce_is_new: bool,
}

impl Default for IdentityRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRecord {
    /// A fresh, unsaved record with no fields.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: None,
            external_id: None,
            created_at: None,
            fields: FieldMap::new(),
            decoupled: true,
            enforce_is_new: true,
        }
    }

    /// Rebuild a record as it comes out of a store.
    ///
    /// The decoupled flag is recomputed and the record is not treated as new.
    #[must_use]
    pub fn hydrate(
        id: IdentityId,
        external_id: ExternalId,
        created_at: DateTime<Utc>,
        fields: FieldMap,
    ) -> Self {
        let mut record = Self {
            id: Some(id),
            external_id: Some(external_id),
            created_at: Some(created_at),
            fields,
            decoupled: true,
            enforce_is_new: false,
        };
        record.recompute_decoupled();
        record
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_field(name, value);
        self
    }

    /// Builder-style role setter.
    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<Value> = roles.into_iter().map(|r| Value::String(r.into())).collect();
        self.set_field(ROLES_FIELD, Value::Array(roles));
        self
    }

    /// Value of a field, if present.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether a field is absent or holds an empty value.
    #[must_use]
    pub fn field_is_empty(&self, name: &str) -> bool {
        self.fields.get(name).is_none_or(is_empty_value)
    }

    /// Set a field. Touching the login name recomputes the decoupled flag.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let touches_login = name == LOGIN_NAME_FIELD;
        self.fields.insert(name, value.into());
        if touches_login {
            self.recompute_decoupled();
        }
    }

    /// Remove a field, returning its previous value.
    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        let previous = self.fields.remove(name);
        if name == LOGIN_NAME_FIELD {
            self.recompute_decoupled();
        }
        previous
    }

    /// The login name, when set to a non-empty string.
    #[must_use]
    pub fn login_name(&self) -> Option<&str> {
        self.fields
            .get(LOGIN_NAME_FIELD)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// The email address, when set to a non-empty string.
    #[must_use]
    pub fn mail(&self) -> Option<&str> {
        self.fields
            .get(MAIL_FIELD)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Roles held by this record. Non-string entries are ignored.
    #[must_use]
    pub fn roles(&self) -> BTreeSet<String> {
        self.fields
            .get(ROLES_FIELD)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Add a role. Returns `false` if it was already held.
    pub fn add_role(&mut self, role: &str) -> bool {
        let mut roles = self.roles();
        if !roles.insert(role.to_string()) {
            return false;
        }
        let values = roles.into_iter().map(Value::String).collect();
        self.fields.insert(ROLES_FIELD.to_string(), Value::Array(values));
        true
    }

    /// Whether the next save must insert rather than update.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.enforce_is_new || self.id.is_none()
    }

    /// Force insert (`true`) or update-on-existing-key (`false`) on next save.
    pub fn set_enforce_is_new(&mut self, enforce: bool) {
        self.enforce_is_new = enforce;
    }
}
