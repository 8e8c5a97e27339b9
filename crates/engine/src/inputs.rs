//! `UserInputs`: the field values a user submits with a deployment.
//!
//! One flat map holds everything: direct credential overrides, raw
//! provisioning fields, the storage selector, `{{input:…}}` values and the
//! optional trigger time.

use std::collections::BTreeMap;

use nodes::CredentialKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field holding the daily trigger time (`HH:MM`).
pub const TRIGGER_TIME_FIELD: &str = "trigger_time";
/// Field holding the instance timezone.
pub const TIMEZONE_FIELD: &str = "timezone";
/// Field overriding the instance name.
pub const WORKFLOW_NAME_FIELD: &str = "workflow_name";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserInputs {
    fields: BTreeMap<String, Value>,
}

impl UserInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Raw JSON value of a field; `null` counts as absent.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// Field rendered as text. Blank strings count as absent so an empty form
    /// field never masquerades as a supplied value.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.value(field)? {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }

    pub fn flag(&self, field: &str) -> bool {
        match self.value(field) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            _ => false,
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.text(field).is_some()
    }

    /// Direct external credential id supplied for `kind`.
    pub fn credential_override(&self, kind: CredentialKind) -> Option<String> {
        self.text(&kind.override_field())
    }

    /// Display name accompanying a direct override.
    pub fn credential_override_name(&self, kind: CredentialKind) -> Option<String> {
        self.text(&kind.override_name_field())
    }

    /// Whether the user reports having just completed authorization for `kind`.
    pub fn just_connected(&self, kind: CredentialKind) -> bool {
        self.flag(&kind.connected_field())
    }

    /// Names of every supplied field, for diagnostics. Values are never
    /// exposed through this.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for UserInputs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut inputs = Self::new();
        for (k, v) in iter {
            inputs.insert(k, v);
        }
        inputs
    }
}
