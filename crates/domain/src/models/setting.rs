//! Runtime-typed global settings.
//!
//! Settings are persisted as a raw string plus a type tag; typed getters cast
//! on read and writes are validated against the declared kind.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value type of a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingKind {
    String,
    Int,
    Bool,
    Json,
}

impl SettingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKind::String => "string",
            SettingKind::Int => "int",
            SettingKind::Bool => "bool",
            SettingKind::Json => "json",
        }
    }
}

impl std::fmt::Display for SettingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SettingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(SettingKind::String),
            "int" => Ok(SettingKind::Int),
            "bool" => Ok(SettingKind::Bool),
            "json" => Ok(SettingKind::Json),
            other => Err(format!("unknown setting kind: {other}")),
        }
    }
}

/// One persisted key/value pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub kind: SettingKind,
    /// Private settings are excluded from list/export responses.
    pub private: bool,
    pub updated_at: DateTime<Utc>,
}

impl Setting {
    pub fn as_bool(&self) -> Option<bool> {
        match self.value.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        self.value.trim().parse().ok()
    }

    pub fn as_json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.value).ok()
    }

    /// The value as JSON for API responses, cast per the declared kind.
    pub fn typed_value(&self) -> serde_json::Value {
        match self.kind {
            SettingKind::String => serde_json::Value::String(self.value.clone()),
            SettingKind::Int => self
                .as_int()
                .map(serde_json::Value::from)
                .unwrap_or(serde_json::Value::Null),
            SettingKind::Bool => self
                .as_bool()
                .map(serde_json::Value::from)
                .unwrap_or(serde_json::Value::Null),
            SettingKind::Json => self.as_json().unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Validate an incoming JSON value against a setting's kind and render the
/// raw string that gets persisted.
pub fn render_setting_value(
    kind: SettingKind,
    value: &serde_json::Value,
) -> Result<String, String> {
    match (kind, value) {
        (SettingKind::String, serde_json::Value::String(s)) => Ok(s.clone()),
        (SettingKind::Int, serde_json::Value::Number(n)) if n.is_i64() => Ok(n.to_string()),
        (SettingKind::Bool, serde_json::Value::Bool(b)) => Ok(b.to_string()),
        (SettingKind::Json, v) => Ok(v.to_string()),
        (kind, v) => Err(format!("expected a {kind} value, got {v}")),
    }
}

/// Payload for `PATCH /api/settings`: key to new value.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub settings: HashMap<String, serde_json::Value>,
}
