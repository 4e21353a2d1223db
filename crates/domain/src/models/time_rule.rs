//! Weekly recurring block windows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A weekly block window. While enabled and the configured wall clock is
/// inside `[start_time, end_time)` on `day_of_week`, streaming is blocked.
///
/// Windows with `start_time > end_time` cross midnight and are interpreted
/// modulo 24h: `[start, 24:00)` on `day_of_week` and `[00:00, end)` on the
/// following day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRule {
    pub id: i64,
    pub user_id: String,
    /// Empty/None applies the rule to all of the user's devices.
    pub device_identifier: Option<String>,
    /// 0 = Sunday through 6 = Saturday.
    pub day_of_week: i16,
    pub start_time: String,
    pub end_time: String,
    pub enabled: bool,
    pub rule_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeRule {
    /// Whether the rule targets one specific device.
    pub fn is_device_specific(&self) -> bool {
        self.device_identifier
            .as_deref()
            .map(|d| !d.is_empty())
            .unwrap_or(false)
    }
}

/// Payload for `POST /api/users/:id/rules`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimeRuleRequest {
    pub device_identifier: Option<String>,
    #[validate(custom(function = "shared::validation::validate_day_of_week"))]
    pub day_of_week: i16,
    #[validate(custom(function = "shared::validation::validate_hhmm"))]
    pub start_time: String,
    #[validate(custom(function = "shared::validation::validate_hhmm"))]
    pub end_time: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[validate(length(min = 1, max = 80, message = "Rule name must be 1-80 characters"))]
    pub rule_name: String,
}

/// Payload for `PUT /api/users/:id/rules/:rule_id`. Only supplied fields are
/// applied.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTimeRuleRequest {
    pub device_identifier: Option<String>,
    #[validate(custom(function = "validate_optional_day"))]
    pub day_of_week: Option<i16>,
    #[validate(custom(function = "validate_optional_hhmm"))]
    pub start_time: Option<String>,
    #[validate(custom(function = "validate_optional_hhmm"))]
    pub end_time: Option<String>,
    pub enabled: Option<bool>,
    #[validate(length(min = 1, max = 80, message = "Rule name must be 1-80 characters"))]
    pub rule_name: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn validate_optional_day(day: i16) -> Result<(), validator::ValidationError> {
    shared::validation::validate_day_of_week(day)
}

fn validate_optional_hhmm(value: &str) -> Result<(), validator::ValidationError> {
    shared::validation::validate_hhmm(value)
}
