//! Time rule entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use domain::models::TimeRule;

/// Database row mapping for the time_rules table.
#[derive(Debug, Clone, FromRow)]
pub struct TimeRuleEntity {
    pub id: i64,
    pub user_id: String,
    pub device_identifier: Option<String>,
    pub day_of_week: i16,
    pub start_time: String,
    pub end_time: String,
    pub enabled: bool,
    pub rule_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TimeRuleEntity> for TimeRule {
    fn from(entity: TimeRuleEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            device_identifier: entity.device_identifier,
            day_of_week: entity.day_of_week,
            start_time: entity.start_time,
            end_time: entity.end_time,
            enabled: entity.enabled,
            rule_name: entity.rule_name,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
