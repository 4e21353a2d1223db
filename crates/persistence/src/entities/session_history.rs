//! Session history entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use domain::models::SessionHistory;

/// Database row mapping for the session_history table.
#[derive(Debug, Clone, FromRow)]
pub struct SessionHistoryEntity {
    pub id: i64,
    pub session_key: String,
    pub user_id: String,
    pub device_id: Option<i64>,
    pub device_address: Option<String>,
    pub title: Option<String>,
    pub grandparent_title: Option<String>,
    pub parent_title: Option<String>,
    pub year: Option<i32>,
    pub media_type: Option<String>,
    pub rating_key: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<SessionHistoryEntity> for SessionHistory {
    fn from(entity: SessionHistoryEntity) -> Self {
        Self {
            id: entity.id,
            session_key: entity.session_key,
            user_id: entity.user_id,
            device_id: entity.device_id,
            device_address: entity.device_address,
            title: entity.title,
            grandparent_title: entity.grandparent_title,
            parent_title: entity.parent_title,
            year: entity.year,
            media_type: entity.media_type,
            rating_key: entity.rating_key,
            started_at: entity.started_at,
            ended_at: entity.ended_at,
        }
    }
}
