//! User preference entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use domain::models::{IpAccessPolicy, NetworkPolicy, UserPreference};

/// Database row mapping for the user_preferences table.
#[derive(Debug, Clone, FromRow)]
pub struct UserPreferenceEntity {
    pub user_id: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub hidden: bool,
    pub default_block: Option<bool>,
    pub network_policy: String,
    pub ip_access_policy: String,
    pub allowed_ips: serde_json::Value,
    pub concurrent_stream_limit: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserPreferenceEntity> for UserPreference {
    fn from(entity: UserPreferenceEntity) -> Self {
        Self {
            user_id: entity.user_id,
            username: entity.username,
            avatar_url: entity.avatar_url,
            hidden: entity.hidden,
            default_block: entity.default_block,
            network_policy: entity
                .network_policy
                .parse()
                .unwrap_or(NetworkPolicy::Both),
            ip_access_policy: entity
                .ip_access_policy
                .parse()
                .unwrap_or(IpAccessPolicy::All),
            allowed_ips: serde_json::from_value(entity.allowed_ips).unwrap_or_default(),
            concurrent_stream_limit: entity.concurrent_stream_limit,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
