//! Device entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use domain::models::{Device, DeviceNote, DeviceStatus, TempAccess};

/// Database row mapping for the devices table.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceEntity {
    pub id: i64,
    pub user_id: String,
    pub device_identifier: String,
    pub display_name: String,
    pub platform: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub status: String,
    pub exclude_from_concurrent_limit: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_ip: Option<String>,
    pub session_count: i64,
    pub temp_access_until: Option<DateTime<Utc>>,
    pub temp_access_granted_at: Option<DateTime<Utc>>,
    pub temp_access_duration_minutes: Option<i32>,
    pub temp_access_bypass_policies: bool,
    pub request_description: Option<String>,
    pub request_submitted_at: Option<DateTime<Utc>>,
    pub request_read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DeviceEntity> for Device {
    fn from(entity: DeviceEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            device_identifier: entity.device_identifier,
            display_name: entity.display_name,
            platform: entity.platform,
            product: entity.product,
            version: entity.version,
            // The CHECK constraint keeps unknown values out; never panic on
            // a row we did not write.
            status: entity.status.parse().unwrap_or(DeviceStatus::Pending),
            exclude_from_concurrent_limit: entity.exclude_from_concurrent_limit,
            first_seen: entity.first_seen,
            last_seen: entity.last_seen,
            last_ip: entity.last_ip,
            session_count: entity.session_count,
            temp_access: TempAccess {
                until: entity.temp_access_until,
                granted_at: entity.temp_access_granted_at,
                duration_minutes: entity.temp_access_duration_minutes,
                bypass_policies: entity.temp_access_bypass_policies,
            },
            note: DeviceNote {
                description: entity.request_description,
                submitted_at: entity.request_submitted_at,
                read_at: entity.request_read_at,
            },
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
