//! Device domain model.
//!
//! A device is one `(user_id, device_identifier)` pair observed in a playback
//! session; it is the subject of every access-control decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Approval state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Pending,
    Approved,
    Rejected,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Pending => "pending",
            DeviceStatus::Approved => "approved",
            DeviceStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeviceStatus::Pending),
            "approved" => Ok(DeviceStatus::Approved),
            "rejected" => Ok(DeviceStatus::Rejected),
            other => Err(format!("unknown device status: {other}")),
        }
    }
}

/// A time-bounded access override for a single device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempAccess {
    pub until: Option<DateTime<Utc>>,
    pub granted_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub bypass_policies: bool,
}

impl TempAccess {
    /// A grant is active iff `until` exists and lies in the future.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.until.map(|until| until > now).unwrap_or(false)
    }
}

/// The one-shot note a user may attach to a device from the portal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceNote {
    pub description: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl DeviceNote {
    /// A note was submitted at some point in the device's lifetime.
    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }

    /// A note exists and no administrator has marked it read yet.
    pub fn is_unread(&self) -> bool {
        self.submitted_at.is_some() && self.read_at.is_none()
    }
}

/// A tracked `(user, client machine)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: i64,
    pub user_id: String,
    pub device_identifier: String,
    pub display_name: String,
    pub platform: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub status: DeviceStatus,
    pub exclude_from_concurrent_limit: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_ip: Option<String>,
    pub session_count: i64,
    pub temp_access: TempAccess,
    pub note: DeviceNote,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn has_active_temp_access(&self, now: DateTime<Utc>) -> bool {
        self.temp_access.is_active(now)
    }
}

/// Admin payload for `PATCH /api/devices/:id`. All fields optional; only the
/// supplied ones are applied.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeviceRequest {
    #[validate(length(min = 1, max = 120, message = "Display name must be 1-120 characters"))]
    pub display_name: Option<String>,
    pub status: Option<DeviceStatus>,
    pub exclude_from_concurrent_limit: Option<bool>,
    pub temp_access: Option<TempAccessUpdate>,
    #[serde(default)]
    pub mark_note_read: bool,
}

/// Temp-access mutation inside a device PATCH.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum TempAccessUpdate {
    #[serde(rename_all = "camelCase")]
    Grant {
        duration_minutes: i32,
        #[serde(default)]
        bypass_policies: bool,
    },
    Revoke,
}

/// Portal payload for the one-shot device note.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitNoteRequest {
    #[validate(length(min = 1, max = 500, message = "Description must be 1-500 characters"))]
    pub description: String,
}

/// Device representation returned by the admin and portal endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub id: i64,
    pub user_id: String,
    pub device_identifier: String,
    pub display_name: String,
    pub platform: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub status: DeviceStatus,
    pub exclude_from_concurrent_limit: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_ip: Option<String>,
    pub session_count: i64,
    pub temp_access_active: bool,
    pub temp_access: TempAccess,
    pub note: DeviceNote,
}

impl DeviceResponse {
    pub fn from_device(device: Device, now: DateTime<Utc>) -> Self {
        let temp_access_active = device.has_active_temp_access(now);
        Self {
            id: device.id,
            user_id: device.user_id,
            device_identifier: device.device_identifier,
            display_name: device.display_name,
            platform: device.platform,
            product: device.product,
            version: device.version,
            status: device.status,
            exclude_from_concurrent_limit: device.exclude_from_concurrent_limit,
            first_seen: device.first_seen,
            last_seen: device.last_seen,
            last_ip: device.last_ip,
            session_count: device.session_count,
            temp_access_active,
            temp_access: device.temp_access,
            note: device.note,
        }
    }
}
