//! User portal endpoints.
//!
//! Everything here is scoped to the calling user's Plex id, supplied by the
//! fronting auth layer (see `extractors::PlexUserId`).

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use validator::Validate;

use domain::models::{Device, DeviceResponse, SubmitNoteRequest, TimeRule, UserPreference};
use domain::services::events::Event;
use persistence::repositories::{DeviceRepository, TimeRuleRepository, UserPreferenceRepository};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::PlexUserId;
use crate::services::settings::keys;

/// The policy settings that concern one user: their overrides resolved
/// against the global defaults.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalSettings {
    pub network_policy: String,
    pub ip_access_policy: String,
    pub effective_default_block: bool,
    /// 0 means unlimited.
    pub effective_concurrent_stream_limit: i64,
}

/// `GET /user-portal/devices` — the caller's devices.
pub async fn my_devices(
    State(state): State<AppState>,
    PlexUserId(user_id): PlexUserId,
) -> Result<Json<Vec<DeviceResponse>>, ApiError> {
    let now = Utc::now();
    let devices = DeviceRepository::new(state.pool.clone())
        .list_for_user(&user_id)
        .await?
        .into_iter()
        .map(Device::from)
        .map(|d| DeviceResponse::from_device(d, now))
        .collect();
    Ok(Json(devices))
}

/// `GET /user-portal/rules` — the caller's time rules.
pub async fn my_rules(
    State(state): State<AppState>,
    PlexUserId(user_id): PlexUserId,
) -> Result<Json<Vec<TimeRule>>, ApiError> {
    let rules = TimeRuleRepository::new(state.pool.clone())
        .list_for_user(&user_id)
        .await?
        .into_iter()
        .map(TimeRule::from)
        .collect();
    Ok(Json(rules))
}

/// `GET /user-portal/settings` — the effective policy settings for the
/// caller.
pub async fn my_settings(
    State(state): State<AppState>,
    PlexUserId(user_id): PlexUserId,
) -> Result<Json<PortalSettings>, ApiError> {
    let preference = UserPreferenceRepository::new(state.pool.clone())
        .find(&user_id)
        .await?
        .map(UserPreference::from);

    let global_block = state.settings.get_bool(keys::DEFAULT_BLOCK).await?;
    let global_limit = state
        .settings
        .get_int(keys::CONCURRENT_STREAM_LIMIT)
        .await?;

    let (network_policy, ip_access_policy, default_block, limit) = match &preference {
        Some(p) => (
            p.network_policy.to_string(),
            p.ip_access_policy.to_string(),
            p.default_block,
            p.concurrent_stream_limit.map(i64::from),
        ),
        None => ("both".to_string(), "all".to_string(), None, None),
    };

    Ok(Json(PortalSettings {
        network_policy,
        ip_access_policy,
        effective_default_block: default_block.unwrap_or(global_block),
        effective_concurrent_stream_limit: limit.unwrap_or(global_limit),
    }))
}

/// `POST /user-portal/devices/:id/request` — submit the one-shot note for a
/// device. A device gets exactly one note over its lifetime; repeats are
/// rejected with a conflict.
pub async fn submit_note(
    State(state): State<AppState>,
    PlexUserId(user_id): PlexUserId,
    Path(device_id): Path<i64>,
    Json(request): Json<SubmitNoteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    request.validate()?;

    let repo = DeviceRepository::new(state.pool.clone());
    let device = repo
        .find_by_id(device_id)
        .await?
        .filter(|d| d.user_id == user_id)
        .ok_or_else(|| ApiError::NotFound(format!("Device {device_id} not found")))?;

    let submitted = repo
        .submit_note(device.id, request.description.trim(), Utc::now())
        .await?;
    if submitted == 0 {
        return Err(ApiError::Conflict(
            "A note was already submitted for this device".to_string(),
        ));
    }

    state.events.publish(&Event::DeviceNoteSubmitted {
        user_id,
        device_identifier: device.device_identifier,
        description: request.description.trim().to_string(),
    });

    Ok(Json(serde_json::json!({ "submitted": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portal_settings_serializes() {
        let settings = PortalSettings {
            network_policy: "both".to_string(),
            ip_access_policy: "all".to_string(),
            effective_default_block: false,
            effective_concurrent_stream_limit: 2,
        };
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["networkPolicy"], "both");
        assert_eq!(json["effectiveConcurrentStreamLimit"], 2);
    }

    #[test]
    fn test_submit_note_request_validation() {
        let ok: SubmitNoteRequest =
            serde_json::from_str(r#"{"description":"please approve my TV"}"#).unwrap();
        assert!(ok.validate().is_ok());

        let empty: SubmitNoteRequest = serde_json::from_str(r#"{"description":""}"#).unwrap();
        assert!(empty.validate().is_err());
    }
}
