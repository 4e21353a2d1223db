//! Device management endpoints for the admin UI.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{Duration, Utc};
use validator::Validate;

use domain::models::{Device, DeviceResponse, TempAccessUpdate, UpdateDeviceRequest};
use persistence::repositories::DeviceRepository;

use crate::app::AppState;
use crate::error::ApiError;

/// `GET /api/devices` — every tracked device, most recently seen first.
pub async fn list_devices(
    State(state): State<AppState>,
) -> Result<Json<Vec<DeviceResponse>>, ApiError> {
    let now = Utc::now();
    let devices = DeviceRepository::new(state.pool.clone())
        .list_all()
        .await?
        .into_iter()
        .map(Device::from)
        .map(|d| DeviceResponse::from_device(d, now))
        .collect();
    Ok(Json(devices))
}

/// `PATCH /api/devices/:id` — apply any subset of admin mutations: rename,
/// status change, concurrent-exclusion flag, temp-access grant/revoke,
/// mark-note-read.
pub async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateDeviceRequest>,
) -> Result<Json<DeviceResponse>, ApiError> {
    request.validate()?;

    let repo = DeviceRepository::new(state.pool.clone());
    let existing = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Device {id} not found")))?;

    if let Some(display_name) = &request.display_name {
        repo.rename(id, display_name).await?;
    }
    if let Some(status) = request.status {
        repo.set_status(id, status).await?;
    }
    if let Some(exclude) = request.exclude_from_concurrent_limit {
        repo.set_concurrent_exclusion(id, exclude).await?;
    }
    if let Some(temp_access) = &request.temp_access {
        match temp_access {
            TempAccessUpdate::Grant {
                duration_minutes,
                bypass_policies,
            } => {
                if *duration_minutes <= 0 {
                    return Err(ApiError::Validation(
                        "Temp access duration must be positive".to_string(),
                    ));
                }
                let now = Utc::now();
                let until = now + Duration::minutes(i64::from(*duration_minutes));
                repo.grant_temp_access(id, until, *duration_minutes, *bypass_policies, now)
                    .await?;
            }
            TempAccessUpdate::Revoke => {
                repo.revoke_temp_access(id).await?;
            }
        }
    }
    if request.mark_note_read {
        repo.mark_note_read(id).await?;
    }

    let updated = repo
        .find_by_id(existing.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Device {id} not found")))?;
    Ok(Json(DeviceResponse::from_device(
        Device::from(updated),
        Utc::now(),
    )))
}

/// `DELETE /api/devices/:id` — forget a device; it reappears as pending if
/// observed again.
pub async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = DeviceRepository::new(state.pool.clone()).delete(id).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound(format!("Device {id} not found")));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
