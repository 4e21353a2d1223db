//! User preference endpoints for the admin UI.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use validator::Validate;

use domain::models::{
    ConcurrentLimitRequest, IpPolicyRequest, PreferenceRequest, UserPreference,
};
use persistence::repositories::{DeviceRepository, UserPreferenceRepository};

use crate::app::AppState;
use crate::error::ApiError;

/// A user row in the admin listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    #[serde(flatten)]
    pub preference: UserPreference,
    pub device_count: usize,
}

/// `GET /api/users` — every observed user with their overrides.
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let preferences = UserPreferenceRepository::new(state.pool.clone())
        .list_all()
        .await?;
    let devices = DeviceRepository::new(state.pool.clone());

    let mut users = Vec::with_capacity(preferences.len());
    for entity in preferences {
        let preference = UserPreference::from(entity);
        let device_count = devices.list_for_user(&preference.user_id).await?.len();
        users.push(UserSummary {
            preference,
            device_count,
        });
    }
    Ok(Json(users))
}

/// `POST /api/users/:id/preference` — set or clear the default-block
/// override.
pub async fn set_preference(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<PreferenceRequest>,
) -> Result<Json<UserPreference>, ApiError> {
    let repo = UserPreferenceRepository::new(state.pool.clone());
    repo.set_default_block(&user_id, request.default_block)
        .await?;
    fetch(&repo, &user_id).await
}

/// `POST /api/users/:id/ip-policy` — network policy and IP allow-list.
pub async fn set_ip_policy(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<IpPolicyRequest>,
) -> Result<Json<UserPreference>, ApiError> {
    request.validate()?;

    let repo = UserPreferenceRepository::new(state.pool.clone());
    repo.set_ip_policy(
        &user_id,
        request.network_policy,
        request.ip_access_policy,
        &request.allowed_ips,
    )
    .await?;
    fetch(&repo, &user_id).await
}

/// `POST /api/users/:id/concurrent-stream-limit` — per-user cap override.
pub async fn set_concurrent_limit(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<ConcurrentLimitRequest>,
) -> Result<Json<UserPreference>, ApiError> {
    request.validate()?;

    let repo = UserPreferenceRepository::new(state.pool.clone());
    repo.set_concurrent_limit(&user_id, request.limit).await?;
    fetch(&repo, &user_id).await
}

/// `POST /api/users/:id/hide`.
pub async fn hide_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserPreference>, ApiError> {
    let repo = UserPreferenceRepository::new(state.pool.clone());
    repo.set_hidden(&user_id, true).await?;
    fetch(&repo, &user_id).await
}

/// `POST /api/users/:id/show`.
pub async fn show_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserPreference>, ApiError> {
    let repo = UserPreferenceRepository::new(state.pool.clone());
    repo.set_hidden(&user_id, false).await?;
    fetch(&repo, &user_id).await
}

async fn fetch(
    repo: &UserPreferenceRepository,
    user_id: &str,
) -> Result<Json<UserPreference>, ApiError> {
    let entity = repo
        .find(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {user_id} not found")))?;
    Ok(Json(UserPreference::from(entity)))
}
