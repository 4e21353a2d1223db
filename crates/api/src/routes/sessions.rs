//! Active-session endpoints for the admin UI.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use domain::models::{DeviceStatus, Session};
use persistence::repositories::DeviceRepository;

use crate::app::AppState;
use crate::error::ApiError;

/// One session enriched with the tracked device's state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedSession {
    #[serde(flatten)]
    pub session: Session,
    pub device_id: Option<i64>,
    pub device_status: Option<DeviceStatus>,
    pub device_session_count: Option<i64>,
    pub temp_access_active: bool,
    /// Plex web-app link to the playing item, when the server identity is
    /// known.
    pub deep_link: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsResponse {
    pub sessions: Vec<EnrichedSession>,
    pub fetched_at: chrono::DateTime<Utc>,
}

/// Payload for an admin-initiated termination.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateResponse {
    pub session_id: String,
    pub terminated: bool,
}

/// `GET /api/sessions` — the current snapshot, enriched with device state.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<SessionsResponse>, ApiError> {
    let snapshot = state.plex.fetch_sessions().await?;
    let now = Utc::now();

    // Best effort: session listing still works while the identity endpoint
    // is unreachable.
    let identity = state.plex.server_identity().await.ok();

    let devices = DeviceRepository::new(state.pool.clone());
    let mut sessions = Vec::with_capacity(snapshot.sessions.len());
    for session in snapshot.sessions {
        let device = devices
            .find_by_natural_key(&session.user.id, &session.player.machine_id)
            .await?
            .map(domain::models::Device::from);

        let deep_link = match (&identity, &session.content.rating_key) {
            (Some(machine), Some(rating_key)) => Some(format!(
                "https://app.plex.tv/desktop/#!/server/{machine}/details?key=%2Flibrary%2Fmetadata%2F{rating_key}"
            )),
            _ => None,
        };

        sessions.push(EnrichedSession {
            device_id: device.as_ref().map(|d| d.id),
            device_status: device.as_ref().map(|d| d.status),
            device_session_count: device.as_ref().map(|d| d.session_count),
            temp_access_active: device
                .as_ref()
                .map(|d| d.has_active_temp_access(now))
                .unwrap_or(false),
            deep_link,
            session,
        });
    }

    Ok(Json(SessionsResponse {
        sessions,
        fetched_at: snapshot.fetched_at,
    }))
}

/// `POST /api/sessions/:id/terminate` — terminate with a custom reason.
pub async fn terminate_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<TerminateRequest>,
) -> Result<Json<TerminateResponse>, ApiError> {
    let reason = request
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "Stream stopped by the server administrator.".to_string());

    state.plex.terminate_session(&session_id, &reason).await?;

    Ok(Json(TerminateResponse {
        session_id,
        terminated: true,
    }))
}
