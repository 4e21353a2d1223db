//! Settings endpoints for the admin UI.

use std::collections::HashMap;

use axum::{extract::State, Json};
use serde::Serialize;

use domain::models::UpdateSettingsRequest;

use crate::app::AppState;
use crate::error::ApiError;
use crate::services::settings::SettingsError;

/// One setting in the admin listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingView {
    pub key: String,
    pub value: serde_json::Value,
    pub kind: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of a bulk settings write.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsResponse {
    pub updated: Vec<String>,
    pub invalid: HashMap<String, String>,
}

/// `GET /api/settings` — every non-private setting with its typed value.
pub async fn list_settings(
    State(state): State<AppState>,
) -> Result<Json<Vec<SettingView>>, ApiError> {
    let settings = state
        .settings
        .list_public()
        .await?
        .into_iter()
        .map(|s| SettingView {
            value: s.typed_value(),
            kind: s.kind.to_string(),
            key: s.key,
            updated_at: s.updated_at,
        })
        .collect();
    Ok(Json(settings))
}

/// `PATCH /api/settings` — apply a batch of edits. Valid keys are written,
/// invalid ones reported; one bad key does not abort the rest.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<UpdateSettingsResponse>, ApiError> {
    let mut updated = Vec::new();
    let mut invalid = HashMap::new();

    let mut entries: Vec<_> = request.settings.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (key, value) in entries {
        match state.settings.set(&key, &value).await {
            Ok(()) => updated.push(key),
            Err(SettingsError::Database(e)) => return Err(e.into()),
            Err(error) => {
                invalid.insert(key, error.to_string());
            }
        }
    }

    Ok(Json(UpdateSettingsResponse { updated, invalid }))
}
