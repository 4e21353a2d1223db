//! Time-rule endpoints for the admin UI.

use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use domain::models::{CreateTimeRuleRequest, TimeRule, UpdateTimeRuleRequest};
use persistence::repositories::TimeRuleRepository;

use crate::app::AppState;
use crate::error::ApiError;

/// `GET /api/users/:id/rules`.
pub async fn list_rules(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<TimeRule>>, ApiError> {
    let rules = TimeRuleRepository::new(state.pool.clone())
        .list_for_user(&user_id)
        .await?
        .into_iter()
        .map(TimeRule::from)
        .collect();
    Ok(Json(rules))
}

/// `POST /api/users/:id/rules`.
pub async fn create_rule(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<CreateTimeRuleRequest>,
) -> Result<Json<TimeRule>, ApiError> {
    request.validate()?;

    let rule = TimeRuleRepository::new(state.pool.clone())
        .create(
            &user_id,
            normalized_device(request.device_identifier.as_deref()),
            request.day_of_week,
            &request.start_time,
            &request.end_time,
            request.enabled,
            &request.rule_name,
        )
        .await?;
    Ok(Json(TimeRule::from(rule)))
}

/// `PUT /api/users/:id/rules/:rule_id` — partial update over the stored row.
pub async fn update_rule(
    State(state): State<AppState>,
    Path((user_id, rule_id)): Path<(String, i64)>,
    Json(request): Json<UpdateTimeRuleRequest>,
) -> Result<Json<TimeRule>, ApiError> {
    request.validate()?;

    let repo = TimeRuleRepository::new(state.pool.clone());
    let existing = repo
        .find_by_id(rule_id, &user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Rule {rule_id} not found")))?;

    let device_identifier = match &request.device_identifier {
        Some(value) => normalized_device(Some(value.as_str())).map(str::to_string),
        None => existing.device_identifier.clone(),
    };

    let updated = repo
        .update(
            rule_id,
            &user_id,
            device_identifier.as_deref(),
            request.day_of_week.unwrap_or(existing.day_of_week),
            request.start_time.as_deref().unwrap_or(&existing.start_time),
            request.end_time.as_deref().unwrap_or(&existing.end_time),
            request.enabled.unwrap_or(existing.enabled),
            request.rule_name.as_deref().unwrap_or(&existing.rule_name),
        )
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Rule {rule_id} not found")))?;
    Ok(Json(TimeRule::from(updated)))
}

/// `DELETE /api/users/:id/rules/:rule_id`.
pub async fn delete_rule(
    State(state): State<AppState>,
    Path((user_id, rule_id)): Path<(String, i64)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = TimeRuleRepository::new(state.pool.clone())
        .delete(rule_id, &user_id)
        .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound(format!("Rule {rule_id} not found")));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Empty device identifiers mean "all devices" and are stored as NULL.
fn normalized_device(device: Option<&str>) -> Option<&str> {
    device.map(str::trim).filter(|d| !d.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_device() {
        assert_eq!(normalized_device(None), None);
        assert_eq!(normalized_device(Some("")), None);
        assert_eq!(normalized_device(Some("  ")), None);
        assert_eq!(normalized_device(Some("AAA")), Some("AAA"));
        assert_eq!(normalized_device(Some(" AAA ")), Some("AAA"));
    }

    #[test]
    fn test_create_request_parses() {
        let request: CreateTimeRuleRequest = serde_json::from_str(
            r#"{"dayOfWeek":3,"startTime":"20:00","endTime":"22:00","ruleName":"School night"}"#,
        )
        .unwrap();
        assert!(request.validate().is_ok());
        assert!(request.enabled);
    }
}
