//! Caller identity for the user portal.
//!
//! Authentication is handled by the fronting layer, which installs the
//! caller's Plex user id in `X-Plex-User-Id`. Portal handlers only ever see
//! data scoped to that id.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

const USER_ID_HEADER: &str = "x-plex-user-id";

/// The authenticated portal caller's Plex user id.
#[derive(Debug, Clone)]
pub struct PlexUserId(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for PlexUserId
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match value {
            Some(user_id) => Ok(PlexUserId(user_id.to_string())),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "unauthorized",
                    "message": "Missing user identity"
                })),
            )
                .into_response()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_extracts_user_id() {
        let request = Request::builder()
            .header("X-Plex-User-Id", "42")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let id = PlexUserId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(id.0, "42");
    }

    #[tokio::test]
    async fn test_missing_header_rejected() {
        let request = Request::builder().body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        let result = PlexUserId::from_request_parts(&mut parts, &()).await;
        let response = result.err().expect("rejection");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_blank_header_rejected() {
        let request = Request::builder()
            .header("X-Plex-User-Id", "  ")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        assert!(PlexUserId::from_request_parts(&mut parts, &()).await.is_err());
    }
}
