//! Upstream Plex client.
//!
//! Fetches active sessions, terminates sessions, and resolves the server's
//! machine identifier. Connection parameters are read from the settings
//! store on every call so runtime edits apply without a restart; the
//! underlying HTTP client is only rebuilt when the TLS-verification flag
//! changes. Every request carries a fixed deadline and failures come back as
//! errors for the orchestrator to handle.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use domain::models::{
    ContentInfo, MediaInfo, PlayerInfo, Session, SessionSnapshot, SessionUser,
};

use super::settings::{keys, SettingsStore};

/// Deadline for every upstream request.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Errors from the upstream client.
#[derive(Debug, Error)]
pub enum PlexError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("failed to read upstream settings: {0}")]
    Settings(#[from] sqlx::Error),

    #[error("upstream response malformed: {0}")]
    Malformed(String),
}

struct ClientSlot {
    ignore_ssl_errors: bool,
    client: Client,
}

/// HTTP client for the upstream media server.
pub struct PlexClient {
    settings: Arc<SettingsStore>,
    slot: RwLock<Option<ClientSlot>>,
    identity: RwLock<Option<String>>,
}

impl PlexClient {
    pub fn new(settings: Arc<SettingsStore>) -> Arc<Self> {
        Arc::new(Self {
            settings,
            slot: RwLock::new(None),
            identity: RwLock::new(None),
        })
    }

    /// Fetch the current session snapshot.
    pub async fn fetch_sessions(&self) -> Result<SessionSnapshot, PlexError> {
        let body: MediaContainerResponse = self.get_json("/status/sessions").await?;

        let mut sessions = Vec::new();
        for metadata in body.media_container.metadata {
            match metadata.into_session() {
                Some(session) => sessions.push(session),
                None => {
                    debug!("Dropping session without user id or machine identifier");
                }
            }
        }

        Ok(SessionSnapshot::new(sessions))
    }

    /// Ask the server to stop a session. The reason string is shown to the
    /// viewer by the media server.
    pub async fn terminate_session(
        &self,
        session_id: &str,
        reason: &str,
    ) -> Result<(), PlexError> {
        let base = self.base_url().await?;
        let token = self.settings.get_string(keys::PLEX_TOKEN).await?;

        let response = self
            .http()
            .await?
            .get(format!("{base}/status/sessions/terminate"))
            .query(&[("sessionId", session_id), ("reason", reason)])
            .header("X-Plex-Token", token)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlexError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    /// The upstream server's machine identifier, cached after first success.
    pub async fn server_identity(&self) -> Result<String, PlexError> {
        if let Some(identity) = self.identity.read().await.clone() {
            return Ok(identity);
        }

        let body: IdentityResponse = self.get_json("/identity").await?;
        let identity = body
            .media_container
            .machine_identifier
            .ok_or_else(|| PlexError::Malformed("identity without machineIdentifier".into()))?;

        *self.identity.write().await = Some(identity.clone());
        Ok(identity)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, PlexError> {
        let base = self.base_url().await?;
        let token = self.settings.get_string(keys::PLEX_TOKEN).await?;

        let response = self
            .http()
            .await?
            .get(format!("{base}{path}"))
            .header("X-Plex-Token", token)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlexError::Status(response.status().as_u16()));
        }

        Ok(response.json().await?)
    }

    async fn base_url(&self) -> Result<String, PlexError> {
        let host = self.settings.get_string(keys::PLEX_SERVER_IP).await?;
        let port = self.settings.get_int(keys::PLEX_SERVER_PORT).await?;
        let use_ssl = self.settings.get_bool(keys::USE_SSL).await?;
        let scheme = if use_ssl { "https" } else { "http" };
        Ok(format!("{scheme}://{host}:{port}"))
    }

    /// The shared reqwest client, rebuilt when the TLS-verification flag
    /// changes.
    async fn http(&self) -> Result<Client, PlexError> {
        let ignore_ssl_errors = self.settings.get_bool(keys::IGNORE_SSL_ERRORS).await?;

        if let Some(slot) = self.slot.read().await.as_ref() {
            if slot.ignore_ssl_errors == ignore_ssl_errors {
                return Ok(slot.client.clone());
            }
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(ignore_ssl_errors)
            .build()?;

        *self.slot.write().await = Some(ClientSlot {
            ignore_ssl_errors,
            client: client.clone(),
        });
        Ok(client)
    }
}

// Wire format.

#[derive(Debug, Deserialize)]
struct MediaContainerResponse {
    #[serde(rename = "MediaContainer")]
    media_container: MediaContainer,
}

#[derive(Debug, Deserialize)]
struct MediaContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<SessionMetadata>,
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    #[serde(rename = "MediaContainer")]
    media_container: IdentityContainer,
}

#[derive(Debug, Deserialize)]
struct IdentityContainer {
    #[serde(rename = "machineIdentifier")]
    machine_identifier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionMetadata {
    #[serde(rename = "sessionKey")]
    session_key: Option<String>,
    title: Option<String>,
    #[serde(rename = "grandparentTitle")]
    grandparent_title: Option<String>,
    #[serde(rename = "parentTitle")]
    parent_title: Option<String>,
    year: Option<i32>,
    duration: Option<i64>,
    #[serde(rename = "viewOffset")]
    view_offset: Option<i64>,
    #[serde(rename = "type")]
    media_type: Option<String>,
    thumb: Option<String>,
    art: Option<String>,
    #[serde(rename = "ratingKey")]
    rating_key: Option<String>,
    #[serde(rename = "parentRatingKey")]
    parent_rating_key: Option<String>,
    #[serde(rename = "User")]
    user: Option<WireUser>,
    #[serde(rename = "Player")]
    player: Option<WirePlayer>,
    #[serde(rename = "Session")]
    session: Option<WireSession>,
    #[serde(rename = "Media", default)]
    media: Vec<WireMedia>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    // The upstream emits numeric or string ids depending on version;
    // normalize to a decimal string at the boundary.
    #[serde(default, deserialize_with = "string_or_number")]
    id: Option<String>,
    title: Option<String>,
    thumb: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePlayer {
    #[serde(rename = "machineIdentifier")]
    machine_identifier: Option<String>,
    platform: Option<String>,
    product: Option<String>,
    version: Option<String>,
    address: Option<String>,
    #[serde(rename = "remotePublicAddress")]
    remote_public_address: Option<String>,
    state: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireSession {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMedia {
    #[serde(rename = "videoResolution", deserialize_with = "string_or_number", default)]
    video_resolution: Option<String>,
    bitrate: Option<i64>,
    container: Option<String>,
    #[serde(rename = "videoCodec")]
    video_codec: Option<String>,
    #[serde(rename = "audioCodec")]
    audio_codec: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl SessionMetadata {
    /// Normalize one wire entry. Entries without a user id or machine
    /// identifier are unenforceable and dropped.
    fn into_session(self) -> Option<Session> {
        let session_key = self.session_key?;
        let user = self.user?;
        let player = self.player?;

        let user_id = user.id?;
        let machine_id = player.machine_identifier.filter(|m| !m.is_empty())?;

        let session_id = self
            .session
            .and_then(|s| s.id)
            .unwrap_or_else(|| session_key.clone());

        let address = player
            .remote_public_address
            .filter(|a| !a.is_empty())
            .or(player.address)
            .unwrap_or_default();

        let media = self.media.into_iter().next();

        Some(Session {
            session_key,
            session_id,
            user: SessionUser {
                id: user_id,
                name: user.title,
                thumb: user.thumb,
            },
            player: PlayerInfo {
                machine_id,
                platform: player.platform,
                product: player.product,
                version: player.version,
                address,
                state: player.state,
                title: player.title,
            },
            media: media
                .map(|m| MediaInfo {
                    resolution: m.video_resolution,
                    bitrate: m.bitrate,
                    container: m.container,
                    video_codec: m.video_codec,
                    audio_codec: m.audio_codec,
                })
                .unwrap_or_default(),
            content: ContentInfo {
                title: self.title,
                grandparent_title: self.grandparent_title,
                parent_title: self.parent_title,
                year: self.year,
                duration: self.duration,
                view_offset: self.view_offset,
                media_type: self.media_type,
                thumb: self.thumb,
                art: self.art,
                rating_key: self.rating_key,
                parent_rating_key: self.parent_rating_key,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSIONS_FIXTURE: &str = r#"
    {
      "MediaContainer": {
        "size": 2,
        "Metadata": [
          {
            "sessionKey": "77",
            "title": "Pilot",
            "grandparentTitle": "Some Show",
            "parentTitle": "Season 1",
            "year": 2020,
            "duration": 2700000,
            "viewOffset": 120000,
            "type": "episode",
            "ratingKey": "12345",
            "thumb": "/library/metadata/12345/thumb",
            "User": { "id": 42, "title": "alice", "thumb": "/users/42/thumb" },
            "Player": {
              "machineIdentifier": "AAA",
              "platform": "Chrome",
              "product": "Plex Web",
              "version": "4.128",
              "address": "192.168.1.50",
              "remotePublicAddress": "203.0.113.5",
              "state": "playing",
              "title": "Chrome"
            },
            "Session": { "id": "s1", "bandwidth": 6400, "location": "wan" },
            "Media": [
              {
                "videoResolution": 1080,
                "bitrate": 6400,
                "container": "mkv",
                "videoCodec": "h264",
                "audioCodec": "aac"
              }
            ]
          },
          {
            "sessionKey": "78",
            "title": "Orphaned",
            "User": { "id": "notes-only" },
            "Player": { "product": "Plex Web", "address": "10.0.0.9" }
          }
        ]
      }
    }
    "#;

    #[test]
    fn test_parse_sessions_fixture() {
        let body: MediaContainerResponse = serde_json::from_str(SESSIONS_FIXTURE).unwrap();
        let sessions: Vec<Session> = body
            .media_container
            .metadata
            .into_iter()
            .filter_map(|m| m.into_session())
            .collect();

        // The entry without a machine identifier is dropped.
        assert_eq!(sessions.len(), 1);
        let session = &sessions[0];
        assert_eq!(session.session_key, "77");
        assert_eq!(session.session_id, "s1");
        assert_eq!(session.user.id, "42");
        assert_eq!(session.user.name.as_deref(), Some("alice"));
        assert_eq!(session.player.machine_id, "AAA");
        // The public address wins over the LAN one when present.
        assert_eq!(session.player.address, "203.0.113.5");
        assert_eq!(session.media.resolution.as_deref(), Some("1080"));
        assert_eq!(session.media.bitrate, Some(6400));
        assert_eq!(session.content.rating_key.as_deref(), Some("12345"));
    }

    #[test]
    fn test_numeric_user_id_normalized_to_string() {
        let body: MediaContainerResponse = serde_json::from_str(SESSIONS_FIXTURE).unwrap();
        let first = &body.media_container.metadata[0];
        assert_eq!(first.user.as_ref().unwrap().id.as_deref(), Some("42"));
    }

    #[test]
    fn test_string_user_id_passes_through() {
        let json = r#"{"id": "42", "title": "alice"}"#;
        let user: WireUser = serde_json::from_str(json).unwrap();
        assert_eq!(user.id.as_deref(), Some("42"));
    }

    #[test]
    fn test_empty_user_id_dropped() {
        let json = r#"{"id": "", "title": "alice"}"#;
        let user: WireUser = serde_json::from_str(json).unwrap();
        assert!(user.id.is_none());
    }

    #[test]
    fn test_session_id_falls_back_to_session_key() {
        let json = r#"
        {
          "sessionKey": "9",
          "User": { "id": 7 },
          "Player": { "machineIdentifier": "BBB", "address": "10.0.0.1" }
        }
        "#;
        let metadata: SessionMetadata = serde_json::from_str(json).unwrap();
        let session = metadata.into_session().unwrap();
        assert_eq!(session.session_id, "9");
        assert_eq!(session.player.address, "10.0.0.1");
    }

    #[test]
    fn test_missing_metadata_array_is_empty_container() {
        let body: MediaContainerResponse =
            serde_json::from_str(r#"{"MediaContainer": {"size": 0}}"#).unwrap();
        assert!(body.media_container.metadata.is_empty());
    }

    #[test]
    fn test_identity_parse() {
        let body: IdentityResponse = serde_json::from_str(
            r#"{"MediaContainer": {"machineIdentifier": "abcdef123456"}}"#,
        )
        .unwrap();
        assert_eq!(
            body.media_container.machine_identifier.as_deref(),
            Some("abcdef123456")
        );
    }
}
