//! Normalized view of the upstream server's active playback sessions.
//!
//! The upstream wire format is parsed in the API layer; everything downstream
//! (registry, policy engine, history log) works on these types. User ids are
//! already normalized to their decimal string representation here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Product name the upstream reports for Plexamp players. Plexamp sessions
/// are always allowed and never counted toward concurrency caps.
pub const PLEXAMP_PRODUCT: &str = "Plexamp";

/// The user a session belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub name: Option<String>,
    pub thumb: Option<String>,
}

/// The client machine playing the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub machine_id: String,
    pub platform: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub address: String,
    pub state: Option<String>,
    pub title: Option<String>,
}

/// Stream characteristics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub resolution: Option<String>,
    pub bitrate: Option<i64>,
    pub container: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
}

/// What is being played.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentInfo {
    pub title: Option<String>,
    pub grandparent_title: Option<String>,
    pub parent_title: Option<String>,
    pub year: Option<i32>,
    pub duration: Option<i64>,
    pub view_offset: Option<i64>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub thumb: Option<String>,
    pub art: Option<String>,
    pub rating_key: Option<String>,
    pub parent_rating_key: Option<String>,
}

/// One active playback session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_key: String,
    pub session_id: String,
    pub user: SessionUser,
    pub player: PlayerInfo,
    #[serde(default)]
    pub media: MediaInfo,
    #[serde(default)]
    pub content: ContentInfo,
}

impl Session {
    /// Plexamp sessions bypass every policy and never count toward caps.
    pub fn is_plexamp(&self) -> bool {
        self.player.product.as_deref() == Some(PLEXAMP_PRODUCT)
    }

    /// The `(user_id, device_identifier)` pair this session is charged to.
    pub fn device_key(&self) -> (String, String) {
        (self.user.id.clone(), self.player.machine_id.clone())
    }
}

/// All sessions observed in one poll of the upstream server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub sessions: Vec<Session>,
    pub fetched_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn new(sessions: Vec<Session>) -> Self {
        Self {
            sessions,
            fetched_at: Utc::now(),
        }
    }

    pub fn session_keys(&self) -> impl Iterator<Item = &str> {
        self.sessions.iter().map(|s| s.session_key.as_str())
    }
}
