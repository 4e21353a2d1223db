//! Per-user policy overrides and display preferences.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Where a user is allowed to stream from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPolicy {
    Both,
    Lan,
    Wan,
}

impl NetworkPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkPolicy::Both => "both",
            NetworkPolicy::Lan => "lan",
            NetworkPolicy::Wan => "wan",
        }
    }
}

impl std::fmt::Display for NetworkPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NetworkPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "both" => Ok(NetworkPolicy::Both),
            "lan" => Ok(NetworkPolicy::Lan),
            "wan" => Ok(NetworkPolicy::Wan),
            other => Err(format!("unknown network policy: {other}")),
        }
    }
}

/// Whether the per-user IP allow-list is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpAccessPolicy {
    All,
    Restricted,
}

impl IpAccessPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpAccessPolicy::All => "all",
            IpAccessPolicy::Restricted => "restricted",
        }
    }
}

impl std::fmt::Display for IpAccessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IpAccessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(IpAccessPolicy::All),
            "restricted" => Ok(IpAccessPolicy::Restricted),
            other => Err(format!("unknown ip access policy: {other}")),
        }
    }
}

/// Per-user record, created lazily on first observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreference {
    pub user_id: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub hidden: bool,
    /// None falls back to the global `PLEX_GUARD_DEFAULT_BLOCK` setting.
    pub default_block: Option<bool>,
    pub network_policy: NetworkPolicy,
    pub ip_access_policy: IpAccessPolicy,
    pub allowed_ips: Vec<String>,
    /// None falls back to the global limit; 0 means unlimited.
    pub concurrent_stream_limit: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserPreference {
    /// A fresh record for a user observed for the first time.
    pub fn observed(user_id: String, username: Option<String>, avatar_url: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            username,
            avatar_url,
            hidden: false,
            default_block: None,
            network_policy: NetworkPolicy::Both,
            ip_access_policy: IpAccessPolicy::All,
            allowed_ips: Vec::new(),
            concurrent_stream_limit: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Payload for `POST /api/users/:id/preference`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRequest {
    /// `null` clears the override back to the global default.
    pub default_block: Option<bool>,
}

/// Payload for `POST /api/users/:id/ip-policy`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IpPolicyRequest {
    pub network_policy: NetworkPolicy,
    pub ip_access_policy: IpAccessPolicy,
    #[serde(default)]
    #[validate(custom(function = "shared::validation::validate_ip_entries"))]
    pub allowed_ips: Vec<String>,
}

/// Payload for `POST /api/users/:id/concurrent-stream-limit`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrentLimitRequest {
    /// `null` clears the override; 0 means unlimited.
    #[validate(range(min = 0, max = 100, message = "Limit must be between 0 and 100"))]
    pub limit: Option<i32>,
}
