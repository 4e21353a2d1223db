//! The settings store: a read-through cache over the settings table.
//!
//! Readers hit the cache; a miss loads the row and caches it. Writes go to
//! the database first and then invalidate the cached entry, so the poll loop
//! picks runtime changes up on its next read. Private keys never appear in
//! list responses.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use domain::models::{render_setting_value, Setting, SettingKind};
use persistence::repositories::SettingRepository;

/// Keys the daemon consumes.
pub mod keys {
    pub const PLEX_SERVER_IP: &str = "PLEX_SERVER_IP";
    pub const PLEX_SERVER_PORT: &str = "PLEX_SERVER_PORT";
    pub const PLEX_TOKEN: &str = "PLEX_TOKEN";
    pub const USE_SSL: &str = "USE_SSL";
    pub const IGNORE_SSL_ERRORS: &str = "IGNORE_SSL_ERRORS";
    pub const REFRESH_INTERVAL: &str = "PLEXGUARD_REFRESH_INTERVAL";
    pub const DEFAULT_BLOCK: &str = "PLEX_GUARD_DEFAULT_BLOCK";
    pub const STRICT_MODE: &str = "STRICT_MODE";
    pub const CONCURRENT_STREAM_LIMIT: &str = "CONCURRENT_STREAM_LIMIT";
    pub const CONCURRENT_LIMIT_INCLUDE_TEMP_ACCESS: &str = "CONCURRENT_LIMIT_INCLUDE_TEMP_ACCESS";
    pub const DEVICE_CLEANUP_ENABLED: &str = "DEVICE_CLEANUP_ENABLED";
    pub const DEVICE_CLEANUP_INTERVAL_DAYS: &str = "DEVICE_CLEANUP_INTERVAL_DAYS";
    pub const TIMEZONE: &str = "TIMEZONE";
    pub const MSG_DEVICE_PENDING: &str = "MSG_DEVICE_PENDING";
    pub const MSG_DEVICE_REJECTED: &str = "MSG_DEVICE_REJECTED";
    pub const MSG_TIME_RESTRICTED: &str = "MSG_TIME_RESTRICTED";
    pub const MSG_CONCURRENT_LIMIT: &str = "MSG_CONCURRENT_LIMIT";
    pub const MSG_IP_LAN_ONLY: &str = "MSG_IP_LAN_ONLY";
    pub const MSG_IP_WAN_ONLY: &str = "MSG_IP_WAN_ONLY";
    pub const MSG_IP_NOT_ALLOWED: &str = "MSG_IP_NOT_ALLOWED";
}

/// Declared kind, default and visibility for a recognized key.
#[derive(Debug, Clone, Copy)]
pub struct SettingSpec {
    pub key: &'static str,
    pub kind: SettingKind,
    pub default: &'static str,
    pub private: bool,
}

/// Every recognized setting, seeded at startup.
pub const SETTING_SPECS: &[SettingSpec] = &[
    SettingSpec { key: keys::PLEX_SERVER_IP, kind: SettingKind::String, default: "127.0.0.1", private: false },
    SettingSpec { key: keys::PLEX_SERVER_PORT, kind: SettingKind::Int, default: "32400", private: false },
    SettingSpec { key: keys::PLEX_TOKEN, kind: SettingKind::String, default: "", private: true },
    SettingSpec { key: keys::USE_SSL, kind: SettingKind::Bool, default: "false", private: false },
    SettingSpec { key: keys::IGNORE_SSL_ERRORS, kind: SettingKind::Bool, default: "false", private: false },
    SettingSpec { key: keys::REFRESH_INTERVAL, kind: SettingKind::Int, default: "5", private: false },
    SettingSpec { key: keys::DEFAULT_BLOCK, kind: SettingKind::Bool, default: "false", private: false },
    SettingSpec { key: keys::STRICT_MODE, kind: SettingKind::Bool, default: "false", private: false },
    SettingSpec { key: keys::CONCURRENT_STREAM_LIMIT, kind: SettingKind::Int, default: "0", private: false },
    SettingSpec { key: keys::CONCURRENT_LIMIT_INCLUDE_TEMP_ACCESS, kind: SettingKind::Bool, default: "true", private: false },
    SettingSpec { key: keys::DEVICE_CLEANUP_ENABLED, kind: SettingKind::Bool, default: "false", private: false },
    SettingSpec { key: keys::DEVICE_CLEANUP_INTERVAL_DAYS, kind: SettingKind::Int, default: "30", private: false },
    SettingSpec { key: keys::TIMEZONE, kind: SettingKind::String, default: "+00:00", private: false },
    SettingSpec {
        key: keys::MSG_DEVICE_PENDING,
        kind: SettingKind::String,
        default: "This device has not been approved yet. Please contact your server administrator.",
        private: false,
    },
    SettingSpec {
        key: keys::MSG_DEVICE_REJECTED,
        kind: SettingKind::String,
        default: "This device has been blocked by the server administrator.",
        private: false,
    },
    SettingSpec {
        key: keys::MSG_TIME_RESTRICTED,
        kind: SettingKind::String,
        default: "Streaming is not allowed at this time.",
        private: false,
    },
    SettingSpec {
        key: keys::MSG_CONCURRENT_LIMIT,
        kind: SettingKind::String,
        default: "You have reached the maximum number of simultaneous streams.",
        private: false,
    },
    SettingSpec {
        key: keys::MSG_IP_LAN_ONLY,
        kind: SettingKind::String,
        default: "This account can only stream from the home network.",
        private: false,
    },
    SettingSpec {
        key: keys::MSG_IP_WAN_ONLY,
        kind: SettingKind::String,
        default: "This account cannot stream from the home network.",
        private: false,
    },
    SettingSpec {
        key: keys::MSG_IP_NOT_ALLOWED,
        kind: SettingKind::String,
        default: "Streaming from this network address is not allowed.",
        private: false,
    },
];

/// Look up the spec for a recognized key.
pub fn spec_for(key: &str) -> Option<&'static SettingSpec> {
    SETTING_SPECS.iter().find(|spec| spec.key == key)
}

/// Errors from settings writes.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("unknown setting key: {0}")]
    UnknownKey(String),

    #[error("invalid setting value: {0}")]
    InvalidValue(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read-through cached view of the settings table.
pub struct SettingsStore {
    repo: SettingRepository,
    cache: RwLock<HashMap<String, Setting>>,
}

impl SettingsStore {
    pub fn new(repo: SettingRepository) -> Arc<Self> {
        Arc::new(Self {
            repo,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Seed every recognized key that is missing from the table.
    pub async fn ensure_defaults(&self) -> Result<(), sqlx::Error> {
        for spec in SETTING_SPECS {
            self.repo
                .insert_default(spec.key, spec.default, spec.kind, spec.private)
                .await?;
        }
        info!(count = SETTING_SPECS.len(), "Settings defaults ensured");
        Ok(())
    }

    /// Fetch one setting, through the cache.
    pub async fn get(&self, key: &str) -> Result<Option<Setting>, sqlx::Error> {
        if let Some(setting) = self.cache.read().await.get(key) {
            return Ok(Some(setting.clone()));
        }

        let loaded = self.repo.find(key).await?.map(Setting::from);
        if let Some(setting) = &loaded {
            self.cache
                .write()
                .await
                .insert(key.to_string(), setting.clone());
        }
        Ok(loaded)
    }

    /// Boolean value of a key, falling back to its declared default.
    pub async fn get_bool(&self, key: &str) -> Result<bool, sqlx::Error> {
        let fallback = spec_default_bool(key);
        Ok(self
            .get(key)
            .await?
            .and_then(|s| s.as_bool())
            .unwrap_or(fallback))
    }

    /// Integer value of a key, falling back to its declared default.
    pub async fn get_int(&self, key: &str) -> Result<i64, sqlx::Error> {
        let fallback = spec_default_int(key);
        Ok(self
            .get(key)
            .await?
            .and_then(|s| s.as_int())
            .unwrap_or(fallback))
    }

    /// String value of a key, falling back to its declared default.
    pub async fn get_string(&self, key: &str) -> Result<String, sqlx::Error> {
        Ok(self
            .get(key)
            .await?
            .map(|s| s.value)
            .unwrap_or_else(|| spec_default_string(key)))
    }

    /// JSON value of a key; `null` when absent or unparseable.
    pub async fn get_json(&self, key: &str) -> Result<serde_json::Value, sqlx::Error> {
        Ok(self
            .get(key)
            .await?
            .and_then(|s| s.as_json())
            .unwrap_or(serde_json::Value::Null))
    }

    /// Validate and persist a new value, then drop the cached entry.
    pub async fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), SettingsError> {
        let spec = spec_for(key).ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;
        let raw = render_setting_value(spec.kind, value)
            .map_err(|e| SettingsError::InvalidValue(format!("{key}: {e}")))?;

        let updated = self.repo.set_value(key, &raw).await?;
        if updated == 0 {
            // Seeded at startup; a miss means the table was altered under us.
            self.repo
                .insert_default(spec.key, &raw, spec.kind, spec.private)
                .await?;
        }

        self.cache.write().await.remove(key);
        info!(key = key, "Setting updated");
        Ok(())
    }

    /// Every non-private setting, for the admin listing.
    pub async fn list_public(&self) -> Result<Vec<Setting>, sqlx::Error> {
        let settings = self.repo.list_all().await?;
        Ok(settings
            .into_iter()
            .map(Setting::from)
            .filter(|s| !s.private)
            .collect())
    }
}

fn spec_default_bool(key: &str) -> bool {
    spec_for(key)
        .map(|spec| matches!(spec.default, "true" | "1"))
        .unwrap_or(false)
}

fn spec_default_int(key: &str) -> i64 {
    spec_for(key)
        .and_then(|spec| spec.default.parse().ok())
        .unwrap_or(0)
}

fn spec_default_string(key: &str) -> String {
    spec_for(key)
        .map(|spec| spec.default.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_has_a_spec() {
        for key in [
            keys::PLEX_SERVER_IP,
            keys::PLEX_SERVER_PORT,
            keys::PLEX_TOKEN,
            keys::USE_SSL,
            keys::IGNORE_SSL_ERRORS,
            keys::REFRESH_INTERVAL,
            keys::DEFAULT_BLOCK,
            keys::STRICT_MODE,
            keys::CONCURRENT_STREAM_LIMIT,
            keys::CONCURRENT_LIMIT_INCLUDE_TEMP_ACCESS,
            keys::DEVICE_CLEANUP_ENABLED,
            keys::DEVICE_CLEANUP_INTERVAL_DAYS,
            keys::TIMEZONE,
            keys::MSG_DEVICE_PENDING,
            keys::MSG_DEVICE_REJECTED,
            keys::MSG_TIME_RESTRICTED,
            keys::MSG_CONCURRENT_LIMIT,
            keys::MSG_IP_LAN_ONLY,
            keys::MSG_IP_WAN_ONLY,
            keys::MSG_IP_NOT_ALLOWED,
        ] {
            assert!(spec_for(key).is_some(), "{key}");
        }
    }

    #[test]
    fn test_spec_defaults_parse_as_their_kind() {
        for spec in SETTING_SPECS {
            match spec.kind {
                SettingKind::Int => {
                    assert!(spec.default.parse::<i64>().is_ok(), "{}", spec.key);
                }
                SettingKind::Bool => {
                    assert!(
                        matches!(spec.default, "true" | "false" | "1" | "0"),
                        "{}",
                        spec.key
                    );
                }
                SettingKind::Json => {
                    assert!(
                        serde_json::from_str::<serde_json::Value>(spec.default).is_ok(),
                        "{}",
                        spec.key
                    );
                }
                SettingKind::String => {}
            }
        }
    }

    #[test]
    fn test_only_the_token_is_private() {
        let private: Vec<&str> = SETTING_SPECS
            .iter()
            .filter(|s| s.private)
            .map(|s| s.key)
            .collect();
        assert_eq!(private, vec![keys::PLEX_TOKEN]);
    }

    #[test]
    fn test_timezone_default_parses() {
        let spec = spec_for(keys::TIMEZONE).unwrap();
        assert!(shared::timeclock::parse_utc_offset(spec.default).is_some());
    }

    #[test]
    fn test_refresh_interval_default() {
        assert_eq!(spec_default_int(keys::REFRESH_INTERVAL), 5);
        assert_eq!(spec_default_int("NO_SUCH_KEY"), 0);
    }

    #[test]
    fn test_spec_default_bool() {
        assert!(spec_default_bool(keys::CONCURRENT_LIMIT_INCLUDE_TEMP_ACCESS));
        assert!(!spec_default_bool(keys::STRICT_MODE));
        assert!(!spec_default_bool("NO_SUCH_KEY"));
    }
}
