//! Inactive-device cleanup job.
//!
//! When enabled, deletes devices unseen for longer than the configured
//! threshold. Devices with an unread user note or a still-active temporary
//! grant are always kept. Both settings are read at execution time so admin
//! edits apply without a restart.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::info;

use persistence::repositories::DeviceRepository;

use super::scheduler::{Job, JobFrequency};
use crate::services::settings::{keys, SettingsStore};

/// Background job that garbage-collects long-inactive devices.
pub struct CleanupDevicesJob {
    devices: DeviceRepository,
    settings: Arc<SettingsStore>,
}

impl CleanupDevicesJob {
    pub fn new(pool: PgPool, settings: Arc<SettingsStore>) -> Self {
        Self {
            devices: DeviceRepository::new(pool),
            settings,
        }
    }
}

#[async_trait::async_trait]
impl Job for CleanupDevicesJob {
    fn name(&self) -> &'static str {
        "cleanup_devices"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Hourly
    }

    async fn execute(&self) -> Result<(), String> {
        let enabled = self
            .settings
            .get_bool(keys::DEVICE_CLEANUP_ENABLED)
            .await
            .map_err(|e| format!("Failed to read cleanup flag: {e}"))?;
        if !enabled {
            return Ok(());
        }

        let days = self
            .settings
            .get_int(keys::DEVICE_CLEANUP_INTERVAL_DAYS)
            .await
            .map_err(|e| format!("Failed to read cleanup threshold: {e}"))?
            .max(1);

        let now = Utc::now();
        let cutoff = now - Duration::days(days);
        let deleted = self
            .devices
            .delete_inactive_since(cutoff, now)
            .await
            .map_err(|e| format!("Failed to delete inactive devices: {e}"))?;

        if deleted > 0 {
            info!(deleted, threshold_days = days, "Cleaned up inactive devices");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_frequency_is_hourly() {
        let freq = JobFrequency::Hourly;
        assert_eq!(freq.duration(), std::time::Duration::from_secs(3600));
    }

    #[test]
    fn test_threshold_floor() {
        // A misconfigured threshold of 0 or less is raised to one day.
        for days in [-3i64, 0, 1, 30] {
            assert!(days.max(1) >= 1);
        }
    }
}
