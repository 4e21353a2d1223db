//! The session poll loop.
//!
//! Drives the enforcement orchestrator. Unlike the scheduler's fixed-interval
//! jobs, the delay is re-read from the settings store every iteration so an
//! admin edit of `PLEXGUARD_REFRESH_INTERVAL` takes effect on the next tick.
//! Shutdown lets the in-flight tick finish before the loop exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::services::enforcement::EnforcementService;
use crate::services::settings::{keys, SettingsStore};

/// The floor on the configured refresh interval.
const MIN_INTERVAL_SECS: i64 = 1;

/// Drives `run_tick` on the configured cadence.
pub struct SessionPollLoop {
    enforcement: Arc<EnforcementService>,
    settings: Arc<SettingsStore>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SessionPollLoop {
    pub fn new(
        enforcement: Arc<EnforcementService>,
        settings: Arc<SettingsStore>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            enforcement,
            settings,
            shutdown_rx,
        }
    }

    /// Spawn the loop on its own task.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Session poll loop started");

            loop {
                self.enforcement.run_tick().await;

                let delay = self.interval().await;
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.shutdown_rx.changed() => {
                        if *self.shutdown_rx.borrow() {
                            info!("Session poll loop shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }

    async fn interval(&self) -> Duration {
        let seconds = match self.settings.get_int(keys::REFRESH_INTERVAL).await {
            Ok(seconds) => seconds,
            Err(error) => {
                warn!(error = %error, "Failed to read refresh interval, using minimum");
                MIN_INTERVAL_SECS
            }
        };
        Duration::from_secs(seconds.max(MIN_INTERVAL_SECS) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_interval_is_one_second() {
        assert_eq!(MIN_INTERVAL_SECS, 1);
    }

    #[test]
    fn test_interval_clamp() {
        // The clamp applied in interval(): configured values below the floor
        // are raised to it.
        for (configured, expected) in [(0i64, 1u64), (-5, 1), (1, 1), (30, 30)] {
            let clamped = configured.max(MIN_INTERVAL_SECS) as u64;
            assert_eq!(clamped, expected);
        }
    }
}
