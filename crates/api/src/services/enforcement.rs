//! The enforcement orchestrator.
//!
//! One `run_tick` is the whole control flow of a poll cycle: fetch the
//! snapshot, ingest devices, reconcile the session log, evaluate policies
//! and terminate violators. Every step's failure is contained; the loop
//! itself never dies. An upstream or database failure skips the tick and the
//! next one retries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use domain::models::{Decision, Device, SessionSnapshot, TimeRule, UserPreference};
use domain::services::events::{Event, EventBus};
use domain::services::policy::{self, PolicyInput, PolicySettings, ReasonMessages};
use persistence::repositories::{DeviceRepository, TimeRuleRepository, UserPreferenceRepository};
use shared::timeclock::parse_utc_offset;

use super::device_tracker::{DeviceTracker, IngestContext};
use super::plex::PlexClient;
use super::session_log::SessionLog;
use super::settings::{keys, SettingsStore};

/// Summary of the last completed tick, surfaced by the health endpoint.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickOutcome {
    pub finished_at: DateTime<Utc>,
    pub sessions: usize,
    pub blocked: usize,
}

/// Drives one full enforcement cycle per poll.
pub struct EnforcementService {
    plex: Arc<PlexClient>,
    settings: Arc<SettingsStore>,
    events: Arc<EventBus>,
    tracker: DeviceTracker,
    session_log: SessionLog,
    devices: DeviceRepository,
    preferences: UserPreferenceRepository,
    rules: TimeRuleRepository,
    last_tick: RwLock<Option<TickOutcome>>,
}

impl EnforcementService {
    pub fn new(
        pool: PgPool,
        plex: Arc<PlexClient>,
        settings: Arc<SettingsStore>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            plex,
            settings,
            events: Arc::clone(&events),
            tracker: DeviceTracker::new(pool.clone(), events),
            session_log: SessionLog::new(pool.clone()),
            devices: DeviceRepository::new(pool.clone()),
            preferences: UserPreferenceRepository::new(pool.clone()),
            rules: TimeRuleRepository::new(pool),
            last_tick: RwLock::new(None),
        })
    }

    /// The last completed tick, if any.
    pub async fn last_tick(&self) -> Option<TickOutcome> {
        self.last_tick.read().await.clone()
    }

    /// Run one full tick. Never panics; all failures are logged.
    pub async fn run_tick(&self) {
        let snapshot = match self.plex.fetch_sessions().await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(error = %error, "Failed to fetch sessions, skipping tick");
                return;
            }
        };

        let now = Utc::now();
        if let Err(error) = self.process_snapshot(&snapshot, now).await {
            warn!(error = %error, "Tick aborted on database error");
        }
    }

    async fn process_snapshot(
        &self,
        snapshot: &SessionSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        // Which keys were already streaming when this tick started; used
        // both for session_count bumps and for opening history rows.
        let active_keys = self.session_log.active_keys().await?;

        let ctx = IngestContext {
            strict_mode: self.settings.get_bool(keys::STRICT_MODE).await?,
            default_block: self.settings.get_bool(keys::DEFAULT_BLOCK).await?,
            now,
        };
        self.tracker.ingest(snapshot, &active_keys, ctx).await;

        let user_ids: Vec<String> = snapshot
            .sessions
            .iter()
            .map(|s| s.user.id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let devices = self.load_devices(&user_ids).await?;
        let device_ids: HashMap<(String, String), i64> = devices
            .iter()
            .map(|(key, device)| (key.clone(), device.id))
            .collect();

        self.session_log
            .reconcile(snapshot, &active_keys, &device_ids, now)
            .await?;

        let decisions = {
            let input = PolicyInput {
                sessions: snapshot.sessions.clone(),
                devices,
                preferences: self.load_preferences(&user_ids).await?,
                rules: self.load_rules(&user_ids).await?,
                session_started_at: self
                    .session_log
                    .started_at_map(&snapshot.session_keys().map(str::to_string).collect::<Vec<_>>())
                    .await?,
                settings: self.policy_settings().await?,
                now,
            };
            policy::evaluate(&input)
        };

        let mut terminated: HashSet<String> = HashSet::new();
        let mut blocked = 0usize;

        for decision in &decisions {
            let Decision::Block { reason, stop_code } = &decision.decision else {
                continue;
            };
            blocked += 1;

            // At most one terminate call per session id per tick.
            if !terminated.insert(decision.session_id.clone()) {
                continue;
            }

            match self
                .plex
                .terminate_session(&decision.session_id, reason)
                .await
            {
                Ok(()) => {
                    info!(
                        session_id = %decision.session_id,
                        user_id = %decision.user_id,
                        stop_code = %stop_code,
                        "Session terminated"
                    );
                    let username = snapshot
                        .sessions
                        .iter()
                        .find(|s| s.session_id == decision.session_id)
                        .and_then(|s| s.user.name.clone());
                    self.events.publish(&Event::StreamBlocked {
                        user_id: decision.user_id.clone(),
                        username,
                        device_identifier: decision.device_identifier.clone(),
                        stop_code: *stop_code,
                        reason: reason.clone(),
                        session_key: decision.session_key.clone(),
                        ip: decision.address.clone(),
                    });
                }
                Err(error) => {
                    // No retry this tick; the next tick re-evaluates.
                    warn!(
                        session_id = %decision.session_id,
                        error = %error,
                        "Failed to terminate session"
                    );
                }
            }
        }

        debug!(
            sessions = snapshot.sessions.len(),
            blocked, "Tick completed"
        );
        *self.last_tick.write().await = Some(TickOutcome {
            finished_at: Utc::now(),
            sessions: snapshot.sessions.len(),
            blocked,
        });
        Ok(())
    }

    async fn load_devices(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<(String, String), Device>, sqlx::Error> {
        Ok(self
            .devices
            .list_for_users(user_ids)
            .await?
            .into_iter()
            .map(Device::from)
            .map(|d| ((d.user_id.clone(), d.device_identifier.clone()), d))
            .collect())
    }

    async fn load_preferences(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, UserPreference>, sqlx::Error> {
        Ok(self
            .preferences
            .list_for_users(user_ids)
            .await?
            .into_iter()
            .map(UserPreference::from)
            .map(|p| (p.user_id.clone(), p))
            .collect())
    }

    async fn load_rules(&self, user_ids: &[String]) -> Result<Vec<TimeRule>, sqlx::Error> {
        Ok(self
            .rules
            .list_enabled_for_users(user_ids)
            .await?
            .into_iter()
            .map(TimeRule::from)
            .collect())
    }

    /// Assemble the typed settings snapshot the policy engine consumes.
    pub async fn policy_settings(&self) -> Result<PolicySettings, sqlx::Error> {
        let timezone = self.settings.get_string(keys::TIMEZONE).await?;
        let utc_offset = parse_utc_offset(&timezone).unwrap_or_else(|| {
            warn!(timezone = %timezone, "Invalid TIMEZONE setting, falling back to +00:00");
            chrono::FixedOffset::east_opt(0).expect("zero offset")
        });

        Ok(PolicySettings {
            default_block: self.settings.get_bool(keys::DEFAULT_BLOCK).await?,
            concurrent_limit: self.settings.get_int(keys::CONCURRENT_STREAM_LIMIT).await?,
            include_temp_access_in_limit: self
                .settings
                .get_bool(keys::CONCURRENT_LIMIT_INCLUDE_TEMP_ACCESS)
                .await?,
            utc_offset,
            messages: ReasonMessages {
                device_pending: self.settings.get_string(keys::MSG_DEVICE_PENDING).await?,
                device_rejected: self.settings.get_string(keys::MSG_DEVICE_REJECTED).await?,
                time_restricted: self.settings.get_string(keys::MSG_TIME_RESTRICTED).await?,
                concurrent_limit: self.settings.get_string(keys::MSG_CONCURRENT_LIMIT).await?,
                lan_only: self.settings.get_string(keys::MSG_IP_LAN_ONLY).await?,
                wan_only: self.settings.get_string(keys::MSG_IP_WAN_ONLY).await?,
                ip_not_allowed: self.settings.get_string(keys::MSG_IP_NOT_ALLOWED).await?,
            },
        })
    }
}
