//! Device tracking: materializes devices from session snapshots.
//!
//! The tracker owns every observation-driven device mutation. It creates
//! rows for first-seen devices, refreshes descriptive fields, advances
//! `last_seen`/`last_ip`, bumps `session_count` for newly started sessions,
//! and emits tracking events. A failure on one session is logged with its
//! key and never aborts the rest of the snapshot.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

use domain::models::{DeviceStatus, Session, SessionSnapshot};
use domain::services::events::{Event, EventBus};
use persistence::entities::DeviceEntity;
use persistence::repositories::{DeviceRepository, ObservedDevice, UserPreferenceRepository};

/// A device unseen for this long is announced as returned when it comes back.
const RETURNED_THRESHOLD_HOURS: i64 = 24;

/// Snapshot-wide context resolved once per tick.
#[derive(Debug, Clone, Copy)]
pub struct IngestContext {
    /// `STRICT_MODE`: auto-decide first-seen devices.
    pub strict_mode: bool,
    /// Global `PLEX_GUARD_DEFAULT_BLOCK`.
    pub default_block: bool,
    pub now: DateTime<Utc>,
}

/// Materializes devices and user records from observed sessions.
pub struct DeviceTracker {
    devices: DeviceRepository,
    preferences: UserPreferenceRepository,
    events: Arc<EventBus>,
}

impl DeviceTracker {
    pub fn new(pool: PgPool, events: Arc<EventBus>) -> Self {
        Self {
            devices: DeviceRepository::new(pool.clone()),
            preferences: UserPreferenceRepository::new(pool),
            events,
        }
    }

    /// Ingest one snapshot. `active_keys` holds the session keys that were
    /// already open in the history log at tick start; only sessions outside
    /// that set count as newly started.
    pub async fn ingest(
        &self,
        snapshot: &SessionSnapshot,
        active_keys: &HashSet<String>,
        ctx: IngestContext,
    ) {
        for session in &snapshot.sessions {
            if let Err(error) = self.ingest_session(session, active_keys, ctx).await {
                warn!(
                    session_key = %session.session_key,
                    error = %error,
                    "Failed to ingest session, skipping"
                );
            }
        }
    }

    async fn ingest_session(
        &self,
        session: &Session,
        active_keys: &HashSet<String>,
        ctx: IngestContext,
    ) -> Result<(), sqlx::Error> {
        self.preferences
            .upsert_observed(
                &session.user.id,
                session.user.name.as_deref(),
                session.user.thumb.as_deref(),
            )
            .await?;

        let observed = observed_fields(session);

        match self
            .devices
            .find_by_natural_key(&session.user.id, &session.player.machine_id)
            .await?
        {
            None => self.materialize(session, &observed, ctx).await,
            Some(existing) => {
                self.refresh(session, &observed, existing, active_keys, ctx)
                    .await
            }
        }
    }

    /// First sighting: insert and announce.
    async fn materialize(
        &self,
        session: &Session,
        observed: &ObservedDevice<'_>,
        ctx: IngestContext,
    ) -> Result<(), sqlx::Error> {
        // Strict mode decides on first sight; with default-allow the device
        // is approved immediately, with default-block it stays pending and
        // the approval step blocks it.
        let status = if ctx.strict_mode && !ctx.default_block {
            DeviceStatus::Approved
        } else {
            DeviceStatus::Pending
        };

        let Some(inserted) = self.devices.insert_observed(observed, status, ctx.now).await? else {
            // Another writer materialized the row between our lookup and
            // insert; the next tick takes the refresh path.
            return Ok(());
        };

        info!(
            user_id = %inserted.user_id,
            device = %inserted.device_identifier,
            status = %status,
            "New device observed"
        );
        self.events.publish(&Event::NewDevice {
            user_id: inserted.user_id,
            username: session.user.name.clone(),
            device_identifier: inserted.device_identifier,
            display_name: inserted.display_name,
            ip: inserted.last_ip,
        });
        Ok(())
    }

    /// Re-observation: refresh fields and detect movement and returns.
    async fn refresh(
        &self,
        session: &Session,
        observed: &ObservedDevice<'_>,
        existing: DeviceEntity,
        active_keys: &HashSet<String>,
        ctx: IngestContext,
    ) -> Result<(), sqlx::Error> {
        let address_changed = !session.player.address.is_empty()
            && existing.last_ip.as_deref() != Some(session.player.address.as_str());
        if address_changed {
            self.events.publish(&Event::LocationChange {
                user_id: existing.user_id.clone(),
                device_identifier: existing.device_identifier.clone(),
                display_name: existing.display_name.clone(),
                old_ip: existing.last_ip.clone(),
                new_ip: session.player.address.clone(),
            });
        }

        if ctx.now - existing.last_seen > Duration::hours(RETURNED_THRESHOLD_HOURS) {
            self.events.publish(&Event::ReturnedDevice {
                user_id: existing.user_id.clone(),
                device_identifier: existing.device_identifier.clone(),
                display_name: existing.display_name.clone(),
                last_seen: existing.last_seen,
                ip: session.player.address.clone(),
            });
        }

        let newly_started = !active_keys.contains(&session.session_key);
        self.devices
            .update_observation(existing.id, observed, newly_started, ctx.now)
            .await
    }
}

fn observed_fields(session: &Session) -> ObservedDevice<'_> {
    ObservedDevice {
        user_id: &session.user.id,
        device_identifier: &session.player.machine_id,
        // The upstream player title is the best initial display name; users
        // may rename later and renames are never clobbered.
        display_name: session
            .player
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&session.player.machine_id),
        platform: session.player.platform.as_deref(),
        product: session.player.product.as_deref(),
        version: session.player.version.as_deref(),
        address: &session.player.address,
    }
}
