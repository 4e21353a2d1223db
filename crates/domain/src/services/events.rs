//! In-process event bus.
//!
//! Device tracking and enforcement publish typed events; notifier backends
//! subscribe. Delivery is synchronous and in emission order. A failing
//! subscriber is logged and isolated, it never affects other subscribers or
//! the publisher.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::models::StopCode;

/// Events emitted by the tracking and enforcement pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum Event {
    NewDevice {
        user_id: String,
        username: Option<String>,
        device_identifier: String,
        display_name: String,
        ip: Option<String>,
    },
    LocationChange {
        user_id: String,
        device_identifier: String,
        display_name: String,
        old_ip: Option<String>,
        new_ip: String,
    },
    ReturnedDevice {
        user_id: String,
        device_identifier: String,
        display_name: String,
        last_seen: DateTime<Utc>,
        ip: String,
    },
    DeviceNoteSubmitted {
        user_id: String,
        device_identifier: String,
        description: String,
    },
    StreamBlocked {
        user_id: String,
        username: Option<String>,
        device_identifier: String,
        stop_code: StopCode,
        reason: String,
        session_key: String,
        ip: String,
    },
}

impl Event {
    /// Stable name used for logging and subscriber filtering.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::NewDevice { .. } => "new_device",
            Event::LocationChange { .. } => "location_change",
            Event::ReturnedDevice { .. } => "returned_device",
            Event::DeviceNoteSubmitted { .. } => "device_note_submitted",
            Event::StreamBlocked { .. } => "stream_blocked",
        }
    }
}

/// A notifier backend. Handlers run synchronously on the publishing task and
/// must not block for long.
pub trait EventSubscriber: Send + Sync {
    /// The name of this subscriber (used for logging).
    fn name(&self) -> &'static str;

    fn handle(&self, event: &Event) -> Result<(), String>;
}

/// Synchronous publish/subscribe hub.
pub struct EventBus {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    /// Register a subscriber. Registration happens at startup, before the
    /// bus is shared.
    pub fn subscribe<S: EventSubscriber + 'static>(&mut self, subscriber: S) {
        self.subscribers.push(Arc::new(subscriber));
    }

    /// Deliver an event to every subscriber in registration order.
    pub fn publish(&self, event: &Event) {
        for subscriber in &self.subscribers {
            if let Err(error) = subscriber.handle(event) {
                warn!(
                    subscriber = subscriber.name(),
                    event = event.kind(),
                    error = %error,
                    "Event subscriber failed"
                );
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Default subscriber: writes every event to the structured log.
pub struct LogSubscriber;

impl EventSubscriber for LogSubscriber {
    fn name(&self) -> &'static str {
        "log"
    }

    fn handle(&self, event: &Event) -> Result<(), String> {
        let payload = serde_json::to_string(event).map_err(|e| e.to_string())?;
        tracing::info!(event = event.kind(), payload = %payload, "Event");
        Ok(())
    }
}
