//! Watchdog Event Logger
//!
//! Typed lifecycle records (reconciled, armed, notified, ...) written through
//! `tracing` under the `watchdog_events` target.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatchdogEvent {
    Reconciled {
        baseline: Option<DateTime<Utc>>,
        channels_scanned: usize,
        channels_skipped: usize,
    },
    ChannelSkipped {
        channel_id: String,
        reason: String,
    },
    TimerArmed {
        generation: u64,
        deadline: DateTime<Utc>,
    },
    TimerCancelled {
        generation: u64,
    },
    Notified {
        target: String,
    },
    NotifyFailed {
        target: String,
        error: String,
    },
    EventSkipped {
        reason: String,
    },
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub timestamp: DateTime<Utc>,
    pub event: WatchdogEvent,
}

pub struct EventLogger;

impl EventLogger {
    /// Log a watchdog lifecycle event, redacting any free-text fields first.
    pub fn log_event(mut event: WatchdogEvent) -> EventLogEntry {
        match &mut event {
            WatchdogEvent::ChannelSkipped { reason, .. }
            | WatchdogEvent::EventSkipped { reason } => {
                *reason = redact_sensitive_data(reason);
            }
            WatchdogEvent::NotifyFailed { error, .. } => {
                *error = redact_sensitive_data(error);
            }
            _ => {}
        }

        let entry = EventLogEntry {
            timestamp: Utc::now(),
            event,
        };

        let json = serde_json::to_string(&entry.event).unwrap_or_default();
        info!(target: "watchdog_events", event = %json, "Watchdog event");
        entry
    }
}
