//! Structured logging for idlewatch.
//!
//! Handles subscriber setup, daily-rotated NDJSON files, token redaction, and
//! the typed watchdog lifecycle log.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{EventLogEntry, EventLogger, WatchdogEvent};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;
