use std::path::PathBuf;

use chrono::TimeDelta;
use idlewatch_core::WatchError;
use idlewatch_scheduler::{DEFAULT_IDLE_THRESHOLD_SECS, MAX_IDLE_THRESHOLD_SECS};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_EVENTS_PATH: &str = "/slack/events";

/// How live messages reach the watchdog.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedConfig {
    /// Outbound WebSocket; needs no public endpoint.
    SocketMode { app_token: String },
    /// Inbound Events API webhook.
    EventsApi {
        signing_secret: String,
        port: u16,
        events_path: String,
    },
}

/// idlewatch runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Slack bot token (xoxb-...)
    pub bot_token: String,
    /// `None` when neither an app token nor a signing secret is set.
    pub feed: Option<FeedConfig>,
    /// User or channel id that receives the idle notification
    pub notify_target: String,
    pub notify_text: String,
    pub idle_threshold: TimeDelta,
    pub archive_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    /// Log level
    pub log_level: String,
}

impl Config {
    /// Load `.env` then `.env.local` (overriding), then read the environment.
    pub fn from_env() -> Result<Self, WatchError> {
        let _ = dotenvy::dotenv();
        let _ = dotenvy::from_filename_override(".env.local");
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WatchError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| WatchError::Config(format!("{key} must be set")))
        };

        let bot_token = required("SLACK_BOT_TOKEN")?;
        let notify_target = required("IDLEWATCH_NOTIFY_TARGET")?;

        let threshold_secs = match get("IDLEWATCH_IDLE_THRESHOLD_SECS") {
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                WatchError::Config(format!(
                    "IDLEWATCH_IDLE_THRESHOLD_SECS must be a whole number of seconds, got {raw:?}"
                ))
            })?,
            None => DEFAULT_IDLE_THRESHOLD_SECS,
        };
        if threshold_secs <= 0 {
            return Err(WatchError::Config(
                "IDLEWATCH_IDLE_THRESHOLD_SECS must be greater than zero".into(),
            ));
        }
        if threshold_secs > MAX_IDLE_THRESHOLD_SECS {
            return Err(WatchError::Config(format!(
                "IDLEWATCH_IDLE_THRESHOLD_SECS must be at most {MAX_IDLE_THRESHOLD_SECS} (365 days)"
            )));
        }
        let idle_threshold = TimeDelta::try_seconds(threshold_secs).ok_or_else(|| {
            WatchError::Config("IDLEWATCH_IDLE_THRESHOLD_SECS is out of range".into())
        })?;

        let feed = match (get("SLACK_APP_TOKEN"), get("SLACK_SIGNING_SECRET")) {
            (Some(app_token), _) => Some(FeedConfig::SocketMode { app_token }),
            (None, Some(signing_secret)) => {
                let port = match get("PORT") {
                    Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                        WatchError::Config(format!("PORT must be a valid port number, got {raw:?}"))
                    })?,
                    None => DEFAULT_PORT,
                };
                Some(FeedConfig::EventsApi {
                    signing_secret,
                    port,
                    events_path: get("SLACK_EVENTS_PATH")
                        .unwrap_or_else(|| DEFAULT_EVENTS_PATH.to_string()),
                })
            }
            (None, None) => None,
        };

        Ok(Self {
            bot_token,
            feed,
            notify_target,
            notify_text: get("IDLEWATCH_NOTIFY_TEXT")
                .unwrap_or_else(|| default_notify_text(idle_threshold)),
            idle_threshold,
            archive_dir: get("IDLEWATCH_ARCHIVE_DIR").map(|p| expand_home(&p)),
            log_dir: get("IDLEWATCH_LOG_DIR").map(|p| expand_home(&p)),
            log_level: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// The live feed, required for `run`.
    pub fn require_feed(&self) -> Result<&FeedConfig, WatchError> {
        self.feed.as_ref().ok_or_else(|| {
            WatchError::Config(
                "SLACK_APP_TOKEN (Socket Mode) or SLACK_SIGNING_SECRET (Events API) must be set"
                    .into(),
            )
        })
    }
}

/// Notification text for `threshold` when none is configured.
pub fn default_notify_text(threshold: TimeDelta) -> String {
    format!(
        "No message was sent in the last {}.\n\
         Visit the workspace admin page to see the last 5 users to join the workspace",
        describe_duration(threshold)
    )
}

/// "24 hours", "90 minutes", "1 second".
fn describe_duration(d: TimeDelta) -> String {
    let secs = d.num_seconds();
    let (n, unit) = if secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
