use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::MessageEvent;

/// A channel as reported by the channel directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_member: bool,
}

/// Details of an attached file, as archived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Details of the bot that authored a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotMetadata {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

/// The most recent qualifying message seen anywhere in the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityState {
    pub channel_id: String,
    /// Resolved during reconciliation; live events only carry the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    pub ts: String,
    pub timestamp: DateTime<Utc>,
}

impl ActivityState {
    pub fn from_event(event: &MessageEvent) -> Self {
        Self {
            channel_id: event.channel_id.clone(),
            channel_name: None,
            ts: event.ts.clone(),
            timestamp: event.timestamp,
        }
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = Some(name.into());
        self
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.channel_name {
            Some(name) => write!(f, "#{} at {}", name, self.timestamp.to_rfc3339()),
            None => write!(f, "{} at {}", self.channel_id, self.timestamp.to_rfc3339()),
        }
    }
}

/// The watchdog's own Slack identity. Messages it authored are not activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
}

impl SelfIdentity {
    /// Whether `event` was posted by this identity.
    pub fn authored(&self, event: &MessageEvent) -> bool {
        let same = |ours: &Option<String>, theirs: &Option<String>| {
            matches!((ours, theirs), (Some(a), Some(b)) if a == b)
        };
        same(&self.user_id, &event.user) || same(&self.bot_id, &event.bot_id)
    }
}
