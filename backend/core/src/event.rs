use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WatchError;

/// A single message observed in a workspace channel, either from history or
/// from the live feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub channel_id: String,
    /// Raw Slack `ts`, kept verbatim because it doubles as the message id.
    pub ts: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub subtype: MessageSubtype,
    /// `thread_ts` of the thread root when this message is a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileRef>,
}

/// Message subtype as reported by the chat platform.
///
/// Only [`MessageSubtype::ChannelJoin`] is excluded from activity; every other
/// subtype, known or not, counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum MessageSubtype {
    #[default]
    Content,
    ChannelJoin,
    Other(String),
}

/// Reference to a file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl MessageEvent {
    /// Build a content message, parsing `ts` into a timestamp.
    pub fn new(channel_id: impl Into<String>, ts: impl Into<String>) -> Result<Self, WatchError> {
        let ts = ts.into();
        let timestamp = parse_slack_ts(&ts)
            .ok_or_else(|| WatchError::MalformedEvent(format!("unparseable ts {ts:?}")))?;
        Ok(Self {
            channel_id: channel_id.into(),
            ts,
            timestamp,
            subtype: MessageSubtype::Content,
            thread_parent: None,
            user: None,
            bot_id: None,
            text: None,
            files: Vec::new(),
        })
    }

    pub fn with_subtype(mut self, subtype: MessageSubtype) -> Self {
        self.subtype = subtype;
        self
    }

    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_parent = Some(thread_ts.into());
        self
    }

    /// Whether this event counts as workspace activity.
    pub fn is_qualifying(&self) -> bool {
        self.subtype.is_qualifying()
    }

    /// The ts of the thread this message belongs to (its own ts for top-level messages).
    pub fn thread_root(&self) -> &str {
        self.thread_parent.as_deref().unwrap_or(&self.ts)
    }
}

impl MessageSubtype {
    pub fn from_wire(subtype: Option<&str>) -> Self {
        match subtype {
            None | Some("") => Self::Content,
            Some("channel_join") => Self::ChannelJoin,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> Option<&str> {
        match self {
            Self::Content => None,
            Self::ChannelJoin => Some("channel_join"),
            Self::Other(s) => Some(s),
        }
    }

    pub fn is_qualifying(&self) -> bool {
        !matches!(self, Self::ChannelJoin)
    }
}

impl From<Option<String>> for MessageSubtype {
    fn from(value: Option<String>) -> Self {
        Self::from_wire(value.as_deref())
    }
}

impl From<MessageSubtype> for Option<String> {
    fn from(value: MessageSubtype) -> Self {
        value.as_wire().map(String::from)
    }
}

/// Latest accepted `ts`: 9999-12-31T23:59:59Z.
pub const MAX_SLACK_TS_SECS: i64 = 253_402_300_799;

/// Parse a Slack `ts` (`"<seconds>.<micros>"`) into a UTC timestamp.
///
/// Returns `None` for anything that is not a non-negative decimal number of
/// seconds with at most microsecond precision, or that lies past
/// [`MAX_SLACK_TS_SECS`].
pub fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = match ts.split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (ts, ""),
    };
    if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if frac.len() > 6 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: i64 = secs.parse().ok()?;
    if secs > MAX_SLACK_TS_SECS {
        return None;
    }
    let micros: u32 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<6}").parse().ok()?
    };
    DateTime::from_timestamp(secs, micros * 1_000)
}

/// Render a timestamp in Slack `ts` form (`"<seconds>.<micros>"`).
pub fn format_slack_ts(at: DateTime<Utc>) -> String {
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}
