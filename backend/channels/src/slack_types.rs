//! Slack wire types shared by the Web API client and both live feeds.

use idlewatch_core::{
    BotMetadata, ChannelInfo, FileMetadata, FileRef, MessageEvent, MessageSubtype, WatchError,
};
use serde::Deserialize;

/// Top-level envelope from the Events API (also the Socket Mode `events_api` payload).
#[derive(Deserialize, Debug)]
pub struct SlackEnvelope {
    #[serde(rename = "type")]
    pub envelope_type: String,
    /// Present on `url_verification` challenges.
    pub challenge: Option<String>,
    /// Present on `event_callback`.
    pub event: Option<SlackEvent>,
    pub team_id: Option<String>,
}

/// An inner event. Only `message` events carry activity.
#[derive(Deserialize, Debug)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub channel: Option<String>,
    #[serde(flatten)]
    pub message: SlackMessage,
}

/// A message as found in `conversations.history` and in `message` events.
#[derive(Deserialize, Debug, Default)]
pub struct SlackMessage {
    pub subtype: Option<String>,
    pub ts: Option<String>,
    pub thread_ts: Option<String>,
    pub user: Option<String>,
    pub bot_id: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub files: Vec<SlackFile>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SlackFile {
    pub id: String,
    pub name: Option<String>,
    pub mimetype: Option<String>,
    pub permalink: Option<String>,
    pub size: Option<u64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SlackChannel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_member: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SlackBot {
    pub id: String,
    pub name: Option<String>,
    pub app_id: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub next_cursor: String,
}

#[derive(Deserialize, Debug)]
pub struct ConversationsListPage {
    #[serde(default)]
    pub channels: Vec<SlackChannel>,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

#[derive(Deserialize, Debug)]
pub struct HistoryPage {
    #[serde(default)]
    pub messages: Vec<SlackMessage>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

impl SlackMessage {
    /// Convert into a domain event for `channel_id`. Missing or unparseable
    /// `ts` makes the record malformed.
    pub fn into_event(self, channel_id: &str) -> Result<MessageEvent, WatchError> {
        let ts = self
            .ts
            .ok_or_else(|| WatchError::MalformedEvent("message without ts".into()))?;
        let mut event = MessageEvent::new(channel_id, ts)?
            .with_subtype(MessageSubtype::from_wire(self.subtype.as_deref()));
        // Slack sets thread_ts == ts on the thread root itself.
        event.thread_parent = self.thread_ts.filter(|parent| *parent != event.ts);
        event.user = self.user;
        event.bot_id = self.bot_id;
        event.text = self.text;
        event.files = self
            .files
            .into_iter()
            .map(|f| FileRef {
                id: f.id,
                name: f.name,
            })
            .collect();
        Ok(event)
    }
}

impl SlackEvent {
    /// The domain event carried by a `message` event, if any.
    pub fn into_message_event(self) -> Option<Result<MessageEvent, WatchError>> {
        if self.event_type != "message" {
            return None;
        }
        let Some(channel) = self.channel else {
            return Some(Err(WatchError::MalformedEvent(
                "message event without channel".into(),
            )));
        };
        Some(self.message.into_event(&channel))
    }
}

impl From<SlackChannel> for ChannelInfo {
    fn from(c: SlackChannel) -> Self {
        ChannelInfo {
            id: c.id,
            name: c.name,
            is_archived: c.is_archived,
            is_member: c.is_member,
        }
    }
}

impl From<SlackFile> for FileMetadata {
    fn from(f: SlackFile) -> Self {
        FileMetadata {
            id: f.id,
            name: f.name,
            mimetype: f.mimetype,
            permalink: f.permalink,
            size: f.size,
        }
    }
}

impl From<SlackBot> for BotMetadata {
    fn from(b: SlackBot) -> Self {
        BotMetadata {
            id: b.id,
            name: b.name,
            app_id: b.app_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_history_message_conversion() {
        let msg: SlackMessage = serde_json::from_value(json!({
            "type": "message",
            "user": "U1",
            "text": "see attached",
            "ts": "1700000050.000200",
            "thread_ts": "1700000000.000100",
            "files": [{"id": "F1", "name": "plan.pdf"}]
        }))
        .unwrap();

        let event = msg.into_event("C1").unwrap();
        assert_eq!(event.channel_id, "C1");
        assert_eq!(event.thread_parent.as_deref(), Some("1700000000.000100"));
        assert_eq!(event.user.as_deref(), Some("U1"));
        assert_eq!(event.files[0].id, "F1");
        assert!(event.is_qualifying());
    }

    #[test]
    fn test_thread_root_has_no_parent() {
        let msg: SlackMessage = serde_json::from_value(json!({
            "ts": "1700000000.000100",
            "thread_ts": "1700000000.000100",
        }))
        .unwrap();
        assert!(msg.into_event("C1").unwrap().thread_parent.is_none());
    }

    #[test]
    fn test_join_subtype() {
        let msg: SlackMessage = serde_json::from_value(json!({
            "subtype": "channel_join",
            "ts": "1700000000.000100",
            "user": "U2",
        }))
        .unwrap();
        assert!(!msg.into_event("C1").unwrap().is_qualifying());
    }

    #[test]
    fn test_malformed_ts_is_rejected() {
        let missing = SlackMessage::default();
        assert!(matches!(
            missing.into_event("C1"),
            Err(WatchError::MalformedEvent(_))
        ));

        let garbage: SlackMessage =
            serde_json::from_value(json!({"ts": "yesterday"})).unwrap();
        assert!(garbage.into_event("C1").is_err());
    }

    #[test]
    fn test_event_callback_envelope() {
        let envelope: SlackEnvelope = serde_json::from_value(json!({
            "type": "event_callback",
            "team_id": "T1",
            "event": {
                "type": "message",
                "channel": "C9",
                "user": "U1",
                "text": "hello",
                "ts": "1700000000.000100"
            }
        }))
        .unwrap();
        let event = envelope.event.unwrap().into_message_event().unwrap().unwrap();
        assert_eq!(event.channel_id, "C9");
        assert_eq!(event.text.as_deref(), Some("hello"));
    }

    #[test]
    fn test_non_message_events_are_ignored() {
        let event: SlackEvent = serde_json::from_value(json!({
            "type": "reaction_added",
            "user": "U1",
        }))
        .unwrap();
        assert!(event.into_message_event().is_none());
    }
}
