use serde::{Deserialize, Serialize};

use crate::event::MessageEvent;

/// Items delivered to the watchdog inbox.
///
/// Live events and deadline fires share one channel so they are handled
/// strictly one at a time, in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Feed → Watchdog: a message was posted somewhere in the workspace.
    Live(MessageEvent),
    /// Timer → Watchdog: the idle deadline armed under `generation` elapsed.
    IdleDeadline { generation: u64 },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Live(_) => "live",
            Message::IdleDeadline { .. } => "idle_deadline",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind() {
        let event = MessageEvent::new("C1", "1700000000.000100").unwrap();
        assert_eq!(Message::Live(event).kind(), "live");
        assert_eq!(Message::IdleDeadline { generation: 3 }.kind(), "idle_deadline");
    }

    #[test]
    fn test_message_serialization_tag() {
        let json = serde_json::to_value(Message::IdleDeadline { generation: 7 }).unwrap();
        assert_eq!(json["type"], "idle_deadline");
        assert_eq!(json["generation"], 7);
    }
}
