//! Slack Socket Mode live feed.
//!
//! Holds one long-lived WebSocket to Slack, acknowledges every envelope, and
//! forwards `message` events. Reconnects with exponential backoff when Slack
//! asks for it or the connection drops.
//!
//! Required env vars:
//!   SLACK_APP_TOKEN  — app-level token (xapp-...) with `connections:write`

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use idlewatch_core::{MessageEvent, WatchError};
use idlewatch_logging::{redact_sensitive_data, EventLogger, WatchdogEvent};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::slack::SlackClient;
use crate::slack_types::SlackEnvelope;
use crate::LiveFeed;

const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 60;

/// A Socket Mode frame.
#[derive(Deserialize, Debug)]
struct SocketFrame {
    #[serde(rename = "type")]
    frame_type: String,
    envelope_id: Option<String>,
    payload: Option<Value>,
    reason: Option<String>,
}

/// What to do with one incoming frame.
#[derive(Debug, Default)]
pub struct FrameAction {
    /// Envelope id to acknowledge.
    pub ack: Option<String>,
    pub event: Option<Result<MessageEvent, WatchError>>,
    /// Slack asked us to reconnect.
    pub reconnect: bool,
}

/// Interpret a text frame.
pub fn handle_frame(text: &str) -> FrameAction {
    let frame: SocketFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            return FrameAction {
                event: Some(Err(WatchError::Feed(format!("unreadable frame: {e}")))),
                ..FrameAction::default()
            }
        }
    };

    let mut action = FrameAction {
        ack: frame.envelope_id,
        ..FrameAction::default()
    };

    match frame.frame_type.as_str() {
        "hello" => debug!("Socket Mode hello"),
        "disconnect" => {
            info!(reason = ?frame.reason, "Slack requested reconnect");
            action.reconnect = true;
        }
        "events_api" => {
            let envelope = frame
                .payload
                .map(serde_json::from_value::<SlackEnvelope>)
                .transpose();
            match envelope {
                Ok(Some(envelope)) => {
                    action.event = envelope.event.and_then(|e| e.into_message_event());
                }
                Ok(None) => {}
                Err(e) => {
                    action.event = Some(Err(WatchError::MalformedEvent(e.to_string())));
                }
            }
        }
        other => debug!(frame_type = other, "Ignoring Socket Mode frame"),
    }
    action
}

pub struct SlackSocketFeed {
    client: SlackClient,
    app_token: String,
    feed_tx: mpsc::Sender<MessageEvent>,
}

impl SlackSocketFeed {
    pub fn new(client: SlackClient, app_token: String, feed_tx: mpsc::Sender<MessageEvent>) -> Self {
        Self {
            client,
            app_token,
            feed_tx,
        }
    }

    /// One connection: open, read until disconnect/EOF/error.
    /// Returns `Ok(false)` once the live feed has no receiver left.
    async fn connect_and_listen(&self) -> Result<bool> {
        let url = self.client.open_socket_url(&self.app_token).await?;
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        info!(url = %redact_sensitive_data(&url), "[Slack] Socket Mode connected");

        let (mut write, mut read) = ws_stream.split();

        while let Some(message) = read.next().await {
            let text = match message? {
                WsMessage::Text(text) => text,
                WsMessage::Close(_) => break,
                _ => continue,
            };

            let action = handle_frame(&text);
            if let Some(envelope_id) = action.ack {
                let ack = serde_json::json!({ "envelope_id": envelope_id }).to_string();
                write.send(WsMessage::Text(ack)).await?;
            }
            match action.event {
                Some(Ok(event)) => {
                    if self.feed_tx.send(event).await.is_err() {
                        return Ok(false);
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "[Slack] Skipping malformed Socket Mode event");
                    EventLogger::log_event(WatchdogEvent::EventSkipped {
                        reason: e.to_string(),
                    });
                }
                None => {}
            }
            if action.reconnect {
                break;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl LiveFeed for SlackSocketFeed {
    fn name(&self) -> &str {
        "slack-socket-mode"
    }

    /// Run until the live feed receiver goes away.
    async fn start(&self) -> Result<()> {
        let mut backoff_secs = INITIAL_BACKOFF_SECS;
        loop {
            match self.connect_and_listen().await {
                Ok(false) => {
                    info!("[Slack] Live feed closed, stopping Socket Mode");
                    return Ok(());
                }
                Ok(true) => {
                    // Clean disconnect: reconnect promptly.
                    backoff_secs = INITIAL_BACKOFF_SECS;
                    continue;
                }
                Err(e) => {
                    warn!(
                        error = %redact_sensitive_data(&e.to_string()),
                        backoff_secs,
                        "[Slack] Socket Mode connection error"
                    );
                }
            }
            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
        }
    }
}
