/// Slack Events API live feed.
///
/// Receives signed webhooks and forwards `message` events to the live feed.
///
/// Required env vars:
///   SLACK_SIGNING_SECRET  — used to verify X-Slack-Signature HMAC
///   SLACK_EVENTS_PATH     — path to mount the webhook (default: /slack/events)
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use chrono::Utc;
use idlewatch_core::MessageEvent;
use idlewatch_logging::{EventLogger, WatchdogEvent};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::slack_types::SlackEnvelope;
use crate::LiveFeed;

/// Requests whose timestamp is further than this from now are replays.
const MAX_REQUEST_AGE_SECS: i64 = 60 * 5;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SlackEventsConfig {
    pub signing_secret: String,
    pub events_path: String,
}

// ---------------------------------------------------------------------------
// Axum state
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    config: SlackEventsConfig,
    feed_tx: mpsc::Sender<MessageEvent>,
}

// ---------------------------------------------------------------------------
// Adapter struct
// ---------------------------------------------------------------------------

pub struct SlackEventsFeed {
    config: SlackEventsConfig,
    feed_tx: mpsc::Sender<MessageEvent>,
}

impl SlackEventsFeed {
    pub fn new(config: SlackEventsConfig, feed_tx: mpsc::Sender<MessageEvent>) -> Self {
        Self { config, feed_tx }
    }
}

// ---------------------------------------------------------------------------
// Request classification
// ---------------------------------------------------------------------------

/// What a verified webhook body amounts to.
#[derive(Debug)]
pub enum WebhookOutcome {
    Challenge(String),
    Message(MessageEvent),
    Malformed(String),
    Ignored,
}

/// Parse a verified request body.
pub fn classify_body(body: &[u8]) -> Result<WebhookOutcome, serde_json::Error> {
    let envelope: SlackEnvelope = serde_json::from_slice(body)?;

    if envelope.envelope_type == "url_verification" {
        if let Some(challenge) = envelope.challenge {
            return Ok(WebhookOutcome::Challenge(challenge));
        }
    }
    if envelope.envelope_type != "event_callback" {
        return Ok(WebhookOutcome::Ignored);
    }
    let Some(event) = envelope.event else {
        return Ok(WebhookOutcome::Ignored);
    };
    Ok(match event.into_message_event() {
        Some(Ok(event)) => WebhookOutcome::Message(event),
        Some(Err(e)) => WebhookOutcome::Malformed(e.to_string()),
        None => WebhookOutcome::Ignored,
    })
}

// ---------------------------------------------------------------------------
// Webhook handler
// ---------------------------------------------------------------------------

async fn handle_slack_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    // 1. Verify Slack signature (HMAC-SHA256 over timestamp + body)
    let now = Utc::now().timestamp();
    if !verify_slack_signature(&headers, &body, &state.config.signing_secret, now) {
        warn!("[Slack] Invalid or stale signature — rejecting webhook");
        return (StatusCode::UNAUTHORIZED, "invalid_signature").into_response();
    }

    // 2. Parse and classify
    let outcome = match classify_body(&body) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("[Slack] Failed to parse event envelope: {}", err);
            return (StatusCode::BAD_REQUEST, "bad_json").into_response();
        }
    };

    match outcome {
        WebhookOutcome::Challenge(challenge) => (StatusCode::OK, challenge).into_response(),
        WebhookOutcome::Message(event) => {
            debug!(channel = %event.channel_id, ts = %event.ts, "[Slack] Message event");
            if state.feed_tx.send(event).await.is_err() {
                error!("[Slack] Live feed closed, dropping event");
            }
            (StatusCode::OK, "ok").into_response()
        }
        WebhookOutcome::Malformed(reason) => {
            warn!(reason = %reason, "[Slack] Skipping malformed message event");
            EventLogger::log_event(WatchdogEvent::EventSkipped { reason });
            (StatusCode::OK, "skipped").into_response()
        }
        WebhookOutcome::Ignored => (StatusCode::OK, "ignored").into_response(),
    }
}

/// Verify the `X-Slack-Signature` header using HMAC-SHA256, rejecting
/// requests timestamped more than five minutes away from `now`.
pub fn verify_slack_signature(
    headers: &HeaderMap,
    body: &[u8],
    signing_secret: &str,
    now: i64,
) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let sig = match headers
        .get("x-slack-signature")
        .and_then(|v| v.to_str().ok())
    {
        Some(s) => s.to_owned(),
        None => return false,
    };
    let ts = match headers
        .get("x-slack-request-timestamp")
        .and_then(|v| v.to_str().ok())
    {
        Some(s) => s.to_owned(),
        None => return false,
    };
    match ts.parse::<i64>() {
        Ok(sent) if (now - sent).abs() <= MAX_REQUEST_AGE_SECS => {}
        _ => return false,
    }

    let Some(provided) = sig.strip_prefix("v0=").and_then(|hex_sig| hex::decode(hex_sig).ok())
    else {
        return false;
    };

    let mut mac = match Hmac::<Sha256>::new_from_slice(signing_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(format!("v0:{ts}:").as_bytes());
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

// ---------------------------------------------------------------------------
// LiveFeed impl
// ---------------------------------------------------------------------------

#[async_trait]
impl LiveFeed for SlackEventsFeed {
    fn name(&self) -> &str {
        "slack-events"
    }

    fn build_router(&self) -> Router {
        let state = AppState {
            config: self.config.clone(),
            feed_tx: self.feed_tx.clone(),
        };
        Router::new()
            .route(&self.config.events_path, post(handle_slack_event))
            .with_state(state)
    }

    async fn start(&self) -> Result<()> {
        info!(path = %self.config.events_path, "[Slack] Events API feed ready (webhook-based)");
        Ok(())
    }
}
