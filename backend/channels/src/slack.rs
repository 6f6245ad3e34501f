/// Slack Web API client.
///
/// Implements the channel directory (`conversations.list` / `conversations.join`),
/// the history source (`conversations.history`), the notifier
/// (`chat.postMessage`), and archival metadata lookups (`files.info`,
/// `bots.info`). Also opens Socket Mode connections (`apps.connections.open`).
///
/// Required env vars:
///   SLACK_BOT_TOKEN  — Bot User OAuth Token (xoxb-...)
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use idlewatch_core::{
    format_slack_ts, BotMetadata, ChannelDirectory, ChannelInfo, FileMetadata, HistorySource,
    MessageEvent, MetadataSource, Notifier, SelfIdentity, WatchError,
};
use idlewatch_logging::{EventLogger, WatchdogEvent};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::slack_types::{ConversationsListPage, HistoryPage, SlackBot, SlackFile};

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// Attempts for read calls that hit HTTP 429.
const MAX_RATE_LIMIT_ATTEMPTS: u32 = 3;
const PAGE_LIMIT: &str = "200";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SlackApiError {
    #[error("{method}: HTTP error: {source}")]
    Http {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method}: Slack returned error `{error}`")]
    Api { method: String, error: String },

    #[error("{method}: rate limited")]
    RateLimited { method: String },

    #[error("{method}: unexpected response: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Turn a raw Web API response into `T`, honouring the `{ok, error}` envelope.
pub fn parse_response<T: DeserializeOwned>(method: &str, body: Value) -> Result<T, SlackApiError> {
    if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        let error = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error")
            .to_string();
        return Err(SlackApiError::Api {
            method: method.to_string(),
            error,
        });
    }
    serde_json::from_value(body).map_err(|source| SlackApiError::Decode {
        method: method.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SlackConfig {
    pub bot_token: String,
    pub api_base: String,
}

impl SlackConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SlackClient {
    config: SlackConfig,
    http_client: Client,
}

#[derive(Deserialize)]
struct FileInfoResponse {
    file: SlackFile,
}

#[derive(Deserialize)]
struct BotInfoResponse {
    bot: SlackBot,
}

#[derive(Deserialize)]
struct ConnectionsOpenResponse {
    url: String,
}

#[derive(Deserialize)]
struct AuthTestResponse {
    user_id: Option<String>,
    bot_id: Option<String>,
}

impl From<AuthTestResponse> for SelfIdentity {
    fn from(res: AuthTestResponse) -> Self {
        Self {
            user_id: res.user_id,
            bot_id: res.bot_id,
        }
    }
}

impl SlackClient {
    pub fn new(config: SlackConfig) -> Self {
        Self {
            config,
            http_client: Client::new(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), method)
    }

    /// GET a read method, retrying on 429 after `Retry-After`.
    async fn get<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SlackApiError> {
        let http = |source: reqwest::Error| SlackApiError::Http {
            method: method.to_string(),
            source,
        };

        for attempt in 1..=MAX_RATE_LIMIT_ATTEMPTS {
            let res = self
                .http_client
                .get(self.url(method))
                .bearer_auth(&self.config.bot_token)
                .query(query)
                .send()
                .await
                .map_err(http)?;

            if res.status() == StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after(res.headers());
                warn!(method, attempt, wait_secs = wait.as_secs(), "Slack rate limited");
                if attempt < MAX_RATE_LIMIT_ATTEMPTS {
                    tokio::time::sleep(wait).await;
                }
                continue;
            }

            let body: Value = res.json().await.map_err(http)?;
            return parse_response(method, body);
        }
        Err(SlackApiError::RateLimited {
            method: method.to_string(),
        })
    }

    /// POST a JSON body. Never retried.
    async fn post<T: DeserializeOwned>(
        &self,
        method: &str,
        token: &str,
        body: &Value,
    ) -> Result<T, SlackApiError> {
        let http = |source: reqwest::Error| SlackApiError::Http {
            method: method.to_string(),
            source,
        };
        let res = self
            .http_client
            .post(self.url(method))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(http)?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(SlackApiError::RateLimited {
                method: method.to_string(),
            });
        }
        let body: Value = res.json().await.map_err(http)?;
        parse_response(method, body)
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelInfo>, SlackApiError> {
        let mut channels = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut query = vec![("types", "public_channel"), ("limit", PAGE_LIMIT)];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }
            let page: ConversationsListPage = self.get("conversations.list", &query).await?;
            channels.extend(page.channels.into_iter().map(ChannelInfo::from));
            cursor = page.response_metadata.next_cursor;
            if cursor.is_empty() {
                break;
            }
        }
        debug!(count = channels.len(), "Listed public channels");
        Ok(channels)
    }

    pub async fn join_channel(&self, channel_id: &str) -> Result<(), SlackApiError> {
        let _: Value = self
            .post(
                "conversations.join",
                &self.config.bot_token,
                &json!({ "channel": channel_id }),
            )
            .await?;
        info!(channel = %channel_id, "Joined channel");
        Ok(())
    }

    /// All history pages for `channel_id` since `oldest`. Malformed records
    /// are dropped with a warning.
    pub async fn history(
        &self,
        channel_id: &str,
        oldest: DateTime<Utc>,
    ) -> Result<Vec<MessageEvent>, SlackApiError> {
        let oldest = format_slack_ts(oldest);
        let mut events = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut query = vec![
                ("channel", channel_id),
                ("oldest", oldest.as_str()),
                ("limit", PAGE_LIMIT),
            ];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }
            let page: HistoryPage = self.get("conversations.history", &query).await?;
            events.extend(convert_history(channel_id, page.messages));
            cursor = page.response_metadata.next_cursor;
            if !page.has_more || cursor.is_empty() {
                break;
            }
        }
        Ok(events)
    }

    pub async fn post_message(&self, channel: &str, text: &str) -> Result<(), SlackApiError> {
        let _: Value = self
            .post(
                "chat.postMessage",
                &self.config.bot_token,
                &json!({ "channel": channel, "text": text }),
            )
            .await?;
        info!(channel = %channel, "Sent message");
        Ok(())
    }

    pub async fn files_info(&self, file_id: &str) -> Result<FileMetadata, SlackApiError> {
        let res: FileInfoResponse = self.get("files.info", &[("file", file_id)]).await?;
        Ok(res.file.into())
    }

    pub async fn bots_info(&self, bot_id: &str) -> Result<BotMetadata, SlackApiError> {
        let res: BotInfoResponse = self.get("bots.info", &[("bot", bot_id)]).await?;
        Ok(res.bot.into())
    }

    /// The user and bot ids behind the bot token (`auth.test`).
    pub async fn auth_identity(&self) -> Result<SelfIdentity, SlackApiError> {
        let res: AuthTestResponse = self.get("auth.test", &[]).await?;
        let identity = SelfIdentity::from(res);
        info!(user_id = ?identity.user_id, bot_id = ?identity.bot_id, "Resolved bot identity");
        Ok(identity)
    }

    /// Request a fresh Socket Mode WebSocket URL using an app-level token.
    pub async fn open_socket_url(&self, app_token: &str) -> Result<String, SlackApiError> {
        let res: ConnectionsOpenResponse = self
            .post("apps.connections.open", app_token, &json!({}))
            .await?;
        Ok(res.url)
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Duration {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(1))
}

/// Convert a history page, skipping records that cannot be parsed.
pub fn convert_history(
    channel_id: &str,
    messages: Vec<crate::slack_types::SlackMessage>,
) -> Vec<MessageEvent> {
    messages
        .into_iter()
        .filter_map(|m| match m.into_event(channel_id) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(channel = %channel_id, error = %e, "Dropping malformed history record");
                EventLogger::log_event(WatchdogEvent::EventSkipped {
                    reason: e.to_string(),
                });
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Collaborator impls
// ---------------------------------------------------------------------------

#[async_trait]
impl ChannelDirectory for SlackClient {
    async fn list_public_channels(&self) -> Result<Vec<ChannelInfo>, WatchError> {
        self.list_channels()
            .await
            .map_err(|e| WatchError::Directory(e.to_string()))
    }

    async fn join(&self, channel_id: &str) -> Result<(), WatchError> {
        self.join_channel(channel_id)
            .await
            .map_err(|e| WatchError::Join {
                channel_id: channel_id.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl HistorySource for SlackClient {
    async fn fetch_history(
        &self,
        channel_id: &str,
        oldest: DateTime<Utc>,
    ) -> Result<Vec<MessageEvent>, WatchError> {
        self.history(channel_id, oldest)
            .await
            .map_err(|e| WatchError::History {
                channel_id: channel_id.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl Notifier for SlackClient {
    async fn send(&self, target: &str, text: &str) -> Result<(), WatchError> {
        self.post_message(target, text)
            .await
            .map_err(|e| WatchError::Notify(e.to_string()))
    }
}

#[async_trait]
impl MetadataSource for SlackClient {
    async fn file_info(&self, file_id: &str) -> Result<FileMetadata, WatchError> {
        self.files_info(file_id)
            .await
            .map_err(|e| WatchError::Archive(e.to_string()))
    }

    async fn bot_info(&self, bot_id: &str) -> Result<BotMetadata, WatchError> {
        self.bots_info(bot_id)
            .await
            .map_err(|e| WatchError::Archive(e.to_string()))
    }
}
