use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::WatchError;
use crate::event::MessageEvent;
use crate::message::Message;
use crate::types::{BotMetadata, ChannelInfo, FileMetadata};

/// Trait for long-running runtime components (the watchdog, the archiver).
///
/// Each component consumes its own channel and runs in its own Tokio task.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Human-readable name of this component.
    fn name(&self) -> &str;

    /// Start the component's event loop, consuming from the given receiver.
    async fn start(&self, rx: mpsc::Receiver<Message>) -> Result<()>;
}

/// Lists the workspace's channels and joins them.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// All public channels, archived ones included.
    async fn list_public_channels(&self) -> Result<Vec<ChannelInfo>, WatchError>;

    async fn join(&self, channel_id: &str) -> Result<(), WatchError>;
}

/// Reads channel history.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Messages in `channel_id` with a timestamp at or after `oldest`.
    /// Records that cannot be parsed are dropped by the implementation.
    async fn fetch_history(
        &self,
        channel_id: &str,
        oldest: DateTime<Utc>,
    ) -> Result<Vec<MessageEvent>, WatchError>;
}

/// One-shot delivery of a text message to a fixed recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, target: &str, text: &str) -> Result<(), WatchError>;
}

/// Observer that persists live messages. Never consulted by the watchdog.
#[async_trait]
pub trait ArchivalSink: Send + Sync {
    async fn archive(&self, event: &MessageEvent) -> Result<(), WatchError>;
}

/// Resolves file and bot references for archival enrichment.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn file_info(&self, file_id: &str) -> Result<FileMetadata, WatchError>;

    async fn bot_info(&self, bot_id: &str) -> Result<BotMetadata, WatchError>;
}

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
