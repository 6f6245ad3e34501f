use thiserror::Error;

/// Top-level error type for the idlewatch runtime.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("channel directory error: {0}")]
    Directory(String),

    #[error("failed to join channel {channel_id}: {message}")]
    Join { channel_id: String, message: String },

    #[error("history fetch failed for channel {channel_id}: {message}")]
    History { channel_id: String, message: String },

    #[error("notification delivery failed: {0}")]
    Notify(String),

    #[error("malformed message event: {0}")]
    MalformedEvent(String),

    #[error("live event feed error: {0}")]
    Feed(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
