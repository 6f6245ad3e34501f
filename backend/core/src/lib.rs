pub mod channel;
pub mod error;
pub mod event;
pub mod message;
pub mod traits;
pub mod types;

pub use channel::{route_feed, WatchBus};
pub use error::WatchError;
pub use event::{
    format_slack_ts, parse_slack_ts, FileRef, MessageEvent, MessageSubtype, MAX_SLACK_TS_SECS,
};
pub use message::Message;
pub use traits::{
    ArchivalSink, ChannelDirectory, Clock, Component, HistorySource, MetadataSource, Notifier,
    SystemClock,
};
pub use types::{ActivityState, BotMetadata, ChannelInfo, FileMetadata, SelfIdentity};
