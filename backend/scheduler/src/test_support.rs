//! Fakes shared by the scheduler tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use idlewatch_core::{
    ChannelDirectory, ChannelInfo, Clock, HistorySource, MessageEvent, Notifier, WatchError,
};

/// Wall-clock instant `secs` after the Unix epoch.
pub fn wall(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

pub fn msg(channel: &str, secs: i64) -> MessageEvent {
    MessageEvent::new(channel, format!("{secs}.000000")).unwrap()
}

pub fn channel(id: &str, name: &str, is_member: bool) -> ChannelInfo {
    ChannelInfo {
        id: id.into(),
        name: name.into(),
        is_archived: false,
        is_member,
    }
}

/// Wall clock that moves with tokio's (pausable) clock.
pub struct TokioClock {
    origin_wall: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(origin_wall: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            origin_wall,
            origin: tokio::time::Instant::now(),
        })
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.origin;
        self.origin_wall + TimeDelta::from_std(elapsed).unwrap()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, target: &str, text: &str) -> Result<(), WatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(WatchError::Notify("channel_not_found".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((target.to_string(), text.to_string()));
        Ok(())
    }
}

/// In-memory channel directory and history source.
#[derive(Default)]
pub struct FakeWorkspace {
    channels: Vec<ChannelInfo>,
    histories: HashMap<String, Vec<MessageEvent>>,
    failing_joins: HashSet<String>,
    failing_histories: HashSet<String>,
    directory_down: bool,
    joined: Mutex<Vec<String>>,
    history_calls: Mutex<Vec<String>>,
}

impl FakeWorkspace {
    pub fn new(channels: Vec<ChannelInfo>) -> Self {
        Self {
            channels,
            ..Self::default()
        }
    }

    pub fn with_history(mut self, channel_id: &str, events: Vec<MessageEvent>) -> Self {
        self.histories.insert(channel_id.to_string(), events);
        self
    }

    pub fn failing_join(mut self, channel_id: &str) -> Self {
        self.failing_joins.insert(channel_id.to_string());
        self
    }

    pub fn failing_history(mut self, channel_id: &str) -> Self {
        self.failing_histories.insert(channel_id.to_string());
        self
    }

    pub fn failing_directory(mut self) -> Self {
        self.directory_down = true;
        self
    }

    pub fn joined(&self) -> Vec<String> {
        self.joined.lock().unwrap().clone()
    }

    pub fn history_calls(&self) -> Vec<String> {
        self.history_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelDirectory for FakeWorkspace {
    async fn list_public_channels(&self) -> Result<Vec<ChannelInfo>, WatchError> {
        if self.directory_down {
            return Err(WatchError::Directory("ratelimited".into()));
        }
        Ok(self.channels.clone())
    }

    async fn join(&self, channel_id: &str) -> Result<(), WatchError> {
        if self.failing_joins.contains(channel_id) {
            return Err(WatchError::Join {
                channel_id: channel_id.into(),
                message: "method_not_supported_for_channel_type".into(),
            });
        }
        self.joined.lock().unwrap().push(channel_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl HistorySource for FakeWorkspace {
    async fn fetch_history(
        &self,
        channel_id: &str,
        oldest: DateTime<Utc>,
    ) -> Result<Vec<MessageEvent>, WatchError> {
        self.history_calls
            .lock()
            .unwrap()
            .push(channel_id.to_string());
        if self.failing_histories.contains(channel_id) {
            return Err(WatchError::History {
                channel_id: channel_id.into(),
                message: "not_in_channel".into(),
            });
        }
        Ok(self
            .histories
            .get(channel_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.timestamp >= oldest)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
