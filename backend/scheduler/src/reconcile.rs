//! Startup reconciliation: derive the baseline from channel history before any
//! live event is processed.

use chrono::{DateTime, Utc};
use idlewatch_core::{
    ActivityState, ChannelDirectory, ChannelInfo, HistorySource, MessageEvent, WatchError,
};
use idlewatch_logging::{EventLogger, WatchdogEvent};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::activity::ActivityTracker;

/// A channel whose history could not be read and was left out of the baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedChannel {
    pub channel_id: String,
    pub name: String,
    pub reason: String,
}

/// Whether reconciliation may join channels it is not yet a member of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Join first, then read history.
    JoinMissing,
    /// Leave membership untouched; non-member channels are skipped.
    ReadOnly,
}

/// What reconciliation found.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub baseline: Option<ActivityState>,
    /// Channels whose history was read.
    pub channels_scanned: usize,
    pub skipped: Vec<SkippedChannel>,
    /// History records returned across all scanned channels.
    pub events_seen: usize,
}

/// Scan every public, non-archived channel for history since `oldest` and seed
/// `tracker` with the most recent qualifying message.
///
/// Join and history failures only exclude the affected channel. The only hard
/// error is failing to list channels at all.
pub async fn reconcile(
    tracker: &mut ActivityTracker,
    directory: &dyn ChannelDirectory,
    history: &dyn HistorySource,
    oldest: DateTime<Utc>,
    join_policy: JoinPolicy,
) -> Result<ReconcileReport, WatchError> {
    let channels = directory.list_public_channels().await?;
    info!(count = channels.len(), oldest = %oldest, "Reconciling from channel history");

    let mut report = ReconcileReport::default();
    let mut events = Vec::new();
    let mut names = Vec::new();

    for channel in channels.iter().filter(|c| !c.is_archived) {
        match read_channel(channel, directory, history, oldest, join_policy).await {
            Ok(batch) => {
                debug!(channel = %channel.name, events = batch.len(), "Channel history read");
                report.channels_scanned += 1;
                report.events_seen += batch.len();
                events.extend(batch);
                names.push((channel.id.as_str(), channel.name.as_str()));
            }
            Err(e) => {
                warn!(channel = %channel.name, error = %e, "Skipping channel during reconciliation");
                EventLogger::log_event(WatchdogEvent::ChannelSkipped {
                    channel_id: channel.id.clone(),
                    reason: e.to_string(),
                });
                report.skipped.push(SkippedChannel {
                    channel_id: channel.id.clone(),
                    name: channel.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    tracker.initialize(&events);
    let channel_name = tracker.state().and_then(|state| {
        names
            .iter()
            .find(|(id, _)| *id == state.channel_id)
            .map(|(_, name)| name.to_string())
    });
    if let Some(name) = channel_name {
        tracker.set_channel_name(&name);
    }
    report.baseline = tracker.state().cloned();

    EventLogger::log_event(WatchdogEvent::Reconciled {
        baseline: report.baseline.as_ref().map(|s| s.timestamp),
        channels_scanned: report.channels_scanned,
        channels_skipped: report.skipped.len(),
    });
    Ok(report)
}

async fn read_channel(
    channel: &ChannelInfo,
    directory: &dyn ChannelDirectory,
    history: &dyn HistorySource,
    oldest: DateTime<Utc>,
    join_policy: JoinPolicy,
) -> Result<Vec<MessageEvent>, WatchError> {
    if !channel.is_member {
        if join_policy == JoinPolicy::ReadOnly {
            return Err(WatchError::History {
                channel_id: channel.id.clone(),
                message: "not a member (read-only scan does not join)".into(),
            });
        }
        info!(channel = %channel.name, "Joining channel to read history");
        directory.join(&channel.id).await?;
    }
    history.fetch_history(&channel.id, oldest).await
}
