use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use idlewatch_core::{ChannelDirectory, Clock, Component, HistorySource, Message, Notifier, WatchError};

use crate::activity::ActivityTracker;
use crate::idle_timer::{ArmOutcome, IdleTimer, Notification};
use crate::reconcile::{reconcile, JoinPolicy, ReconcileReport};

/// Default idle threshold: 24 hours.
pub const DEFAULT_IDLE_THRESHOLD_SECS: i64 = 60 * 60 * 24;

/// Largest accepted idle threshold: 365 days.
pub const MAX_IDLE_THRESHOLD_SECS: i64 = DEFAULT_IDLE_THRESHOLD_SECS * 365;

#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub idle_threshold: TimeDelta,
    pub notification: Notification,
}

/// Mutable state owned by the running event loop.
pub struct WatchdogState {
    pub tracker: ActivityTracker,
    pub timer: IdleTimer,
}

/// Result of a dry-run reconciliation.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub report: ReconcileReport,
    pub now: DateTime<Utc>,
    /// `None` when no activity was found at all.
    pub deadline: Option<DateTime<Utc>>,
    pub overdue: bool,
}

/// The idle-activity watchdog.
///
/// Reconciles from history on start, then consumes its inbox one message at
/// a time: live events re-arm the idle timer, deadline messages fire it.
pub struct Watchdog {
    directory: Arc<dyn ChannelDirectory>,
    history: Arc<dyn HistorySource>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: WatchdogConfig,
    inbox: mpsc::WeakSender<Message>,
}

impl Watchdog {
    pub fn new(
        directory: Arc<dyn ChannelDirectory>,
        history: Arc<dyn HistorySource>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: WatchdogConfig,
        inbox_tx: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            directory,
            history,
            notifier,
            clock,
            config,
            inbox: inbox_tx.downgrade(),
        }
    }

    pub fn new_state(&self) -> WatchdogState {
        WatchdogState {
            tracker: ActivityTracker::new(),
            timer: IdleTimer::new(
                Arc::clone(&self.notifier),
                self.config.notification.clone(),
                self.inbox.clone(),
            ),
        }
    }

    /// Seed the tracker from history and arm the timer.
    ///
    /// If channels cannot be listed at all, the timer is armed from the
    /// current time instead of treating the workspace as silent.
    pub async fn startup(&self, state: &mut WatchdogState) -> Option<ReconcileReport> {
        let threshold = self.config.idle_threshold;
        let oldest = look_back_start(self.clock.now(), threshold);

        match reconcile(
            &mut state.tracker,
            self.directory.as_ref(),
            self.history.as_ref(),
            oldest,
            JoinPolicy::JoinMissing,
        )
        .await
        {
            Ok(report) => {
                match &report.baseline {
                    Some(last) => info!(last = %last, "Last message found"),
                    None => info!("No qualifying message within the look-back window"),
                }
                let baseline = report.baseline.as_ref().map(|s| s.timestamp);
                let outcome = state.timer.arm(baseline, threshold, self.clock.now()).await;
                log_outcome(&outcome);
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "Channel listing failed, arming from now");
                let now = self.clock.now();
                let outcome = state.timer.arm(Some(now), threshold, now).await;
                log_outcome(&outcome);
                None
            }
        }
    }

    /// Process one inbox message.
    pub async fn handle(&self, state: &mut WatchdogState, msg: Message) {
        match msg {
            Message::Live(event) => {
                if state.tracker.record(&event) {
                    debug!(channel = %event.channel_id, ts = %event.ts, "Activity recorded");
                    state
                        .timer
                        .reset(self.clock.now(), self.config.idle_threshold)
                        .await;
                }
            }
            Message::IdleDeadline { generation } => {
                state.timer.on_deadline(generation).await;
            }
        }
    }

    /// Reconcile without arming anything, notifying anyone, or joining
    /// channels. Channels the bot is not a member of are reported as skipped.
    pub async fn inspect(&self) -> Result<Inspection, WatchError> {
        let now = self.clock.now();
        let threshold = self.config.idle_threshold;
        let mut tracker = ActivityTracker::new();
        let report = reconcile(
            &mut tracker,
            self.directory.as_ref(),
            self.history.as_ref(),
            look_back_start(now, threshold),
            JoinPolicy::ReadOnly,
        )
        .await?;
        let deadline = report.baseline.as_ref().map(|s| {
            s.timestamp
                .checked_add_signed(threshold)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        let overdue = deadline.map_or(true, |d| d <= now);
        Ok(Inspection {
            report,
            now,
            deadline,
            overdue,
        })
    }
}

/// Start of the history window, clamped to the earliest representable time.
fn look_back_start(now: DateTime<Utc>, threshold: TimeDelta) -> DateTime<Utc> {
    now.checked_sub_signed(threshold)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn log_outcome(outcome: &ArmOutcome) {
    match outcome {
        ArmOutcome::Scheduled { deadline, .. } => {
            info!(deadline = %deadline, "Idle notification scheduled")
        }
        ArmOutcome::Notified { delivered } => {
            info!(delivered, "Workspace already idle at startup")
        }
    }
}

#[async_trait]
impl Component for Watchdog {
    fn name(&self) -> &str {
        "watchdog"
    }

    async fn start(&self, mut rx: mpsc::Receiver<Message>) -> Result<()> {
        let mut state = self.new_state();

        // Live events queue up in `rx` until the baseline exists.
        self.startup(&mut state).await;
        info!(
            threshold_secs = self.config.idle_threshold.num_seconds(),
            "Watchdog started"
        );

        while let Some(msg) = rx.recv().await {
            self.handle(&mut state, msg).await;
        }

        info!("Watchdog inbox closed, shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{channel, msg, wall, FakeWorkspace, RecordingNotifier, TokioClock};
    use idlewatch_core::MessageSubtype;
    use std::time::Duration;

    const START: i64 = 1_000_000;
    const HOUR: u64 = 3600;

    struct Harness {
        tx: mpsc::Sender<Message>,
        notifier: Arc<RecordingNotifier>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn spawn(ws: FakeWorkspace, pre_queued: Vec<Message>) -> Harness {
        spawn_with_threshold(
            ws,
            pre_queued,
            TimeDelta::seconds(DEFAULT_IDLE_THRESHOLD_SECS),
        )
    }

    fn spawn_with_threshold(
        ws: FakeWorkspace,
        pre_queued: Vec<Message>,
        idle_threshold: TimeDelta,
    ) -> Harness {
        let ws = Arc::new(ws);
        let notifier = RecordingNotifier::new();
        let (tx, rx) = mpsc::channel(64);
        for m in pre_queued {
            tx.try_send(m).unwrap();
        }
        let watchdog = Watchdog::new(
            ws.clone(),
            ws,
            notifier.clone(),
            TokioClock::starting_at(wall(START)),
            WatchdogConfig {
                idle_threshold,
                notification: Notification {
                    target: "U_ADMIN".into(),
                    text: "No message was sent in the last 24 hours.".into(),
                },
            },
            tx.clone(),
        );
        let handle = tokio::spawn(async move {
            watchdog.start(rx).await.unwrap();
        });
        Harness {
            tx,
            notifier,
            handle,
        }
    }

    async fn sleep_secs(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    fn general() -> Vec<idlewatch_core::ChannelInfo> {
        vec![channel("C1", "general", true)]
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_workspace_notifies_at_startup() {
        let h = spawn(FakeWorkspace::new(general()), vec![]);

        sleep_secs(1).await;
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "U_ADMIN");

        // No timer remains, so nothing else fires later.
        sleep_secs(48 * HOUR).await;
        assert_eq!(h.notifier.sent().len(), 1);
        h.handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_activity_defers_notification() {
        let ws = FakeWorkspace::new(general())
            .with_history("C1", vec![msg("C1", START - 23 * 3600)]);
        let h = spawn(ws, vec![]);

        sleep_secs(HOUR - 60).await;
        assert!(h.notifier.sent().is_empty());

        sleep_secs(120).await;
        assert_eq!(h.notifier.sent().len(), 1);
        h.handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_event_replaces_pending_deadline() {
        // Deadline 30 minutes after start.
        let ws = FakeWorkspace::new(general())
            .with_history("C1", vec![msg("C1", START - 23 * 3600 - 1800)]);
        let h = spawn(ws, vec![]);

        sleep_secs(1).await;
        h.tx.send(Message::Live(msg("C2", START + 1))).await.unwrap();

        sleep_secs(31 * 60).await;
        assert!(h.notifier.sent().is_empty(), "old deadline must not fire");

        // New deadline is 24h after the live event (t = 1s).
        sleep_secs(24 * HOUR - 31 * 60 - 10).await;
        assert!(h.notifier.sent().is_empty());
        sleep_secs(20).await;
        assert_eq!(h.notifier.sent().len(), 1);

        sleep_secs(48 * HOUR).await;
        assert_eq!(h.notifier.sent().len(), 1);
        h.handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_event_does_not_reschedule() {
        let ws = FakeWorkspace::new(general())
            .with_history("C1", vec![msg("C1", START - 23 * 3600)]);
        let h = spawn(ws, vec![]);

        sleep_secs(60).await;
        let join = msg("C1", START + 60).with_subtype(MessageSubtype::ChannelJoin);
        h.tx.send(Message::Live(join)).await.unwrap();

        sleep_secs(HOUR).await;
        assert_eq!(h.notifier.sent().len(), 1);
        h.handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_queued_during_reconciliation_are_not_lost() {
        // History alone would fire one hour in; the queued live event must
        // push the deadline out to 24h.
        let ws = FakeWorkspace::new(general())
            .with_history("C1", vec![msg("C1", START - 23 * 3600)]);
        let h = spawn(ws, vec![Message::Live(msg("C1", START))]);

        sleep_secs(2 * HOUR).await;
        assert!(h.notifier.sent().is_empty());

        sleep_secs(22 * HOUR + 60).await;
        assert_eq!(h.notifier.sent().len(), 1);
        h.handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_directory_outage_arms_from_now() {
        let h = spawn(FakeWorkspace::new(vec![]).failing_directory(), vec![]);

        sleep_secs(23 * HOUR).await;
        assert!(h.notifier.sent().is_empty());

        sleep_secs(HOUR + 1).await;
        assert_eq!(h.notifier.sent().len(), 1);
        h.handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbox_close_stops_watchdog_with_timer_pending() {
        let ws = FakeWorkspace::new(general())
            .with_history("C1", vec![msg("C1", START - 3600)]);
        let h = spawn(ws, vec![]);

        sleep_secs(1).await;
        drop(h.tx);
        sleep_secs(1).await;
        assert!(h.handle.is_finished());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_history_timestamp_does_not_crash_startup() {
        // A source that does not validate timestamps hands over a record at
        // the edge of the calendar.
        let mut far = msg("C1", START);
        far.timestamp = DateTime::<Utc>::MAX_UTC - TimeDelta::seconds(1);
        let ws = FakeWorkspace::new(general())
            .with_history("C1", vec![msg("C1", START - 1_000), far]);
        let h = spawn(ws, vec![]);

        sleep_secs(48 * HOUR).await;
        assert!(!h.handle.is_finished(), "watchdog must keep running");
        assert!(h.notifier.sent().is_empty());

        // Live activity still re-arms normally.
        h.tx.send(Message::Live(msg("C1", START + 48 * 3600)))
            .await
            .unwrap();
        sleep_secs(24 * HOUR + 60).await;
        assert_eq!(h.notifier.sent().len(), 1);
        h.handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_threshold_does_not_crash_startup() {
        let ws = FakeWorkspace::new(general())
            .with_history("C1", vec![msg("C1", START - 3600)]);
        let h = spawn_with_threshold(ws, vec![], TimeDelta::seconds(9_000_000_000_000));

        sleep_secs(HOUR).await;
        assert!(!h.handle.is_finished(), "watchdog must keep running");
        assert!(h.notifier.sent().is_empty());
        h.handle.abort();
    }

    #[tokio::test]
    async fn test_inspect_does_not_join_channels() {
        let ws = Arc::new(
            FakeWorkspace::new(vec![
                channel("C1", "general", true),
                channel("C2", "lurk", false),
            ])
            .with_history("C1", vec![msg("C1", START - 3600)]),
        );
        let (tx, _rx) = mpsc::channel(4);
        let watchdog = Watchdog::new(
            ws.clone(),
            ws.clone(),
            RecordingNotifier::new(),
            TokioClock::starting_at(wall(START)),
            WatchdogConfig {
                idle_threshold: TimeDelta::hours(24),
                notification: Notification {
                    target: "U_ADMIN".into(),
                    text: "quiet".into(),
                },
            },
            tx,
        );

        let inspection = watchdog.inspect().await.unwrap();

        assert!(ws.joined().is_empty());
        assert_eq!(inspection.report.skipped.len(), 1);
        assert_eq!(inspection.report.skipped[0].channel_id, "C2");
    }

    #[tokio::test]
    async fn test_inspect_reports_deadline_without_notifying() {
        let ws = Arc::new(
            FakeWorkspace::new(general())
                .with_history("C1", vec![msg("C1", START - 2 * 3600)]),
        );
        let notifier = RecordingNotifier::new();
        let (tx, _rx) = mpsc::channel(4);
        let watchdog = Watchdog::new(
            ws.clone(),
            ws,
            notifier.clone(),
            TokioClock::starting_at(wall(START)),
            WatchdogConfig {
                idle_threshold: TimeDelta::hours(24),
                notification: Notification {
                    target: "U_ADMIN".into(),
                    text: "quiet".into(),
                },
            },
            tx,
        );

        let inspection = watchdog.inspect().await.unwrap();

        assert_eq!(
            inspection.deadline,
            Some(wall(START - 2 * 3600) + TimeDelta::hours(24))
        );
        assert!(!inspection.overdue);
        assert!(notifier.sent().is_empty());
    }
}
