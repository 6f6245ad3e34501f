//! Idle timer: owns the single pending "notify at deadline" action.
//!
//! The deferred fire is a sleeper task that posts [`Message::IdleDeadline`]
//! into the watchdog inbox, so it is handled on the same event loop as live
//! messages. Every armed timer gets a fresh generation; cancelling aborts the
//! sleeper, and a deadline message carrying any generation other than the
//! pending one is ignored. The timer only holds a weak handle to the inbox, so
//! it never keeps the event loop alive on its own.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use idlewatch_core::{Message, Notifier};
use idlewatch_logging::{EventLogger, WatchdogEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Who gets notified and with what text.
#[derive(Debug, Clone)]
pub struct Notification {
    pub target: String,
    pub text: String,
}

/// Result of arming the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// A deferred fire is pending.
    Scheduled {
        generation: u64,
        deadline: DateTime<Utc>,
    },
    /// The deadline had already passed; the notifier was invoked right away.
    Notified { delivered: bool },
}

struct PendingTimer {
    generation: u64,
    deadline: DateTime<Utc>,
    task: JoinHandle<()>,
}

pub struct IdleTimer {
    notifier: Arc<dyn Notifier>,
    notification: Notification,
    inbox: mpsc::WeakSender<Message>,
    pending: Option<PendingTimer>,
    last_generation: u64,
}

impl IdleTimer {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        notification: Notification,
        inbox: mpsc::WeakSender<Message>,
    ) -> Self {
        Self {
            notifier,
            notification,
            inbox,
            pending: None,
            last_generation: 0,
        }
    }

    /// Arm the timer for `baseline + idle_threshold`.
    ///
    /// Any pending timer is cancelled first. A missing baseline means no
    /// activity is known at all and is treated as already stale. A deadline
    /// past the representable range is clamped to the far future.
    pub async fn arm(
        &mut self,
        baseline: Option<DateTime<Utc>>,
        idle_threshold: TimeDelta,
        now: DateTime<Utc>,
    ) -> ArmOutcome {
        self.cancel_pending();

        let deadline = baseline.map(|baseline| {
            baseline
                .checked_add_signed(idle_threshold)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        let deadline = match deadline {
            Some(deadline) if deadline > now => deadline,
            _ => {
                info!(?baseline, "Idle deadline already passed, notifying now");
                let delivered = self.notify().await;
                return ArmOutcome::Notified { delivered };
            }
        };

        let delay = (deadline - now).to_std().unwrap_or(Duration::ZERO);
        self.last_generation += 1;
        let generation = self.last_generation;
        let inbox = self.inbox.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let delivered = match inbox.upgrade() {
                Some(tx) => tx.send(Message::IdleDeadline { generation }).await.is_ok(),
                None => false,
            };
            if !delivered {
                debug!(generation, "Watchdog inbox closed before idle deadline");
            }
        });

        self.pending = Some(PendingTimer {
            generation,
            deadline,
            task,
        });
        EventLogger::log_event(WatchdogEvent::TimerArmed {
            generation,
            deadline,
        });
        ArmOutcome::Scheduled {
            generation,
            deadline,
        }
    }

    /// Re-arm after fresh activity at `now`.
    pub async fn reset(&mut self, now: DateTime<Utc>, idle_threshold: TimeDelta) -> ArmOutcome {
        self.arm(Some(now), idle_threshold, now).await
    }

    /// Cancel the pending timer, if any. Returns whether one was cancelled.
    pub fn cancel_pending(&mut self) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        pending.task.abort();
        EventLogger::log_event(WatchdogEvent::TimerCancelled {
            generation: pending.generation,
        });
        true
    }

    /// Handle a deadline message. Fires the notifier only if `generation` is
    /// the pending one; returns whether it fired.
    pub async fn on_deadline(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.generation == generation => {}
            _ => {
                debug!(generation, "Ignoring stale idle deadline");
                return false;
            }
        }
        self.pending = None;
        info!(generation, "Idle deadline elapsed without activity");
        self.notify().await;
        true
    }

    pub fn pending_deadline(&self) -> Option<DateTime<Utc>> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    pub fn pending_generation(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.generation)
    }

    /// One delivery attempt. Failures are logged and not retried.
    async fn notify(&self) -> bool {
        let target = &self.notification.target;
        match self.notifier.send(target, &self.notification.text).await {
            Ok(()) => {
                EventLogger::log_event(WatchdogEvent::Notified {
                    target: target.clone(),
                });
                true
            }
            Err(e) => {
                error!(error = %e, target = %target, "Idle notification failed");
                EventLogger::log_event(WatchdogEvent::NotifyFailed {
                    target: target.clone(),
                    error: e.to_string(),
                });
                false
            }
        }
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }
    }
}
