pub mod activity;
pub mod idle_timer;
pub mod reconcile;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod test_support;

pub use activity::{latest_qualifying, ActivityTracker};
pub use idle_timer::{ArmOutcome, IdleTimer, Notification};
pub use reconcile::{reconcile, JoinPolicy, ReconcileReport, SkippedChannel};
pub use watchdog::{
    Inspection, Watchdog, WatchdogConfig, WatchdogState, DEFAULT_IDLE_THRESHOLD_SECS,
    MAX_IDLE_THRESHOLD_SECS,
};
