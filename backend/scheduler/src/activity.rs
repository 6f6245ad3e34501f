//! Activity tracker: the single "most recent qualifying message" fact.

use idlewatch_core::{ActivityState, MessageEvent};
use tracing::debug;

/// Holds the timestamp of the most recent qualifying message in the workspace.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    state: Option<ActivityState>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the tracker from a historical scan and return the resulting state.
    ///
    /// Join events are ignored. On equal timestamps the event scanned last wins.
    pub fn initialize<'a, I>(&mut self, events: I) -> Option<&ActivityState>
    where
        I: IntoIterator<Item = &'a MessageEvent>,
    {
        self.state = latest_qualifying(events).map(ActivityState::from_event);
        self.state.as_ref()
    }

    /// Record a live event. Returns whether the state changed.
    ///
    /// Live events arrive in order, so a qualifying event always replaces the
    /// current state without comparing timestamps.
    pub fn record(&mut self, event: &MessageEvent) -> bool {
        if !event.is_qualifying() {
            debug!(channel = %event.channel_id, ts = %event.ts, "Ignoring join event");
            return false;
        }
        self.state = Some(ActivityState::from_event(event));
        true
    }

    pub fn state(&self) -> Option<&ActivityState> {
        self.state.as_ref()
    }

    /// Attach a channel name to the current state (used for log output only).
    pub fn set_channel_name(&mut self, name: &str) {
        if let Some(state) = &mut self.state {
            state.channel_name = Some(name.to_string());
        }
    }
}

/// The qualifying event with the greatest timestamp, last one winning ties.
pub fn latest_qualifying<'a, I>(events: I) -> Option<&'a MessageEvent>
where
    I: IntoIterator<Item = &'a MessageEvent>,
{
    events
        .into_iter()
        .filter(|event| event.is_qualifying())
        .fold(None, |best: Option<&MessageEvent>, event| match best {
            Some(current) if current.timestamp > event.timestamp => Some(current),
            _ => Some(event),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use idlewatch_core::MessageSubtype;

    fn msg(channel: &str, ts: &str) -> MessageEvent {
        MessageEvent::new(channel, ts).unwrap()
    }

    fn join(channel: &str, ts: &str) -> MessageEvent {
        msg(channel, ts).with_subtype(MessageSubtype::ChannelJoin)
    }

    #[test]
    fn test_record_is_last_writer_wins() {
        let mut tracker = ActivityTracker::new();
        let events = [
            msg("C1", "1700000300.000000"),
            msg("C2", "1700000100.000000"),
            msg("C3", "1700000200.000000"),
        ];
        for event in &events {
            assert!(tracker.record(event));
            assert_eq!(tracker.state().unwrap().ts, event.ts);
        }
        let state = tracker.state().unwrap();
        assert_eq!(state.channel_id, "C3");
        assert_eq!(state.ts, "1700000200.000000");
    }

    #[test]
    fn test_record_ignores_join() {
        let mut tracker = ActivityTracker::new();
        assert!(!tracker.record(&join("C1", "1700000000.000000")));
        assert!(tracker.state().is_none());

        tracker.record(&msg("C1", "1700000000.000000"));
        let before = tracker.state().cloned();
        assert!(!tracker.record(&join("C2", "1700009999.000000")));
        assert_eq!(tracker.state().cloned(), before);
    }

    #[test]
    fn test_initialize_picks_max_timestamp() {
        let events = vec![
            msg("C1", "1700000100.000000"),
            join("C2", "1700000900.000000"),
            msg("C2", "1700000500.000000"),
            msg("C3", "1700000200.000000"),
        ];
        let mut tracker = ActivityTracker::new();
        let state = tracker.initialize(&events).unwrap();
        assert_eq!(state.channel_id, "C2");
        assert_eq!(state.ts, "1700000500.000000");
    }

    #[test]
    fn test_initialize_is_order_independent_for_distinct_timestamps() {
        let t1 = msg("C1", "1700000100.000000");
        let t2 = msg("C2", "1700000200.000000");

        let mut forward = ActivityTracker::new();
        forward.initialize([&t1, &t2]);
        let mut backward = ActivityTracker::new();
        backward.initialize([&t2, &t1]);

        assert_eq!(forward.state().unwrap().channel_id, "C2");
        assert_eq!(backward.state().unwrap().channel_id, "C2");
    }

    #[test]
    fn test_initialize_ties_go_to_last_scanned() {
        let a = msg("C1", "1700000100.000000");
        let b = msg("C2", "1700000100.000000");

        let mut tracker = ActivityTracker::new();
        tracker.initialize([&a, &b]);
        assert_eq!(tracker.state().unwrap().channel_id, "C2");

        tracker.initialize([&b, &a]);
        assert_eq!(tracker.state().unwrap().channel_id, "C1");
    }

    #[test]
    fn test_initialize_with_only_joins_is_empty() {
        let events = vec![join("C1", "1700000100.000000")];
        let mut tracker = ActivityTracker::new();
        assert!(tracker.initialize(&events).is_none());
        assert!(tracker.initialize(std::iter::empty()).is_none());
    }
}
