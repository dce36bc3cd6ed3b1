// Sliding-window spam tracking, keyed by user.
//
// The tracker owns all per-user ephemeral state: the timestamp window and
// the running trip count. Entries are created on a user's first tracked
// message, cleared on ban or unban, and evictable once idle for longer
// than the window. Losing this state on restart only resets rate
// tracking; the durable counters live in the violation store.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Result of recording one message against a user's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpamCheck {
    /// Whether this message tipped the window over the threshold.
    pub tripped: bool,
    /// Messages already inside the window when this one arrived.
    pub count_in_window: u32,
    /// Running number of spam trips for this user, post-increment.
    /// Only meaningful when `tripped` is true.
    pub trip_count: u32,
}

pub struct SpamTracker {
    threshold: u32,
    window: Duration,
    /// user_id -> timestamps of recent messages, oldest first.
    windows: DashMap<u64, Vec<DateTime<Utc>>>,
    /// user_id -> how many times this user has tripped detection.
    trip_counts: DashMap<u64, u32>,
}

impl SpamTracker {
    pub fn new(threshold: u32, window_ms: u64) -> Self {
        Self {
            threshold,
            window: Duration::milliseconds(window_ms as i64),
            windows: DashMap::new(),
            trip_counts: DashMap::new(),
        }
    }

    /// Record a message at `now` and report whether it tripped detection.
    ///
    /// The window is pruned first, and the count compared against the
    /// threshold excludes the new message - the threshold-plus-oneth
    /// message inside the window is the one that trips. A trip empties
    /// the window, so the next message starts a fresh burst instead of
    /// re-tripping immediately.
    ///
    /// The per-user dashmap entry is held for the whole update, so two
    /// concurrent messages from the same user cannot lose timestamps.
    pub fn record_and_check(&self, user_id: u64, now: DateTime<Utc>) -> SpamCheck {
        let cutoff = now - self.window;
        let mut window = self.windows.entry(user_id).or_default();
        window.retain(|stamp| *stamp > cutoff);

        let count_in_window = window.len() as u32;
        if count_in_window >= self.threshold {
            window.clear();
            drop(window);
            let trip_count = {
                let mut trips = self.trip_counts.entry(user_id).or_insert(0);
                *trips += 1;
                *trips
            };
            return SpamCheck {
                tripped: true,
                count_in_window,
                trip_count,
            };
        }

        window.push(now);
        SpamCheck {
            tripped: false,
            count_in_window,
            trip_count: 0,
        }
    }

    /// Drop all tracked state for a user. Both the ban path and an
    /// administrative unban land here.
    pub fn clear_user(&self, user_id: u64) {
        self.windows.remove(&user_id);
        self.trip_counts.remove(&user_id);
    }

    /// Evict windows whose newest entry has aged past the window length.
    /// Returns how many users were evicted.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let before = self.windows.len();
        self.windows
            .retain(|_, stamps| stamps.last().is_some_and(|stamp| *stamp > cutoff));
        before - self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: u64 = 42;

    fn at(base: DateTime<Utc>, offset_ms: i64) -> DateTime<Utc> {
        base + Duration::milliseconds(offset_ms)
    }

    fn base() -> DateTime<Utc> {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn burst_below_threshold_never_trips() {
        let tracker = SpamTracker::new(5, 10_000);
        let start = base();
        for i in 0..5 {
            let check = tracker.record_and_check(USER, at(start, i * 1_000));
            assert!(!check.tripped, "message {i} should not trip");
        }
    }

    #[test]
    fn message_after_full_window_trips_with_pre_append_count() {
        let tracker = SpamTracker::new(5, 10_000);
        let start = base();
        for i in 0..5 {
            tracker.record_and_check(USER, at(start, i * 1_000));
        }

        let check = tracker.record_and_check(USER, at(start, 5_500));
        assert!(check.tripped);
        assert_eq!(check.count_in_window, 5);
        assert_eq!(check.trip_count, 1);
    }

    #[test]
    fn window_resets_after_a_trip() {
        let tracker = SpamTracker::new(5, 10_000);
        let start = base();
        for i in 0..6 {
            tracker.record_and_check(USER, at(start, i * 1_000));
        }

        // The very next message lands in an empty window and cannot
        // re-trip until a fresh burst accumulates.
        let check = tracker.record_and_check(USER, at(start, 6_200));
        assert!(!check.tripped);
        assert_eq!(check.count_in_window, 0);
    }

    #[test]
    fn old_timestamps_fall_out_of_the_window() {
        let tracker = SpamTracker::new(3, 10_000);
        let start = base();
        tracker.record_and_check(USER, at(start, 0));
        tracker.record_and_check(USER, at(start, 1_000));
        tracker.record_and_check(USER, at(start, 2_000));

        // 12s later only the messages within the trailing window count.
        let check = tracker.record_and_check(USER, at(start, 12_500));
        assert!(!check.tripped);
        assert_eq!(check.count_in_window, 1);
    }

    #[test]
    fn trip_count_accumulates_across_bursts() {
        let tracker = SpamTracker::new(2, 10_000);
        let start = base();

        let mut t = 0;
        let mut trips = Vec::new();
        for _ in 0..3 {
            loop {
                let check = tracker.record_and_check(USER, at(start, t));
                t += 100;
                if check.tripped {
                    trips.push(check.trip_count);
                    break;
                }
            }
        }
        assert_eq!(trips, vec![1, 2, 3]);
    }

    #[test]
    fn clear_user_forgets_windows_and_trip_counts() {
        let tracker = SpamTracker::new(2, 10_000);
        let start = base();
        for i in 0..3 {
            tracker.record_and_check(USER, at(start, i * 100));
        }
        tracker.clear_user(USER);

        let check = tracker.record_and_check(USER, at(start, 1_000));
        assert_eq!(check.count_in_window, 0);

        tracker.record_and_check(USER, at(start, 1_100));
        let check = tracker.record_and_check(USER, at(start, 1_200));
        // Trip counting starts over after a clear.
        assert!(check.tripped);
        assert_eq!(check.trip_count, 1);
    }

    #[test]
    fn idle_windows_are_evicted() {
        let tracker = SpamTracker::new(5, 10_000);
        let start = base();
        tracker.record_and_check(USER, start);
        tracker.record_and_check(7, at(start, 9_000));

        let evicted = tracker.evict_idle(at(start, 15_000));
        assert_eq!(evicted, 1);

        // The evicted user simply starts a fresh window.
        let check = tracker.record_and_check(USER, at(start, 15_100));
        assert_eq!(check.count_in_window, 0);
    }
}
