//! Wall-clock tick source for client timeouts.
//!
//! Ticks are aligned to interval boundaries of Unix time (whole minutes by
//! default), not to the moment the server started.

use chrono::Utc;
use std::time::Duration;

/// Current Unix time in whole seconds.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Fires once each time wall time crosses into a new interval boundary.
#[derive(Debug, Clone)]
pub struct TimeoutClock {
    interval: i64,
    /// Start of the interval that was last serviced.
    boundary: i64,
}

impl TimeoutClock {
    /// Create a clock whose first tick fires at the next boundary after `now`.
    ///
    /// # Panics
    /// Panics if `interval` is shorter than one second.
    pub fn new(interval: Duration, now: i64) -> Self {
        let interval = interval.as_secs() as i64;
        assert!(interval > 0, "tick interval must be at least one second");
        Self {
            interval,
            boundary: align(now, interval),
        }
    }

    /// Check the clock. Returns `true` if a new boundary has been crossed
    /// since the last tick.
    ///
    /// Several elapsed intervals still produce a single tick.
    pub fn poll(&mut self, now: i64) -> bool {
        if now - self.boundary >= self.interval {
            self.boundary = align(now, self.interval);
            true
        } else {
            false
        }
    }

    /// Start of the last serviced interval.
    pub fn boundary(&self) -> i64 {
        self.boundary
    }
}

fn align(t: i64, interval: i64) -> i64 {
    t - t.rem_euclid(interval)
}
