//! Countdown synchronizer.
//!
//! The 1 Hz tick is a display convenience. Remaining time is always derived
//! from a wall-clock anchor:
//!
//! ```text
//! remaining = max(0, interval - floor(now - anchor))
//! ```
//!
//! Pausing freezes the elapsed value and drops the anchor; resuming moves the
//! anchor to `now - elapsed`, so pause/resume alone never drifts. Expiry is
//! reported exactly once: the countdown stops itself before returning
//! [`CountdownSync::Expired`], and later syncs see a stopped clock.

use chrono::{DateTime, Duration, Utc};

/// Result of reconciling a countdown with the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownSync {
    Counting { remaining_seconds: u64 },
    /// Paused or already expired.
    Stopped,
    /// Reached zero on this sync.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    interval_seconds: u64,
    /// Running when set: the instant the current interval (virtually) began.
    anchor: Option<DateTime<Utc>>,
    /// Elapsed seconds of the current interval while stopped.
    frozen_elapsed: u64,
    /// Focused seconds from intervals already checked in.
    completed_seconds: u64,
    expired: bool,
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from(to.signed_duration_since(from).num_seconds()).unwrap_or(0)
}

fn seconds(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX))
}

impl Countdown {
    pub fn start(interval_seconds: u64, now: DateTime<Utc>) -> Self {
        Self {
            interval_seconds,
            anchor: Some(now),
            frozen_elapsed: 0,
            completed_seconds: 0,
            expired: false,
        }
    }

    /// Running countdown rebuilt from a session's age alone.
    ///
    /// Whole intervals that fit in `age_seconds` count as already focused;
    /// the remainder is the current interval's progress.
    pub fn recovered(interval_seconds: u64, age_seconds: u64, now: DateTime<Utc>) -> Self {
        let into_interval = if interval_seconds == 0 {
            0
        } else {
            age_seconds % interval_seconds
        };
        Self {
            interval_seconds,
            anchor: Some(now - seconds(into_interval)),
            frozen_elapsed: 0,
            completed_seconds: age_seconds - into_interval,
            expired: false,
        }
    }

    pub fn interval_seconds(&self) -> u64 {
        self.interval_seconds
    }

    pub fn is_running(&self) -> bool {
        self.anchor.is_some()
    }

    /// Elapsed seconds of the current interval, capped at its length.
    pub fn interval_elapsed(&self, now: DateTime<Utc>) -> u64 {
        match self.anchor {
            Some(anchor) => seconds_between(anchor, now).min(self.interval_seconds),
            None => self.frozen_elapsed,
        }
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> u64 {
        if self.expired {
            return 0;
        }
        self.interval_seconds
            .saturating_sub(self.interval_elapsed(now))
    }

    /// Focused seconds across the whole session.
    pub fn session_elapsed(&self, now: DateTime<Utc>) -> u64 {
        self.completed_seconds + self.interval_elapsed(now)
    }

    /// When the running interval reaches zero.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.anchor
            .map(|anchor| anchor + seconds(self.interval_seconds))
    }

    /// Reconciles with the wall clock. Safe to call any number of times.
    pub fn sync(&mut self, now: DateTime<Utc>) -> CountdownSync {
        if self.anchor.is_none() {
            return CountdownSync::Stopped;
        }
        let remaining = self.remaining(now);
        if remaining > 0 {
            return CountdownSync::Counting {
                remaining_seconds: remaining,
            };
        }
        self.expire(now);
        CountdownSync::Expired
    }

    /// Stops the clock at zero, keeping the actual elapsed time.
    pub fn expire(&mut self, now: DateTime<Utc>) {
        if self.anchor.is_some() {
            self.frozen_elapsed = self.interval_elapsed(now);
            self.anchor = None;
        }
        self.expired = true;
    }

    pub fn freeze(&mut self, now: DateTime<Utc>) {
        if self.anchor.is_some() {
            self.frozen_elapsed = self.interval_elapsed(now);
            self.anchor = None;
        }
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.anchor.is_none() && !self.expired {
            self.anchor = Some(now - seconds(self.frozen_elapsed));
        }
    }

    /// Banks the finished interval and starts a fresh one.
    pub fn restart(&mut self, interval_seconds: u64, now: DateTime<Utc>) {
        self.completed_seconds += self.interval_elapsed(now);
        self.interval_seconds = interval_seconds;
        self.frozen_elapsed = 0;
        self.expired = false;
        self.anchor = Some(now);
    }
}
