//! Rate-limiting primitives for debounced and throttled backend writes.
//!
//! The web-facing parts of the product bound their write volume with two
//! small mechanisms: a minimum interval between writes ([`WriteGate`]) and
//! a delay between the triggering event and the write ([`Debouncer`]).
//! Both are plain state machines over passed-in `DateTime` values, so tests
//! drive them with a [`ManualClock`](ranktrack_shared::time::ManualClock)
//! instead of sleeping.

use chrono::{DateTime, Duration, Utc};

/// Allows at most one acquisition per `min_interval`.
#[derive(Debug, Clone)]
pub struct WriteGate {
    min_interval: Duration,
    last: Option<DateTime<Utc>>,
}

impl WriteGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// True iff enough time has passed since the last successful
    /// acquisition; records `now` when it is.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> bool {
        match self.last {
            Some(last) if now - last < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Forget the last acquisition, so the next attempt passes.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// A deadline armed by an event and fired by a later poll.
///
/// Arming while already armed is a no-op: the deadline counts from the
/// *first* triggering event, not the latest.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<DateTime<Utc>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn arm(&mut self, now: DateTime<Utc>) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.delay);
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// True iff the deadline has passed; disarms when it has.
    pub fn fire_due(&mut self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
