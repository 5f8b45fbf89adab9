use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Minimum-interval gate: at most one accepted event per `interval`.
///
/// A permit reserves the slot immediately so concurrent callers cannot both
/// pass. The slot only sticks once the permit is committed; dropping an
/// uncommitted permit restores the previous timestamp.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn is_open(&self, last: Option<Instant>, now: Instant) -> bool {
        match last {
            Some(at) => now.duration_since(at) >= self.interval,
            None => true,
        }
    }

    pub fn ready(&self) -> bool {
        self.is_open(*self.last.lock(), Instant::now())
    }

    pub fn try_acquire(&self) -> Option<ThrottlePermit<'_>> {
        let now = Instant::now();
        let mut last = self.last.lock();
        if !self.is_open(*last, now) {
            return None;
        }
        let previous = last.replace(now);
        Some(ThrottlePermit {
            throttle: self,
            previous,
            committed: false,
        })
    }

    pub fn reset(&self) {
        *self.last.lock() = None;
    }
}

#[must_use]
pub struct ThrottlePermit<'a> {
    throttle: &'a Throttle,
    previous: Option<Instant>,
    committed: bool,
}

impl ThrottlePermit<'_> {
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for ThrottlePermit<'_> {
    fn drop(&mut self) {
        if !self.committed {
            *self.throttle.last.lock() = self.previous;
        }
    }
}
