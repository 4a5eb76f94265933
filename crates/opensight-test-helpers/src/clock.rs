//! Virtual time for deterministic protocol tests.

use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

use serial_lightgun_protocol::Clock;

/// A [`Clock`] that never actually sleeps: `sleep` advances a virtual
/// instant and records the requested duration, so tests can assert on the
/// timing a sequence would have taken.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<Instant>,
    slept: RefCell<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Cell::new(Instant::now()),
            slept: RefCell::new(Vec::new()),
        }
    }

    /// Total virtual time spent sleeping.
    pub fn total_slept(&self) -> Duration {
        self.slept.borrow().iter().sum()
    }

    /// Every sleep requested, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.borrow().clone()
    }
}

impl Clock for ManualClock {
    fn sleep(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
        self.slept.borrow_mut().push(duration);
    }

    fn now(&self) -> Instant {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_advances_virtual_time() {
        let clock = ManualClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_millis(150));
        assert_eq!(clock.now() - before, Duration::from_millis(150));
        assert_eq!(clock.total_slept(), Duration::from_millis(150));
    }
}
