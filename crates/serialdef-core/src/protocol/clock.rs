//! Time source
//!
//! All timing in the engine (minimum interval guard, answer deadlines, busy
//! window) goes through a [`Clock`] so it can be driven manually in tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic time source with a blocking sleep
pub trait Clock: Send {
    /// Current instant
    fn now(&self) -> Instant;

    /// Block for `duration` (or pretend to)
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time via [`Instant`] and [`std::thread::sleep`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually advanced clock.
///
/// Clones share the same simulated time, so a test can keep one handle while
/// the engine owns another. `sleep` advances simulated time instantly.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Start at zero elapsed time
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move simulated time forward
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        *elapsed += by;
    }

    /// Simulated time since the clock was created
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let t0 = clock.now();

        handle.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - t0, Duration::from_millis(250));

        clock.sleep(Duration::from_millis(50));
        assert_eq!(handle.elapsed(), Duration::from_millis(300));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
