//! Wall-clock capability for timing-dependent components
//!
//! Clock correction, eviction, delayed playback and timed replay all read
//! "now" and sleep through this trait so tests and offline replays can drive
//! time explicitly.

use parking_lot::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in seconds since the Unix epoch
#[async_trait::async_trait]
pub trait Clock: Send + Sync + 'static {
    /// Current time in seconds since the Unix epoch
    fn now(&self) -> f64;

    /// Suspend the calling task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Real wall clock backed by `SystemTime` and tokio timers
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually driven clock
///
/// `sleep` advances virtual time by the requested duration and yields to the
/// scheduler instead of waiting, so loops built on it run as fast as the
/// runtime allows while observing consistent timestamps.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    /// Create a clock starting at `start` seconds
    pub fn new(start: f64) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// Jump to an absolute time
    pub fn set(&self, now: f64) {
        *self.now.lock() = now;
    }

    /// Move time forward by `seconds`
    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }
}

#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration.as_secs_f64());
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now() > 1_577_836_800.0);
    }

    #[test]
    fn manual_clock_set_and_advance() {
        let clock = ManualClock::new(100.0);
        assert_eq!(clock.now(), 100.0);
        clock.advance(2.5);
        assert_eq!(clock.now(), 102.5);
        clock.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }

    #[tokio::test]
    async fn manual_clock_sleep_advances_virtual_time() {
        let clock = ManualClock::new(0.0);
        clock.sleep(Duration::from_millis(1500)).await;
        assert!((clock.now() - 1.5).abs() < 1e-9);
    }
}
