//! Time source abstraction
//!
//! Staleness checks and reconnect/retry delays go through a [`Clock`] so tests
//! can drive time by hand instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Provides timestamps and suspension for the synchronizer and fusion engine
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic nanosecond timestamp
    fn now_ns(&self) -> u64;

    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Production clock: monotonic, anchored to the Unix epoch at construction
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    origin_unix_ns: u64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        let origin_unix_ns = chrono::Utc::now()
            .timestamp_nanos_opt()
            .map(|ns| ns.max(0) as u64)
            .unwrap_or(0);
        Self {
            origin: Instant::now(),
            origin_unix_ns,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        self.origin_unix_ns + self.origin.elapsed().as_nanos() as u64
    }
}

/// Hand-driven clock. `sleep` advances the clock instead of waiting.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ns: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ns),
        }
    }

    pub fn set(&self, ns: u64) {
        self.now.store(ns, Ordering::SeqCst);
    }

    pub fn advance(&self, duration: Duration) {
        self.now
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000_000_000);
    }

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_time() {
        let clock = ManualClock::new(1_000);
        clock.sleep(Duration::from_millis(500)).await;
        assert_eq!(clock.now_ns(), 1_000 + 500_000_000);
        clock.set(42);
        assert_eq!(clock.now_ns(), 42);
    }

    #[test]
    fn test_manual_sleep_yields_once() {
        use tokio_test::{assert_pending, assert_ready, task};

        let clock = ManualClock::new(0);
        let mut sleep = task::spawn(clock.sleep(Duration::from_secs(1)));
        assert_pending!(sleep.poll());
        assert_eq!(clock.now_ns(), 1_000_000_000);
        assert!(sleep.is_woken());
        assert_ready!(sleep.poll());
    }
}
