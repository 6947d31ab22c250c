//! Time sources
//!
//! Every timestamp in the store is an integer millisecond value taken from a
//! [`Clock`]. The production clock anchors to the wall clock once and then
//! advances with [`Instant`], so it never goes backwards even if the system
//! time is adjusted mid-run.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic millisecond clock with an attached sleep
pub trait Clock: Send + Sync {
    /// Current time in milliseconds (monotonic, non-decreasing)
    fn now_ms(&self) -> i64;

    /// Suspend the caller for `ms` milliseconds
    fn sleep_ms(&self, ms: u64);
}

// ============================================================================
// MONOTONIC CLOCK
// ============================================================================

/// Wall-clock anchored monotonic clock
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    anchor_ms: i64,
    started: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    /// Anchor a new clock at the current wall-clock time
    pub fn new() -> Self {
        let anchor_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self {
            anchor_ms,
            started: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        self.anchor_ms + self.started.elapsed().as_millis() as i64
    }

    fn sleep_ms(&self, ms: u64) {
        if ms > 0 {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }
}

// ============================================================================
// MANUAL CLOCK
// ============================================================================

/// Hand-driven clock for tests and replays
///
/// `sleep_ms` advances the clock instead of blocking, so loops that wait on
/// time terminate deterministically.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock reading `start_ms`
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    /// Jump to an absolute time. Earlier values are ignored.
    pub fn set(&self, ms: i64) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }

    /// Move forward by `ms`
    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms.max(0), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep_ms(&self, ms: u64) {
        self.advance(ms as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_never_decreases() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000, "anchored to the epoch");
    }

    #[test]
    fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new(0);
        clock.sleep_ms(250);
        assert_eq!(clock.now_ms(), 250);
        clock.set(1_001);
        assert_eq!(clock.now_ms(), 1_001);
        clock.set(10);
        assert_eq!(clock.now_ms(), 1_001, "set never moves backwards");
    }
}
