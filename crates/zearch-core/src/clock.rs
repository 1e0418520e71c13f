//! Time source abstraction
//!
//! Timestamps in the settings object are milliseconds since the Unix epoch,
//! matching what the extension stores. Consumers take a [`Clock`] so the
//! wasm bindings can plug in the JS clock and tests can run deterministically.

use std::time::{SystemTime, UNIX_EPOCH};

/// Millisecond-resolution wall clock.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests and deterministic drivers.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: std::cell::Cell<u64>,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: std::cell::Cell::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.set(now);
    }

    pub fn advance(&self, delta: u64) {
        self.now.set(self.now.get() + delta);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// UTC midnight preceding `now_ms`, for "today" statistics windows.
pub fn day_start_utc(now_ms: u64) -> u64 {
    const DAY_MS: u64 = 24 * 60 * 60 * 1000;
    now_ms - now_ms % DAY_MS
}
