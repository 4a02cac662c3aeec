// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.
//!
//! Beyond the coarse `epoch_ms` the daemon's own bookkeeping uses, the
//! recorder needs nanosecond-resolution monotonic and wall-clock readings
//! (spec.md §6's `Clock` capability: `now_monotonic_ns`/`now_unix_ns`) to
//! mint strictly-increasing [`crate::id::IdBuf`]-adjacent `RecordKey`s and
//! to pace replay. Both are exposed on the same trait so a `FakeClock` can
//! drive both the scheduler-facing `epoch_ms` call sites and the
//! recorder's nanosecond ones from one controllable source of time.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time.
pub trait Clock: Clone + Send + Sync {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;

    /// Monotonic nanoseconds, not tied to wall-clock epoch. Used for
    /// pacing (e.g. the replayer's playback sleeps); never goes backward.
    fn now_monotonic_ns(&self) -> i64;

    /// Wall-clock nanoseconds since the Unix epoch. Used to mint
    /// `RecordKey` timestamps; per spec.md §4.H, callers clamp negative
    /// values to zero before encoding.
    fn now_unix_ns(&self) -> i64;
}

/// Real system clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }

    fn now_monotonic_ns(&self) -> i64 {
        // The clock capability is required to be total (spec.md §7); a
        // process that has been up longer than ~292 years would overflow
        // this, which we treat as impossible.
        monotonic_origin().elapsed().as_nanos() as i64
    }

    fn now_unix_ns(&self) -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as i64
    }
}

fn monotonic_origin() -> &'static Instant {
    static ORIGIN: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    ORIGIN.get_or_init(Instant::now)
}

/// Fake clock for testing with controllable time.
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<Instant>>,
    epoch_ms: Arc<Mutex<u64>>,
    unix_ns: Arc<Mutex<i64>>,
    monotonic_ns: Arc<Mutex<i64>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
            epoch_ms: Arc::new(Mutex::new(1_000_000)),
            unix_ns: Arc::new(Mutex::new(1_000_000 * 1_000_000)),
            monotonic_ns: Arc::new(Mutex::new(0)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        *self.current.lock() += duration;
        *self.epoch_ms.lock() += duration.as_millis() as u64;
        *self.unix_ns.lock() += duration.as_nanos() as i64;
        *self.monotonic_ns.lock() += duration.as_nanos() as i64;
    }

    /// Set the clock to a specific instant.
    pub fn set(&self, instant: Instant) {
        *self.current.lock() = instant;
    }

    /// Set the epoch milliseconds value.
    pub fn set_epoch_ms(&self, ms: u64) {
        *self.epoch_ms.lock() = ms;
    }

    /// Set the wall-clock nanoseconds value directly.
    pub fn set_unix_ns(&self, ns: i64) {
        *self.unix_ns.lock() = ns;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }

    fn epoch_ms(&self) -> u64 {
        *self.epoch_ms.lock()
    }

    fn now_monotonic_ns(&self) -> i64 {
        *self.monotonic_ns.lock()
    }

    fn now_unix_ns(&self) -> i64 {
        *self.unix_ns.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
