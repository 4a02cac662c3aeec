// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Segment-rolling policies, spec.md §4.I. A [`RollingHelper`] decides
//! when a [`crate::record_file::RecordFile`] should close its current
//! segment and open a fresh one, and generates the new segment's path.

use std::path::PathBuf;

/// Per-write bookkeeping a rolling policy needs: the time of the write and
/// the size in bytes of the value about to be (or just) written.
#[derive(Debug, Clone, Copy)]
pub struct RollMeta {
    pub now_unix_ns: i64,
    pub value_size: u64,
}

/// A caller-supplied generator for the next segment's directory name,
/// matching spec.md §4.I's `make_new_record_dir_name`.
pub type DirNameGenerator = std::sync::Arc<dyn Fn() -> PathBuf + Send + Sync>;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
const SECONDS_PER_HOUR: i64 = 60 * 60;
const ROLL_OFFSET_SECONDS: i64 = 60;

/// `{None, ByDay, ByHour, BySize(limit_bytes)}` from spec.md §4.I.
pub enum RollingHelper {
    None,
    ByDay { next_roll_ns: std::sync::atomic::AtomicI64 },
    ByHour { next_roll_ns: std::sync::atomic::AtomicI64 },
    BySize { limit_bytes: u64, current_bytes: std::sync::atomic::AtomicU64 },
}

impl RollingHelper {
    pub fn none() -> Self {
        Self::None
    }

    pub fn by_day(now_unix_ns: i64) -> Self {
        Self::ByDay { next_roll_ns: std::sync::atomic::AtomicI64::new(next_boundary_ns(now_unix_ns, SECONDS_PER_DAY)) }
    }

    pub fn by_hour(now_unix_ns: i64) -> Self {
        Self::ByHour {
            next_roll_ns: std::sync::atomic::AtomicI64::new(next_boundary_ns(now_unix_ns, SECONDS_PER_HOUR)),
        }
    }

    pub fn by_size(limit_bytes: u64) -> Self {
        Self::BySize { limit_bytes, current_bytes: std::sync::atomic::AtomicU64::new(0) }
    }

    /// Whether the current segment should be closed before writing this
    /// value.
    pub fn need_to_roll(&self, meta: RollMeta) -> bool {
        use std::sync::atomic::Ordering;
        match self {
            Self::None => false,
            Self::ByDay { next_roll_ns } | Self::ByHour { next_roll_ns } => {
                meta.now_unix_ns >= next_roll_ns.load(Ordering::Acquire)
            }
            Self::BySize { limit_bytes, current_bytes } => {
                meta.value_size >= *limit_bytes || current_bytes.load(Ordering::Acquire) + meta.value_size >= *limit_bytes
            }
        }
    }

    /// Post-write bookkeeping: accumulates bytes for `BySize`, no-op
    /// otherwise (time-based policies only move their boundary on
    /// [`Self::reset`], per spec.md §4.I).
    pub fn update(&self, meta: RollMeta) {
        if let Self::BySize { current_bytes, .. } = self {
            current_bytes.fetch_add(meta.value_size, std::sync::atomic::Ordering::AcqRel);
        }
    }

    /// Called after rolling to a new segment.
    pub fn reset(&self, now_unix_ns: i64) {
        use std::sync::atomic::Ordering;
        match self {
            Self::None => {}
            Self::ByDay { next_roll_ns } => {
                next_roll_ns.store(next_boundary_ns(now_unix_ns, SECONDS_PER_DAY), Ordering::Release)
            }
            Self::ByHour { next_roll_ns } => {
                next_roll_ns.store(next_boundary_ns(now_unix_ns, SECONDS_PER_HOUR), Ordering::Release)
            }
            Self::BySize { current_bytes, .. } => current_bytes.store(0, Ordering::Release),
        }
    }
}

/// The next `interval_len`-second UTC boundary strictly after `now`, plus
/// a small offset so segments don't churn right at the instant of
/// rollover, per the original's `CalcNextRollingTime`.
fn next_boundary_ns(now_unix_ns: i64, interval_len_secs: i64) -> i64 {
    let now_secs = now_unix_ns.div_euclid(1_000_000_000);
    let interval_start = now_secs - now_secs.rem_euclid(interval_len_secs);
    let next = interval_start + interval_len_secs + ROLL_OFFSET_SECONDS;
    next * 1_000_000_000
}

/// Pairs a [`RollingHelper`] policy with the caller-supplied path
/// generator spec.md §4.I calls `make_new_record_dir_name`. `RecordFile`
/// holds one of these rather than a bare `RollingHelper` so rolling and
/// "what path does the next segment get" stay together.
pub struct RollingPolicy {
    helper: RollingHelper,
    dir_generator: DirNameGenerator,
}

impl RollingPolicy {
    pub fn new(helper: RollingHelper, dir_generator: DirNameGenerator) -> Self {
        Self { helper, dir_generator }
    }

    pub fn need_to_roll(&self, meta: RollMeta) -> bool {
        self.helper.need_to_roll(meta)
    }

    pub fn update(&self, meta: RollMeta) {
        self.helper.update(meta)
    }

    pub fn reset(&self, now_unix_ns: i64) {
        self.helper.reset(now_unix_ns)
    }

    pub fn make_new_record_dir_name(&self) -> PathBuf {
        (self.dir_generator)()
    }
}

#[cfg(test)]
#[path = "rolling_tests.rs"]
mod tests;
