// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `RecordKey` is the `{timestamp_ns, count}` pair that orders entries
//! within and across record segments, per spec.md §4.H. The primary codec
//! renders both fields as fixed-width decimal digits inside an ASCII
//! frame so that lexicographic byte order matches numeric order; a
//! secondary legacy codec reinterprets the raw little-endian struct
//! layout for segments written before the ASCII encoding existed.

use std::sync::atomic::{AtomicU64, Ordering};

use jobmesh_core::Clock;
use thiserror::Error;

/// Fixed decimal width for both fields: `ceil(log10(u64::MAX))`.
const DIGITS: usize = 20;

/// Tie-breaker counters for keys minted within the same nanosecond,
/// indexed by `timestamp_ns & 0xF`. Process-wide so two `RecordKey::make`
/// calls anywhere in the process never collide, matching the source's
/// `static` counter array.
const NUM_COUNTERS: usize = 16;
static COUNTERS: [AtomicU64; NUM_COUNTERS] = [
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordKeyError {
    #[error("record key {0:?} does not match the \"T<20 digits>ns<20 digits>\" format")]
    Malformed(String),
}

/// `{ timestamp_ns, count }`, per spec.md §3. Keys generated within the
/// same process are strictly increasing (see [`RecordKey::make`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub timestamp_ns: i64,
    pub count: u64,
}

impl RecordKey {
    /// Mints a key from `clock`'s wall-clock reading and a counter in a
    /// 16-slot array indexed by `timestamp_ns & 0xF`, fetch-added
    /// atomically. This guarantees strict monotonicity across threads
    /// even when the clock's resolution collapses adjacent calls onto
    /// the same nanosecond.
    pub fn make(clock: &impl Clock) -> Self {
        let timestamp_ns = clock.now_unix_ns();
        let slot = (timestamp_ns as u64 & (NUM_COUNTERS as u64 - 1)) as usize;
        let count = COUNTERS[slot].fetch_add(1, Ordering::Relaxed);
        Self { timestamp_ns, count }
    }

    /// `"T" + 20-digit decimal timestamp (negative clamped to 0) + "ns" +
    /// 20-digit decimal count`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let ts = self.timestamp_ns.max(0);
        format!("T{ts:0>width$}ns{count:0>width$}", ts = ts, count = self.count, width = DIGITS).into_bytes()
    }

    /// Inverse of [`Self::to_bytes`]. Fails with a recoverable error if
    /// the byte string doesn't match the expected framing.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordKeyError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|_| RecordKeyError::Malformed(String::from_utf8_lossy(bytes).into_owned()))?;
        let malformed = || RecordKeyError::Malformed(s.to_string());

        let rest = s.strip_prefix('T').ok_or_else(malformed)?;
        if rest.len() < DIGITS + 2 {
            return Err(malformed());
        }
        let (ts_str, rest) = rest.split_at(DIGITS);
        let rest = rest.strip_prefix("ns").ok_or_else(malformed)?;
        if rest.len() != DIGITS {
            return Err(malformed());
        }

        let timestamp_ns: i64 = ts_str.parse().map_err(|_| malformed())?;
        let count: u64 = rest.parse().map_err(|_| malformed())?;
        Ok(Self { timestamp_ns, count })
    }

    /// Reinterprets the first 16 bytes as `{ timestamp_ns: i64, count: u64
    /// }`, both little-endian — the on-disk layout used before the ASCII
    /// codec, per spec.md §4.H and SPEC_FULL §4.N. Used only when a
    /// segment cannot be opened with the primary codec.
    pub fn from_bytes_legacy(bytes: &[u8]) -> Result<Self, RecordKeyError> {
        if bytes.len() < 16 {
            return Err(RecordKeyError::Malformed(format!("legacy key too short: {} bytes", bytes.len())));
        }
        let mut ts_buf = [0u8; 8];
        let mut count_buf = [0u8; 8];
        ts_buf.copy_from_slice(&bytes[0..8]);
        count_buf.copy_from_slice(&bytes[8..16]);
        Ok(Self { timestamp_ns: i64::from_le_bytes(ts_buf), count: u64::from_le_bytes(count_buf) })
    }

    /// Little-endian 16-byte encoding paired with [`Self::from_bytes_legacy`].
    pub fn to_bytes_legacy(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(&self.timestamp_ns.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out
    }

    /// Lexicographic compare of the primary encoding: orders by
    /// `timestamp_ns` first, `count` as tiebreak.
    pub fn compare(a: &RecordKey, b: &RecordKey) -> std::cmp::Ordering {
        a.to_bytes().cmp(&b.to_bytes())
    }
}

#[cfg(test)]
#[path = "record_key_tests.rs"]
mod tests;
