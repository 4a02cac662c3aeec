// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded spin, then OS yield. Sized for the micro-critical sections a
//! [`crate::Strand`] takes while deciding whether a job runs inline,
//! queues, or goes to the runner — sections expected to be uncontended and
//! a handful of instructions long, where a futex round-trip would dominate.

use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

/// Iterations per spin batch before re-checking `try_lock`.
const SPIN_BATCH: u32 = 100;
/// Batches attempted before falling back to cooperative yielding. At roughly
/// one `spin_loop` hint per cycle this approximates a 500us spin budget.
const SPIN_BATCHES: u32 = 500;

pub struct HybridSpinMutex<T> {
    inner: Mutex<T>,
}

impl<T> HybridSpinMutex<T> {
    pub fn new(value: T) -> Self {
        Self { inner: Mutex::new(value) }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock()
    }

    /// Spins briefly, then falls back to yielding the thread until the lock
    /// is free. Never blocks in the OS scheduler's wait queues.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        for _ in 0..SPIN_BATCHES {
            if let Some(guard) = self.inner.try_lock() {
                return guard;
            }
            for _ in 0..SPIN_BATCH {
                std::hint::spin_loop();
            }
        }
        loop {
            if let Some(guard) = self.inner.try_lock() {
                return guard;
            }
            std::thread::yield_now();
        }
    }

    /// Same budget as [`Self::lock`], for callers who'd rather report an
    /// acquisition timeout than keep yielding forever.
    pub fn try_lock_for(&self, timeout: Duration) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock_for(timeout)
    }
}
