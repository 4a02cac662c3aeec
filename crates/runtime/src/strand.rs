// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A serialization token. At most one job added to a [`Strand`] is ever
//! in-flight (either sitting in the runner's queues or actively executing)
//! at a time; every other job added while one is in-flight waits in the
//! strand's own pending FIFO, per spec.md §4.D.
//!
//! The `has_ready_job` flag and the pending queue share one
//! [`HybridSpinMutex`]. Admitting a job is "lock, check the flag, either
//! enqueue locally or flip the flag and submit to the runner" — cheap
//! enough that the hybrid spin/yield mutex never pays a futex round trip
//! in the uncontended case that dominates in practice.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use crate::alive::AliveToken;
use crate::runner::{is_current_worker_of, upgrade, JobRunnerInner};
use crate::spin_mutex::HybridSpinMutex;
use crate::Job;

/// Outcome of [`Strand::try_run_immediately`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRunResult {
    /// The job already ran, synchronously, on the calling thread.
    Finished,
    /// The job was handed to the runner or the strand's pending queue; it
    /// will run on some worker thread later.
    Enqueued,
    /// The strand's runner has been dropped; the job was not run or queued.
    Failed,
}

struct StrandState {
    has_ready_job: bool,
    pending: VecDeque<Job>,
}

/// Shared ownership: a strand survives as long as any job (including
/// pending ones) still references it, which is why every constructor
/// returns `Arc<Strand>` rather than `Strand`.
pub struct Strand {
    runner: Weak<JobRunnerInner>,
    state: HybridSpinMutex<StrandState>,
}

impl Strand {
    pub(crate) fn new(runner: Weak<JobRunnerInner>) -> Arc<Self> {
        Arc::new(Self { runner, state: HybridSpinMutex::new(StrandState { has_ready_job: false, pending: VecDeque::new() }) })
    }

    /// Adds `job`, serialized behind this strand. Returns once the job has
    /// either been submitted to the runner or queued locally — never runs
    /// it inline.
    pub fn add_job(self: &Arc<Self>, job: Job) {
        let wrapped = self.wrap(job);
        self.admit(wrapped);
    }

    /// Like [`Self::add_job`], but the job is invoked with an [`AliveToken`]
    /// and strand advancement waits for every clone of that token to drop
    /// (spec.md §4.E) instead of firing as soon as the callback returns.
    pub fn add_job_with_token(self: &Arc<Self>, job: impl FnOnce(AliveToken) + Send + 'static) {
        let wrapped = self.wrap_with_token(job);
        self.admit(wrapped);
    }

    /// Attempts to run `job` synchronously on the caller if nothing is
    /// currently in flight for this strand and the caller is executing on
    /// a worker of the strand's runner; otherwise falls back to the normal
    /// enqueue path. Never runs a job inline when one is already in flight
    /// for this strand — including when the caller is itself inside a job
    /// running on this same strand, since `has_ready_job` is still set for
    /// the duration of that job.
    pub fn try_run_immediately(self: &Arc<Self>, job: Job) -> TryRunResult {
        let wrapped = self.wrap(job);
        let Some(mut guard) = self.state.try_lock() else {
            // Couldn't get the lock without blocking; fall back to the
            // normal (blocking) admit path rather than spin here.
            self.admit(wrapped);
            return TryRunResult::Enqueued;
        };

        if guard.has_ready_job {
            guard.pending.push_back(wrapped);
            return TryRunResult::Enqueued;
        }

        let Some(runner) = upgrade(&self.runner) else {
            drop(guard);
            tracing::error!("strand add_job: runner has been dropped");
            return TryRunResult::Failed;
        };

        guard.has_ready_job = true;
        if is_current_worker_of(&runner) {
            drop(guard);
            wrapped();
            TryRunResult::Finished
        } else {
            drop(guard);
            runner.add_job(wrapped);
            TryRunResult::Enqueued
        }
    }

    fn admit(self: &Arc<Self>, wrapped: Job) {
        let mut guard = self.state.lock();
        if guard.has_ready_job {
            guard.pending.push_back(wrapped);
            return;
        }
        guard.has_ready_job = true;
        drop(guard);
        self.submit(wrapped);
    }

    fn submit(self: &Arc<Self>, job: Job) {
        match upgrade(&self.runner) {
            Some(runner) => {
                runner.add_job(job);
            }
            None => {
                tracing::error!("strand add_job: runner has been dropped, dropping job");
            }
        }
    }

    /// Pops the next pending job (if any) and submits it to the runner;
    /// otherwise clears `has_ready_job` so the next `add_job` can run
    /// without queuing.
    fn advance(self: &Arc<Self>) {
        let mut guard = self.state.lock();
        match guard.pending.pop_front() {
            Some(next) => {
                drop(guard);
                self.submit(next);
            }
            None => {
                guard.has_ready_job = false;
            }
        }
    }

    fn wrap(self: &Arc<Self>, job: Job) -> Job {
        let strand = Arc::clone(self);
        Box::new(move || {
            job();
            strand.advance();
        })
    }

    fn wrap_with_token(self: &Arc<Self>, job: impl FnOnce(AliveToken) + Send + 'static) -> Job {
        let strand = Arc::clone(self);
        Box::new(move || {
            let token = AliveToken::new(move || strand.advance());
            job(token);
        })
    }
}

#[cfg(test)]
#[path = "strand_tests.rs"]
mod tests;
