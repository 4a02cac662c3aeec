// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The work-stealing thread pool. Each worker runs [`worker_loop`]: try its
//! own queue, then try to steal, then decide whether to busy-wait or park
//! based on `always_active_thread_num`/`active_time`, per spec.md §4.B.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rand::Rng;

use crate::alive::AliveToken;
use crate::queue::JobQueue;
use crate::strand::{Strand, TryRunResult};
use crate::Job;

/// Immutable pool configuration. `thread_num == 0` is resolved by the
/// caller (typically to the host's available parallelism) before
/// construction; the runner itself always starts exactly `thread_num`
/// workers.
#[derive(Debug, Clone, Copy)]
pub struct JobRunnerConfig {
    pub thread_num: usize,
    pub always_active_thread_num: usize,
    pub active_time: Duration,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self { thread_num: 1, always_active_thread_num: 0, active_time: Duration::from_millis(0) }
    }
}

impl From<jobmesh_core::RunnerConfig> for JobRunnerConfig {
    fn from(cfg: jobmesh_core::RunnerConfig) -> Self {
        let thread_num = if cfg.thread_num == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        } else {
            cfg.thread_num as usize
        };
        Self {
            thread_num,
            always_active_thread_num: cfg.always_active as usize,
            active_time: Duration::from_millis(cfg.active_ms),
        }
    }
}

/// Errors constructing a [`JobRunner`].
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn job runner worker thread {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

struct IdleState {
    shutdown: bool,
}

struct WorkerHandle {
    queue: JobQueue,
    idle: Mutex<IdleState>,
    idle_cv: Condvar,
}

pub(crate) struct JobRunnerInner {
    config: JobRunnerConfig,
    workers: Vec<WorkerHandle>,
    active_workers_num: AtomicUsize,
    ready_for_stealing: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

thread_local! {
    /// (runner identity, worker index) set for the lifetime of a worker
    /// thread, used for submission locality and try-run-immediately
    /// eligibility. The identity is an `Arc` address used only for
    /// equality, never dereferenced.
    static CURRENT_WORKER: Cell<Option<(usize, usize)>> = const { Cell::new(None) };
}

/// A pool of worker threads. Cheap to clone (an `Arc` handle); any clone may
/// call [`JobRunner::stop`] — the first caller joins the threads, later
/// calls are no-ops.
#[derive(Clone)]
pub struct JobRunner {
    pub(crate) inner: Arc<JobRunnerInner>,
}

impl JobRunner {
    /// Builds a pool of `config.thread_num` worker threads. If a thread
    /// fails to spawn partway through, the workers already started are
    /// signalled to shut down and joined before the error is returned, so
    /// no thread is leaked running ownerless.
    pub fn new(config: JobRunnerConfig) -> Result<Self, RunnerError> {
        let workers = (0..config.thread_num.max(1))
            .map(|_| WorkerHandle {
                queue: JobQueue::new(),
                idle: Mutex::new(IdleState { shutdown: false }),
                idle_cv: Condvar::new(),
            })
            .collect();
        let inner = Arc::new(JobRunnerInner {
            config,
            workers,
            active_workers_num: AtomicUsize::new(config.thread_num.max(1)),
            ready_for_stealing: AtomicBool::new(true),
            threads: Mutex::new(Vec::new()),
        });
        let mut threads = Vec::with_capacity(inner.workers.len());
        for index in 0..inner.workers.len() {
            let spawned = Arc::clone(&inner);
            match std::thread::Builder::new().name(format!("jobmesh-worker-{index}")).spawn(move || worker_loop(spawned, index)) {
                Ok(handle) => threads.push(handle),
                Err(source) => {
                    for worker in &inner.workers {
                        let mut guard = worker.idle.lock();
                        guard.shutdown = true;
                        worker.idle_cv.notify_all();
                    }
                    for thread in threads {
                        let _ = thread.join();
                    }
                    return Err(RunnerError::Spawn { index, source });
                }
            }
        }
        *inner.threads.lock() = threads;
        Ok(Self { inner })
    }

    pub fn make_strand(&self) -> Arc<Strand> {
        Strand::new(Arc::downgrade(&self.inner))
    }

    /// A weak handle that outlives clones of this `JobRunner` without
    /// keeping its worker threads alive — what a [`Strand`] or a pub/sub
    /// `Node` holds so it doesn't extend the runner's lifetime.
    pub fn downgrade(&self) -> WeakJobRunner {
        WeakJobRunner { inner: Arc::downgrade(&self.inner) }
    }

    pub fn thread_num(&self) -> usize {
        self.inner.workers.len()
    }

    pub fn active_thread_num(&self) -> usize {
        self.inner.active_workers_num.load(Ordering::Acquire)
    }

    /// Worker index of the calling thread if it belongs to this runner,
    /// otherwise a uniformly random index.
    pub fn default_scheduler_hint(&self) -> usize {
        let self_id = Arc::as_ptr(&self.inner) as usize;
        if let Some((id, index)) = CURRENT_WORKER.with(Cell::get) {
            if id == self_id {
                return index;
            }
        }
        rand::thread_rng().gen_range(0..self.inner.workers.len())
    }

    /// Pushes `job` onto worker `hint % thread_num`'s queue, wakes that
    /// worker, and — unless the pool is shutting down — also wakes a
    /// random other worker so the new job is visible to stealers even if
    /// the hinted worker is busy. Returns `false` only if the pool has no
    /// workers.
    pub fn add_job_with_hint(&self, job: Job, hint: usize) -> bool {
        let n = self.inner.workers.len();
        if n == 0 {
            tracing::error!("add_job: job runner has no workers");
            return false;
        }
        let index = hint % n;
        self.inner.workers[index].queue.push(job);
        self.wake(index);
        if self.inner.ready_for_stealing.load(Ordering::Acquire) && n > 1 {
            let mut other = rand::thread_rng().gen_range(0..n - 1);
            if other >= index {
                other += 1;
            }
            self.wake(other);
        }
        true
    }

    pub fn add_job(&self, job: Job) -> bool {
        let hint = self.default_scheduler_hint();
        self.add_job_with_hint(job, hint)
    }

    /// Runner-level entry point for a callback that accepts an
    /// [`AliveToken`] but isn't bound to a strand: the worker holds the
    /// token only for the duration of the call, per spec.md §4.E.
    pub fn add_job_with_token(&self, job: impl FnOnce(AliveToken) + Send + 'static, hint: usize) -> bool {
        self.add_job_with_hint(Box::new(move || job(AliveToken::new(|| {}))), hint)
    }

    /// Unstranded `TryRunImmediately`: runs `job` synchronously if the
    /// caller is already on one of this runner's workers, otherwise
    /// enqueues it normally. Unlike the strand variant there is no
    /// in-flight state to protect, so this can never return `Failed`.
    pub fn try_run_immediately(&self, job: Job) -> TryRunResult {
        if is_current_worker_of(self) {
            job();
            TryRunResult::Finished
        } else {
            self.add_job(job);
            TryRunResult::Enqueued
        }
    }

    fn wake(&self, index: usize) {
        let worker = &self.inner.workers[index];
        let _guard = worker.idle.lock();
        worker.idle_cv.notify_one();
    }

    /// Picks a random start index, then scans every worker in wrap-around
    /// order, running the first job found via `consume_one`.
    pub fn steal(&self) -> bool {
        let n = self.inner.workers.len();
        if n == 0 {
            return false;
        }
        let start = rand::thread_rng().gen_range(0..n);
        for offset in 0..n {
            let index = (start + offset) % n;
            if self.inner.workers[index].queue.consume_one(|job| job()) {
                return true;
            }
        }
        false
    }

    /// Stops accepting new steal fan-out, signals every worker to shut
    /// down, and joins their threads. Jobs still queued when a worker
    /// observes shutdown are dropped. Idempotent across clones of the same
    /// runner.
    pub fn stop(&self) {
        self.inner.ready_for_stealing.store(false, Ordering::Release);
        for worker in &self.inner.workers {
            let mut guard = worker.idle.lock();
            guard.shutdown = true;
            worker.idle_cv.notify_all();
        }
        let threads = std::mem::take(&mut *self.inner.threads.lock());
        for thread in threads {
            let _ = thread.join();
        }
    }
}

fn worker_loop(inner: Arc<JobRunnerInner>, index: usize) {
    CURRENT_WORKER.with(|c| c.set(Some((Arc::as_ptr(&inner) as usize, index))));
    let runner = JobRunner { inner: Arc::clone(&inner) };
    let mut last_activity = Instant::now();

    loop {
        if inner.workers[index].idle.lock().shutdown {
            return;
        }

        let ran_local = inner.workers[index].queue.consume_one(|job| job());
        let activity = if ran_local { true } else { runner.steal() };

        if activity {
            last_activity = Instant::now();
            continue;
        }

        if index < inner.config.always_active_thread_num {
            continue;
        }

        if last_activity.elapsed() < inner.config.active_time {
            continue;
        }

        let mut guard = inner.workers[index].idle.lock();
        if guard.shutdown {
            return;
        }
        inner.active_workers_num.fetch_sub(1, Ordering::AcqRel);
        inner.workers[index].idle_cv.wait_for(&mut guard, Duration::from_secs(1));
        inner.active_workers_num.fetch_add(1, Ordering::AcqRel);
        let shutdown = guard.shutdown;
        drop(guard);
        if shutdown {
            return;
        }
        last_activity = Instant::now();
    }
}

/// Whether the calling thread is currently executing a job on a worker of
/// `runner` — the locality check [`Strand::try_run_immediately`] needs.
pub(crate) fn is_current_worker_of(runner: &JobRunner) -> bool {
    let id = Arc::as_ptr(&runner.inner) as usize;
    CURRENT_WORKER.with(Cell::get).is_some_and(|(current, _)| current == id)
}

pub(crate) fn upgrade(weak: &Weak<JobRunnerInner>) -> Option<JobRunner> {
    weak.upgrade().map(|inner| JobRunner { inner })
}

/// A non-owning reference to a [`JobRunner`]. Upgrading is cheap relative
/// to job cost; this is the weak-reference pattern spec.md §9 calls for
/// between a strand and its runner, reused here for pub/sub `Node`s.
#[derive(Clone)]
pub struct WeakJobRunner {
    inner: Weak<JobRunnerInner>,
}

impl WeakJobRunner {
    pub fn upgrade(&self) -> Option<JobRunner> {
        upgrade(&self.inner)
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
