// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jobmesh-runtime: the work-stealing job pool underneath the pub/sub fabric
//! and the recorder's write path.
//!
//! Four pieces, leaves first: [`JobQueue`] is a growable MPSC ring buffer;
//! [`JobRunner`] owns a fixed pool of worker threads built on it; [`Strand`]
//! is a serialization token that admits at most one of its jobs into the
//! runner at a time, with an inline fast path when nothing is in flight;
//! [`AliveToken`] lets a strand job defer "I'm done" past its own return by
//! handing a clonable guard to spawned sub-jobs.

mod alive;
mod queue;
mod runner;
mod spin_mutex;
mod strand;

pub use alive::AliveToken;
pub use queue::JobQueue;
pub use runner::{JobRunner, JobRunnerConfig, RunnerError, WeakJobRunner};
pub use spin_mutex::HybridSpinMutex;
pub use strand::{Strand, TryRunResult};

/// A callable with no arguments and no return, owned by whichever queue or
/// strand currently holds it.
pub type Job = Box<dyn FnOnce() + Send + 'static>;
