// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jobmesh-recorder: durable ordered-log recording and replay on top of
//! jobmesh-pubsub, spec.md §4.H through §4.L.
//!
//! [`RecordFile`] is the single-segment storage primitive; [`Recorder`]
//! and [`Replayer`] are the two [`jobmesh_pubsub::Node`]s that drive a
//! set of `RecordFile`s from, respectively, live subscriptions and
//! on-disk playback.

mod error;
mod kv_store;
mod record_file;
mod record_key;
mod recorder;
mod replayer;
mod rolling;

pub use error::{RecorderError, ReplayError};
pub use kv_store::{KvStore, KvStoreError, KvIter, MemKvStore, SledKvStore};
pub use record_file::{KeyCodec, RecordFile, StoreOpener};
pub use record_key::{RecordKey, RecordKeyError};
pub use recorder::{Recorder, SnapshotInfo};
pub use replayer::Replayer;
pub use rolling::{DirNameGenerator, RollMeta, RollingHelper, RollingPolicy};
