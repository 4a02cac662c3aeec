// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Replayer`, spec.md §4.L: a [`Node`] that merges several recorded
//! channels back into real-time (or sped-up) publish order via a
//! priority queue keyed on each reader's current [`RecordKey`].

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jobmesh_core::{Clock, SystemClock};
use jobmesh_pubsub::{Message, Node};
use jobmesh_runtime::JobRunner;
use parking_lot::Mutex;

use crate::error::ReplayError;
use crate::kv_store::{KvStore, SledKvStore};
use crate::record_file::{RecordFile, StoreOpener};
use crate::record_key::RecordKey;
use crate::rolling::{RollingHelper, RollingPolicy};

type PublishFn = Arc<dyn Fn(&Node, u64, &[u8]) -> Result<(), ReplayError> + Send + Sync>;

fn sled_opener() -> StoreOpener {
    Arc::new(|path: &Path| Ok(Box::new(SledKvStore::open(path)?) as Box<dyn KvStore>))
}

fn sanitized_file_name(type_name: &str, sub_id: u64) -> String {
    let sanitized: String = type_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("{sanitized}_subid_{sub_id}.ldb")
}

struct Reader {
    sub_id: u64,
    publish: PublishFn,
    entries: Vec<(RecordKey, Vec<u8>)>,
    cursor: usize,
}

impl Reader {
    fn current_key(&self) -> RecordKey {
        self.entries[self.cursor].0
    }

    fn valid(&self) -> bool {
        self.cursor < self.entries.len()
    }
}

/// Min-heap entry ordered by the reader's current key, ascending (spec.md
/// §4.L's "priority queue ordered by current key ascending").
struct HeapEntry {
    key: RecordKey,
    reader_index: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed so `BinaryHeap` (a max-heap) pops the smallest key first.
        other.key.cmp(&self.key)
    }
}

/// `{ record_dir, readers, speed_up_rate, shutdown_flag }` from spec.md
/// §3/§4.L.
pub struct Replayer<C: Clock = SystemClock> {
    node: Arc<Node>,
    record_dir: PathBuf,
    clock: C,
    speed_up_rate: std::sync::atomic::AtomicU64,
    shutdown: AtomicBool,
    ended: AtomicBool,
    readers: Mutex<Vec<Reader>>,
    heap: Mutex<BinaryHeap<HeapEntry>>,
    post_start: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    pre_finish: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    post_finish: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl Replayer<SystemClock> {
    pub fn new(record_dir: impl Into<PathBuf>, runner: &JobRunner) -> Self {
        Self::with_clock(record_dir, runner, SystemClock)
    }
}

impl<C: Clock + 'static> Replayer<C> {
    pub fn with_clock(record_dir: impl Into<PathBuf>, runner: &JobRunner, clock: C) -> Self {
        Self {
            node: Arc::new(Node::new(runner)),
            record_dir: record_dir.into(),
            clock,
            speed_up_rate: std::sync::atomic::AtomicU64::new(1f64.to_bits()),
            shutdown: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            readers: Mutex::new(Vec::new()),
            heap: Mutex::new(BinaryHeap::new()),
            post_start: Mutex::new(None),
            pre_finish: Mutex::new(None),
            post_finish: Mutex::new(None),
        }
    }

    pub fn get_record_dir(&self) -> &Path {
        &self.record_dir
    }

    pub fn set_speedup_rate(&self, rate: f64) {
        self.speed_up_rate.store(rate.to_bits(), Ordering::Release);
    }

    fn speed_up_rate(&self) -> f64 {
        f64::from_bits(self.speed_up_rate.load(Ordering::Acquire))
    }

    pub fn set_post_start_callback(&self, callback: Arc<dyn Fn() + Send + Sync>) {
        *self.post_start.lock() = Some(callback);
    }

    pub fn set_pre_finish_callback(&self, callback: Arc<dyn Fn() + Send + Sync>) {
        *self.pre_finish.lock() = Some(callback);
    }

    pub fn set_post_finish_callback(&self, callback: Arc<dyn Fn() + Send + Sync>) {
        *self.post_finish.lock() = Some(callback);
    }

    /// Opens the on-disk segment for `M` at `sub_id`, loads every entry
    /// (the `KvStore` abstraction here doesn't expose a streaming cursor,
    /// so the whole segment is read up front), and pushes it into the
    /// merge queue if non-empty.
    pub fn register_channel<M: Message>(&self, sub_id: u64) -> Result<(), ReplayError> {
        let type_name = std::any::type_name::<M>();
        let path = self.record_dir.join(sanitized_file_name(type_name, sub_id));
        let rolling = RollingPolicy::new(RollingHelper::none(), {
            let path = path.clone();
            Arc::new(move || path.clone())
        });
        let file = RecordFile::new(path, None, rolling, sled_opener());
        let entries = file.iterate()?;

        let publish: PublishFn = Arc::new(move |node: &Node, sub_id: u64, bytes: &[u8]| {
            let msg = M::from_bytes(bytes)?;
            node.publish(sub_id, msg);
            Ok(())
        });

        let reader = Reader { sub_id, publish, entries, cursor: 0 };
        if reader.valid() {
            let mut readers = self.readers.lock();
            let reader_index = readers.len();
            let key = reader.current_key();
            readers.push(reader);
            drop(readers);
            self.heap.lock().push(HeapEntry { key, reader_index });
        }
        Ok(())
    }

    pub fn stop_main_loop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// True only once [`Self::main_loop`] has run its `post_finish`
    /// callback — a cancelled or still-running replay reports `false`.
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Runs playback to completion (or until [`Self::stop_main_loop`] is
    /// called), firing the lifecycle callbacks around it (spec.md §4.L).
    pub fn main_loop(&self) {
        if let Some(callback) = self.post_start.lock().as_ref() {
            callback();
        }

        self.replay_messages();

        if let Some(callback) = self.pre_finish.lock().as_ref() {
            callback();
        }
        if let Some(callback) = self.post_finish.lock().as_ref() {
            callback();
        }
        self.ended.store(true, Ordering::Release);
    }

    fn replay_messages(&self) {
        let mut start_record_ts: Option<i64> = None;
        let mut start_local_ts: i64 = 0;

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            let Some(top) = self.heap.lock().pop() else {
                break;
            };

            let (sub_id, publish, key, bytes) = {
                let readers = self.readers.lock();
                let reader = &readers[top.reader_index];
                let (key, bytes) = reader.entries[reader.cursor].clone();
                (reader.sub_id, Arc::clone(&reader.publish), key, bytes)
            };

            match start_record_ts {
                None => {
                    start_record_ts = Some(key.timestamp_ns);
                    start_local_ts = self.clock.now_monotonic_ns();
                }
                Some(start_ts) => {
                    let rate = self.speed_up_rate();
                    let expected_elapsed_ns = ((key.timestamp_ns - start_ts) as f64 / rate).round() as i64;
                    let elapsed_so_far = self.clock.now_monotonic_ns() - start_local_ts;
                    let sleep_ns = expected_elapsed_ns - elapsed_so_far;
                    if sleep_ns > 10_000 {
                        std::thread::sleep(std::time::Duration::from_nanos(sleep_ns as u64));
                    }
                }
            }

            if let Err(error) = publish(&self.node, sub_id, &bytes) {
                tracing::warn!(%error, sub_id, "failed to deserialize recorded message, skipping it");
            }

            let mut readers = self.readers.lock();
            let reader = &mut readers[top.reader_index];
            reader.cursor += 1;
            if reader.valid() {
                let next_key = reader.current_key();
                drop(readers);
                self.heap.lock().push(HeapEntry { key: next_key, reader_index: top.reader_index });
            }
        }
    }
}

#[cfg(test)]
#[path = "replayer_tests.rs"]
mod tests;
