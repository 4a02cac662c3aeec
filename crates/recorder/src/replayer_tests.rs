// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobmesh_core::{FakeClock, RecorderConfig, SystemClock};
use jobmesh_pubsub::MessageDecodeError;
use jobmesh_runtime::{JobRunner, JobRunnerConfig};
use tempfile::TempDir;

use super::*;
use crate::recorder::Recorder;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TextMsg(String);

impl Message for TextMsg {
    fn to_bytes(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }
    fn from_bytes(bytes: &[u8]) -> Result<Self, MessageDecodeError> {
        Ok(TextMsg(String::from_utf8_lossy(bytes).into_owned()))
    }
}

fn runner() -> JobRunner {
    JobRunner::new(JobRunnerConfig { thread_num: 2, always_active_thread_num: 2, active_time: Duration::from_millis(50) }).expect("spawn test runner")
}

fn wait_until(mut pred: impl FnMut() -> bool, timeout: Duration) {
    let start = std::time::Instant::now();
    while !pred() {
        if start.elapsed() > timeout {
            panic!("condition not met within {timeout:?}");
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Records three messages on one channel via a real `Recorder`, then
/// closes it so the segment is durably on disk for a `Replayer` to read.
fn record_three_messages(dir: &std::path::Path, sub_id: u64) {
    let r = runner();
    let config = RecorderConfig { record_dir: dir.to_path_buf(), snapshot_intervals: Vec::new() };
    let recorder = Recorder::with_clock(config, &r, FakeClock::new()).expect("recorder construction");
    let record_dir = recorder.get_record_dir();
    recorder.register_channel::<TextMsg>(sub_id, None).expect("register channel");

    let publisher = Node::new(&r);
    publisher.publish(sub_id, TextMsg("one".to_string()));
    publisher.publish(sub_id, TextMsg("two".to_string()));
    publisher.publish(sub_id, TextMsg("three".to_string()));

    // The record strand runs the three writes asynchronously; give it a
    // moment to drain before closing the recorder.
    std::thread::sleep(Duration::from_millis(200));
    drop(recorder);
    assert!(record_dir.exists(), "record dir should survive since it has content");
}

#[test]
fn replay_delivers_messages_in_recorded_order() {
    let dir = TempDir::new().expect("tempdir");
    record_three_messages(dir.path(), 42);

    // Find the record dir the recorder created (a `record.*` subdirectory).
    let record_dir = std::fs::read_dir(dir.path())
        .expect("read_dir")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.is_dir())
        .expect("a record directory was created");

    let r = runner();
    let replayer = Replayer::with_clock(record_dir, &r, SystemClock);
    replayer.register_channel::<TextMsg>(42).expect("register channel");

    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = Arc::clone(&received);
    let subscriber = Node::new(&r);
    subscriber.subscribe::<TextMsg>(42, move |m| received2.lock().unwrap().push(m.0.clone()), None).expect("subscribe");

    replayer.set_speedup_rate(1_000_000.0);
    replayer.main_loop();

    wait_until(|| received.lock().unwrap().len() == 3, Duration::from_secs(2));
    assert_eq!(*received.lock().unwrap(), vec!["one", "two", "three"]);
}

#[test]
fn stop_main_loop_halts_playback_early() {
    let dir = TempDir::new().expect("tempdir");
    record_three_messages(dir.path(), 7);
    let record_dir = std::fs::read_dir(dir.path())
        .expect("read_dir")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.is_dir())
        .expect("a record directory was created");

    let r = runner();
    let replayer = Arc::new(Replayer::with_clock(record_dir, &r, SystemClock));
    replayer.register_channel::<TextMsg>(7).expect("register channel");
    replayer.set_speedup_rate(0.000_001);
    replayer.stop_main_loop();
    replayer.main_loop();
    // Stopping before the loop starts means no messages are ever published.
}

#[test]
fn lifecycle_callbacks_fire_in_order() {
    let dir = TempDir::new().expect("tempdir");
    record_three_messages(dir.path(), 9);
    let record_dir = std::fs::read_dir(dir.path())
        .expect("read_dir")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.is_dir())
        .expect("a record directory was created");

    let r = runner();
    let replayer = Replayer::with_clock(record_dir, &r, SystemClock);
    replayer.register_channel::<TextMsg>(9).expect("register channel");
    replayer.set_speedup_rate(1_000_000.0);

    let order = Arc::new(Mutex::new(Vec::new()));
    let o1 = Arc::clone(&order);
    let o2 = Arc::clone(&order);
    let o3 = Arc::clone(&order);
    replayer.set_post_start_callback(Arc::new(move || o1.lock().unwrap().push("post_start")));
    replayer.set_pre_finish_callback(Arc::new(move || o2.lock().unwrap().push("pre_finish")));
    replayer.set_post_finish_callback(Arc::new(move || o3.lock().unwrap().push("post_finish")));

    replayer.main_loop();

    assert_eq!(*order.lock().unwrap(), vec!["post_start", "pre_finish", "post_finish"]);
}

#[test]
fn heap_entry_ordering_is_ascending_by_key() {
    let small = HeapEntry { key: RecordKey { timestamp_ns: 1, count: 0 }, reader_index: 0 };
    let large = HeapEntry { key: RecordKey { timestamp_ns: 2, count: 0 }, reader_index: 1 };
    let mut heap = BinaryHeap::new();
    heap.push(large);
    heap.push(small);
    assert_eq!(heap.pop().expect("pop").key.timestamp_ns, 1);
    assert_eq!(heap.pop().expect("pop").key.timestamp_ns, 2);
}
