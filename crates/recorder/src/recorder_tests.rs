// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use jobmesh_core::{FakeClock, SnapshotIntervalConfig};
use jobmesh_pubsub::{MessageDecodeError, Node};
use jobmesh_runtime::{JobRunner, JobRunnerConfig};
use tempfile::TempDir;

use super::*;

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

#[test]
fn register_channel_records_published_messages() {
    let dir = TempDir::new().expect("tempdir");
    let r = runner();
    let config = RecorderConfig { record_dir: dir.path().to_path_buf(), snapshot_intervals: Vec::new() };
    let recorder = Recorder::with_clock(config, &r, FakeClock::new()).expect("recorder construction");
    recorder.register_channel::<TextMsg>(7, None).expect("register channel");

    let publisher = Node::new(&r);
    publisher.publish(7, TextMsg("hello".to_string()));
    publisher.publish(7, TextMsg("world".to_string()));

    let file = Arc::clone(&recorder.channels.lock()[0].file);
    wait_until(|| file.iterate().map(|entries| entries.len()).unwrap_or(0) == 2, Duration::from_secs(2));

    let entries = file.iterate().expect("iterate");
    assert_eq!(entries[0].1, b"hello");
    assert_eq!(entries[1].1, b"world");
}

#[test]
fn record_dir_is_removed_if_nothing_was_ever_written() {
    let dir = TempDir::new().expect("tempdir");
    let r = runner();
    let config = RecorderConfig { record_dir: dir.path().to_path_buf(), snapshot_intervals: Vec::new() };
    let recorder = Recorder::with_clock(config, &r, FakeClock::new()).expect("recorder construction");
    let record_dir = recorder.get_record_dir();
    assert!(record_dir.exists());
    drop(recorder);
    assert!(!record_dir.exists());
}

#[test]
fn more_than_one_snapshot_interval_keeps_only_the_last() {
    let dir = TempDir::new().expect("tempdir");
    let r = runner();
    let config = RecorderConfig {
        record_dir: dir.path().to_path_buf(),
        snapshot_intervals: vec![
            SnapshotIntervalConfig { name: "hourly".to_string(), period_sec: 3600, max_num_of_copies: 24 },
            SnapshotIntervalConfig { name: "daily".to_string(), period_sec: 86_400, max_num_of_copies: 7 },
        ],
    };
    let recorder = Recorder::with_clock(config, &r, FakeClock::new()).expect("recorder construction");
    assert_eq!(recorder.interval.as_ref().expect("interval configured").name, "daily");
}

#[test]
fn sanitized_file_name_strips_non_alphanumeric_characters() {
    assert_eq!(sanitized_file_name("crate::msg::Foo<Bar>", 3), "crate__msg__Foo_Bar__subid_3.ldb");
}

#[test]
fn civil_from_days_round_trips_a_known_date() {
    // 2024-01-01 is 19723 days after the Unix epoch.
    assert_eq!(civil_from_days(19723), (2024, 1, 1));
}
