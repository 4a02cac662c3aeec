// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Recorder`, spec.md §4.K: a [`Node`] bound to a [`JobRunner`] that
//! subscribes to channels and durably appends every message it sees,
//! serialized through one *record strand* so concurrent publishes never
//! interleave writes to the same segment out of order.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use jobmesh_core::{Clock, RecorderConfig, SnapshotIntervalConfig, SystemClock};
use jobmesh_pubsub::{Message, Node};
use jobmesh_runtime::{JobRunner, Strand};
use parking_lot::{Condvar, Mutex};

use crate::error::RecorderError;
use crate::kv_store::{KvStore, SledKvStore};
use crate::record_file::{RecordFile, StoreOpener};
use crate::rolling::{RollingHelper, RollingPolicy};

/// Reported to snapshot callbacks, spec.md §4.K.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub snapshot_dir: PathBuf,
    pub success: bool,
}

type SnapshotCallback = Arc<dyn Fn(&SnapshotInfo, &SnapshotIntervalConfig) + Send + Sync>;

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

fn record_dir_name(pid: u32, now_unix_ns: i64) -> String {
    let secs = now_unix_ns.div_euclid(1_000_000_000);
    let datetime = humantime_like_utc(secs);
    format!("record.{datetime}.pid.{pid}")
}

fn snapshot_dir_name(now_unix_ns: i64) -> String {
    let secs = now_unix_ns.div_euclid(1_000_000_000);
    humantime_like_utc(secs)
}

/// `YYYYMMDD-HHMMSS` in UTC, matching the source's `%Y%m%d-%H%M%S` format
/// without pulling in a datetime crate the rest of the stack doesn't use.
fn humantime_like_utc(unix_secs: i64) -> String {
    const SECS_PER_DAY: i64 = 86_400;
    let days = unix_secs.div_euclid(SECS_PER_DAY);
    let mut secs_of_day = unix_secs.rem_euclid(SECS_PER_DAY);
    let hour = secs_of_day / 3600;
    secs_of_day %= 3600;
    let minute = secs_of_day / 60;
    let second = secs_of_day % 60;

    let (year, month, day) = civil_from_days(days);
    format!("{year:04}{month:02}{day:02}-{hour:02}{minute:02}{second:02}")
}

/// Howard Hinnant's days-since-epoch -> civil date algorithm, the same
/// kind of dependency-free calendar math `chrono` uses internally.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if month <= 2 { y + 1 } else { y };
    (year, month, day)
}

/// One registered channel: the open segment and the subscription that
/// feeds it, kept alive for the recorder's lifetime.
struct Channel {
    file: Arc<RecordFile>,
}

struct SnapshotState {
    shutdown: AtomicBool,
    mutex: Mutex<bool>,
    cv: Condvar,
    paths: Mutex<std::collections::VecDeque<PathBuf>>,
}

/// `{ record_dir, record_strand, files, snapshot_worker? }` from spec.md
/// §3/§4.K.
pub struct Recorder<C: Clock = SystemClock> {
    node: Arc<Node>,
    record_dir: Mutex<PathBuf>,
    record_strand: Arc<Strand>,
    channels: Mutex<Vec<Channel>>,
    clock: C,
    interval: Option<SnapshotIntervalConfig>,
    snapshot: Arc<SnapshotState>,
    snapshot_thread: Mutex<Option<JoinHandle<()>>>,
    pre_start: Mutex<Option<SnapshotCallback>>,
    post_finish: Mutex<Option<SnapshotCallback>>,
}

impl Recorder<SystemClock> {
    /// Builds a recorder rooted at `config.record_dir / record.<ts>.pid.<pid>`,
    /// using the real system clock and PID (spec.md's `RecordDirNameGenerator`).
    pub fn new(config: RecorderConfig, runner: &JobRunner) -> Result<Arc<Self>, RecorderError> {
        Self::with_clock(config, runner, SystemClock)
    }
}

impl<C: Clock + 'static> Recorder<C> {
    pub fn with_clock(config: RecorderConfig, runner: &JobRunner, clock: C) -> Result<Arc<Self>, RecorderError> {
        let pid = std::process::id();
        let record_dir = config.record_dir.join(record_dir_name(pid, clock.now_unix_ns()));
        std::fs::create_dir_all(&record_dir)
            .map_err(|source| RecorderError::CreateDir { path: record_dir.clone(), source })?;

        if config.snapshot_intervals.len() > 1 {
            tracing::warn!(
                count = config.snapshot_intervals.len(),
                "more than one snapshot interval configured; multi-interval snapshotting is not supported, using the last one"
            );
        }
        let interval = config.snapshot_intervals.last().cloned();

        let recorder = Arc::new(Self {
            node: Arc::new(Node::new(runner)),
            record_dir: Mutex::new(record_dir),
            record_strand: runner.make_strand(),
            channels: Mutex::new(Vec::new()),
            clock,
            interval,
            snapshot: Arc::new(SnapshotState {
                shutdown: AtomicBool::new(false),
                mutex: Mutex::new(false),
                cv: Condvar::new(),
                paths: Mutex::new(std::collections::VecDeque::new()),
            }),
            snapshot_thread: Mutex::new(None),
            pre_start: Mutex::new(None),
            post_finish: Mutex::new(None),
        });

        if recorder.interval.is_some() {
            recorder.start_snapshot_worker();
        }

        Ok(recorder)
    }

    pub fn get_record_dir(&self) -> PathBuf {
        self.record_dir.lock().clone()
    }

    pub fn set_snapshot_pre_start_callback(&self, callback: SnapshotCallback) {
        *self.pre_start.lock() = Some(callback);
    }

    pub fn set_snapshot_post_finish_callback(&self, callback: SnapshotCallback) {
        *self.post_finish.lock() = Some(callback);
    }

    /// Opens a record file for `M` at sub-id `sub_id` and subscribes to
    /// its channel, serializing each message and writing it through the
    /// record strand.
    pub fn register_channel<M: Message>(
        self: &Arc<Self>,
        sub_id: u64,
        alias: Option<String>,
    ) -> Result<(), RecorderError> {
        let type_name = std::any::type_name::<M>();
        let file_name = sanitized_file_name(type_name, sub_id);
        let path = self.get_record_dir().join(&file_name);
        let rolling = RollingPolicy::new(RollingHelper::none(), {
            let path = path.clone();
            Arc::new(move || path.clone())
        });
        let file = Arc::new(RecordFile::new(path, alias, rolling, sled_opener()));

        self.channels.lock().push(Channel { file: Arc::clone(&file) });

        let clock = self.clock.clone();
        self.node
            .subscribe(sub_id, move |msg: &M| {
                let bytes = msg.to_bytes();
                if let Err(error) = file.write(&clock, &bytes) {
                    tracing::error!(%error, "failed to write recorded message, dropping it");
                }
            }, Some(Arc::clone(&self.record_strand)))
            .map_err(RecorderError::from)
    }

    fn start_snapshot_worker(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let interval = this.interval.clone().expect("snapshot worker only started when an interval is configured");
        let period = Duration::from_secs(interval.period_sec.max(1));
        let snapshot = Arc::clone(&this.snapshot);

        let handle = std::thread::spawn(move || {
            let mut wake_up = std::time::Instant::now() + period;
            const EPSILON: Duration = Duration::from_millis(100);
            loop {
                if snapshot.shutdown.load(Ordering::Acquire) {
                    break;
                }
                if std::time::Instant::now() <= wake_up + EPSILON {
                    this.make_snapshot(&interval);
                }
                wake_up += period;

                let mut guard = snapshot.mutex.lock();
                let now = std::time::Instant::now();
                if wake_up > now {
                    snapshot.cv.wait_for(&mut guard, wake_up - now);
                }
                if snapshot.shutdown.load(Ordering::Acquire) {
                    break;
                }
            }
        });
        *self.snapshot_thread.lock() = Some(handle);
    }

    /// Runs one snapshot cycle synchronously on the record strand,
    /// blocking the snapshot-worker thread until it finishes (spec.md
    /// §4.K step 2: "meanwhile the main thread waits on the cv").
    fn make_snapshot(self: &Arc<Self>, interval: &SnapshotIntervalConfig) {
        let done = Arc::new((Mutex::new(false), Condvar::new()));
        let this = Arc::clone(self);
        let interval = interval.clone();
        let done_job = Arc::clone(&done);
        self.record_strand.add_job(Box::new(move || {
            this.generate_snapshot(&interval);
            let (mutex, cv) = done_job.as_ref();
            *mutex.lock() = true;
            cv.notify_all();
        }));

        let (mutex, cv) = done.as_ref();
        let mut guard = mutex.lock();
        while !*guard {
            cv.wait(&mut guard);
        }
    }

    fn generate_snapshot(&self, interval: &SnapshotIntervalConfig) {
        if let Err(error) = self.generate_snapshot_impl(interval) {
            tracing::error!(%error, interval = %interval.name, "snapshot generation failed, skipping this cycle");
        }
    }

    fn generate_snapshot_impl(&self, interval: &SnapshotIntervalConfig) -> std::io::Result<()> {
        let channels = self.channels.lock();
        for channel in channels.iter() {
            let _ = channel.file.close();
        }

        let record_dir = self.get_record_dir();
        let parent = record_dir.parent().unwrap_or(Path::new("."));
        let interval_dir = parent.join("Snapshot").join(&interval.name);
        std::fs::create_dir_all(&interval_dir)?;

        let snapshot_dir = interval_dir.join(snapshot_dir_name(self.clock.now_unix_ns()));
        copy_dir_recursive(&record_dir, &snapshot_dir)?;

        let info = SnapshotInfo { snapshot_dir: snapshot_dir.clone(), success: true };
        if let Some(callback) = self.pre_start.lock().as_ref() {
            callback(&info, interval);
        }

        let mut paths = self.snapshot.paths.lock();
        paths.push_back(snapshot_dir);
        while paths.len() as u64 > interval.max_num_of_copies {
            if let Some(oldest) = paths.pop_front() {
                if let Err(error) = std::fs::remove_dir_all(&oldest) {
                    tracing::error!(%error, path = %oldest.display(), "failed to remove oldest snapshot copy");
                }
            }
        }
        drop(paths);

        if let Some(callback) = self.post_finish.lock().as_ref() {
            callback(&info, interval);
        }

        for channel in channels.iter() {
            let _ = channel.file.open();
        }
        Ok(())
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dst_path = dst.join(entry.file_name());
        if file_type.is_symlink() {
            continue;
        } else if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &dst_path)?;
        } else {
            std::fs::copy(entry.path(), &dst_path)?;
        }
    }
    Ok(())
}

impl<C: Clock> Drop for Recorder<C> {
    fn drop(&mut self) {
        self.snapshot.shutdown.store(true, Ordering::Release);
        self.snapshot.cv.notify_all();
        if let Some(handle) = self.snapshot_thread.lock().take() {
            let _ = handle.join();
        }

        for channel in self.channels.lock().drain(..) {
            let _ = channel.file.compact();
            let _ = channel.file.close();
        }

        let record_dir = self.get_record_dir();
        if std::fs::read_dir(&record_dir).map(|mut d| d.next().is_none()).unwrap_or(false) {
            let _ = std::fs::remove_dir(&record_dir);
        }
    }
}

#[cfg(test)]
#[path = "recorder_tests.rs"]
mod tests;
