// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single ordered-log segment over a [`KvStore`], spec.md §4.J. Each
//! write mints a fresh [`RecordKey`], asks the [`RollingPolicy`] whether
//! to roll first, and writes through whichever codec the currently-open
//! segment uses.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use jobmesh_core::Clock;
use parking_lot::Mutex;

use crate::error::RecorderError;
use crate::kv_store::KvStore;
use crate::record_key::RecordKey;
use crate::rolling::{RollMeta, RollingPolicy};

/// Which codec a segment's keys are encoded with. A segment opened fresh
/// always uses [`Self::Primary`]; [`Self::Legacy`] is only ever the
/// result of re-opening a pre-existing segment that predates the ASCII
/// framing (spec.md §4.H, SPEC_FULL §4.N).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCodec {
    Primary,
    Legacy,
}

/// Opens a [`KvStore`] at a given path. Boxed so `RecordFile` doesn't need
/// a generic parameter per storage backend; in production this wraps
/// [`crate::kv_store::SledKvStore::open`].
pub type StoreOpener = std::sync::Arc<dyn Fn(&Path) -> Result<Box<dyn KvStore>, RecorderError> + Send + Sync>;

struct OpenSegment {
    store: Box<dyn KvStore>,
    codec: KeyCodec,
}

/// `{ path, kv_store_handle?, rolling_helper, symlink? }` from spec.md §3.
/// The store handle is `None` while closed; writes during that window are
/// impossible by construction (callers always go through [`Self::write`],
/// which opens lazily).
pub struct RecordFile {
    path: Mutex<PathBuf>,
    link_name: Option<String>,
    rolling: RollingPolicy,
    opener: StoreOpener,
    segment: Mutex<Option<OpenSegment>>,
    wrote_anything: AtomicBool,
}

impl RecordFile {
    pub fn new(path: impl Into<PathBuf>, link_name: Option<String>, rolling: RollingPolicy, opener: StoreOpener) -> Self {
        Self {
            path: Mutex::new(path.into()),
            link_name,
            rolling,
            opener,
            segment: Mutex::new(None),
            wrote_anything: AtomicBool::new(false),
        }
    }

    pub fn get_file_path(&self) -> PathBuf {
        self.path.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        self.segment.lock().is_some()
    }

    /// Opens the current segment's store if not already open.
    pub fn open(&self) -> Result<(), RecorderError> {
        let mut segment = self.segment.lock();
        if segment.is_some() {
            return Ok(());
        }
        let path = self.path.lock().clone();
        std::fs::create_dir_all(&path).map_err(|source| RecorderError::CreateDir { path: path.clone(), source })?;
        if let Some(link_name) = &self.link_name {
            let parent = path.parent().unwrap_or(Path::new("."));
            let link_path = parent.join(link_name);
            if !link_path.exists() {
                let target = path.file_name().unwrap_or_default();
                #[cfg(unix)]
                let _ = std::os::unix::fs::symlink(target, &link_path);
            }
        }
        let store = (self.opener)(&path)?;
        let codec = Self::detect_codec(store.as_ref())?;
        *segment = Some(OpenSegment { store, codec });
        Ok(())
    }

    /// Probes the first key in an opened store to decide which codec wrote
    /// it: tries the primary ASCII framing first and only falls back to
    /// the legacy 16-byte layout if that fails to parse (spec.md §4.H,
    /// §4.J). An empty store (a fresh segment) has nothing to probe and
    /// defaults to the primary codec, matching every writer in this crate.
    fn detect_codec(store: &dyn KvStore) -> Result<KeyCodec, RecorderError> {
        let Some((first_key, _)) = store.iter()?.next() else {
            return Ok(KeyCodec::Primary);
        };
        if RecordKey::from_bytes(&first_key).is_ok() {
            Ok(KeyCodec::Primary)
        } else {
            Ok(KeyCodec::Legacy)
        }
    }

    /// Closes the current segment. If nothing was ever written to it, its
    /// directory is removed (spec.md §4.J).
    pub fn close(&self) -> Result<(), RecorderError> {
        let mut segment = self.segment.lock();
        let Some(open) = segment.take() else {
            return Ok(());
        };
        open.store.close()?;
        if !self.wrote_anything.swap(false, Ordering::AcqRel) {
            let path = self.path.lock().clone();
            let _ = std::fs::remove_dir_all(&path);
        }
        Ok(())
    }

    pub fn empty(&self) -> bool {
        !self.wrote_anything.load(Ordering::Acquire)
    }

    /// Coalesces on-disk state. Called once at final close (spec.md §4.J).
    pub fn compact(&self) -> Result<(), RecorderError> {
        if let Some(open) = self.segment.lock().as_ref() {
            open.store.compact()?;
        }
        Ok(())
    }

    /// Mints a fresh key via [`RecordKey::make`] and writes `value`,
    /// rolling to a new segment first if the rolling policy says to.
    pub fn write(&self, clock: &impl Clock, value: &[u8]) -> Result<(), RecorderError> {
        self.open()?;
        let now_unix_ns = clock.now_unix_ns();
        let meta = RollMeta { now_unix_ns, value_size: value.len() as u64 };
        if self.rolling.need_to_roll(meta) {
            self.roll(now_unix_ns)?;
            self.open()?;
        }
        let key = RecordKey::make(clock);
        self.write_with_key(key, value)?;
        self.rolling.update(meta);
        Ok(())
    }

    fn write_with_key(&self, key: RecordKey, value: &[u8]) -> Result<(), RecorderError> {
        let mut segment = self.segment.lock();
        let open = segment.as_mut().expect("write_with_key called without an open segment");
        open.store.put(&key.to_bytes(), value)?;
        self.wrote_anything.store(true, Ordering::Release);
        Ok(())
    }

    fn roll(&self, now_unix_ns: i64) -> Result<(), RecorderError> {
        self.close()?;
        let new_path = self.rolling.make_new_record_dir_name();
        *self.path.lock() = new_path;
        self.rolling.reset(now_unix_ns);
        Ok(())
    }

    /// Returns entries in ascending key order. Keys are decoded through
    /// the legacy codec if the segment was opened as a legacy segment.
    pub fn iterate(&self) -> Result<Vec<(RecordKey, Vec<u8>)>, RecorderError> {
        self.open()?;
        let segment = self.segment.lock();
        let open = segment.as_ref().expect("iterate called without an open segment");
        let mut out = Vec::new();
        for (key_bytes, value) in open.store.iter()? {
            let key = match open.codec {
                KeyCodec::Primary => RecordKey::from_bytes(&key_bytes)?,
                KeyCodec::Legacy => RecordKey::from_bytes_legacy(&key_bytes)?,
            };
            out.push((key, value));
        }
        out.sort_by(|a, b| RecordKey::compare(&a.0, &b.0));
        Ok(out)
    }
}

#[cfg(test)]
#[path = "record_file_tests.rs"]
mod tests;
