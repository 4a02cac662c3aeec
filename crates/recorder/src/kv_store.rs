// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `KvStore` capability spec.md §6 names as an external collaborator,
//! made concrete for SPEC_FULL (§4.M): `open`/`put`/an ordered forward
//! iterator/`compact`/`close`. [`SledKvStore`] is the on-disk
//! implementation, backed by the `kv` crate the way
//! `r3bl_core::storage::kv` wraps it; [`MemKvStore`] is a `BTreeMap`
//! stand-in for tests that don't need a filesystem.
//!
//! Keys and values are opaque bytes: `RecordFile` hands in `RecordKey`
//! encodings and serialized message payloads, never structured data, so
//! the store itself only needs to preserve byte-lexicographic order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kv::{Config, Store};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvStoreError {
    #[error("failed to open kv store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: kv::Error,
    },

    #[error("failed to write to kv store at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: kv::Error,
    },

    #[error("failed to iterate kv store at {path}: {source}")]
    Iterate {
        path: PathBuf,
        #[source]
        source: kv::Error,
    },
}

/// An ordered (ascending by key bytes) forward iterator over a store's
/// contents, yielding `(key, value)` byte pairs.
pub type KvIter<'a> = Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a>;

/// The injected storage engine a [`crate::record_file::RecordFile`] writes
/// through. Implementations own their comparator: `RecordFile` never
/// compares keys itself, it relies on the store returning entries in key
/// order.
pub trait KvStore: Send {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvStoreError>;

    fn iter(&self) -> Result<KvIter<'_>, KvStoreError>;

    /// Coalesces on-disk state. Called once at final close (spec.md §4.J).
    fn compact(&self) -> Result<(), KvStoreError>;

    fn close(&self) -> Result<(), KvStoreError>;

    fn path(&self) -> &Path;
}

/// `kv`-crate-backed (sled) store. Raw byte keys sort lexicographically
/// under sled's default ordering, which is exactly the order
/// [`crate::record_key::RecordKey::compare`] expects.
pub struct SledKvStore {
    path: PathBuf,
    store: Store,
    bucket: kv::Bucket<'static, kv::Raw, kv::Raw>,
}

const BUCKET_NAME: &str = "records";

impl SledKvStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, KvStoreError> {
        let path = path.into();
        std::fs::create_dir_all(&path).map_err(|e| KvStoreError::Open {
            path: path.clone(),
            source: kv::Error::Io(e),
        })?;
        let store = Store::new(Config::new(&path)).map_err(|source| KvStoreError::Open { path: path.clone(), source })?;
        let bucket = store
            .bucket::<kv::Raw, kv::Raw>(Some(BUCKET_NAME))
            .map_err(|source| KvStoreError::Open { path: path.clone(), source })?;
        Ok(Self { path, store, bucket })
    }
}

impl KvStore for SledKvStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvStoreError> {
        self.bucket
            .set(&kv::Raw::from(key), &kv::Raw::from(value))
            .map(|_| ())
            .map_err(|source| KvStoreError::Write { path: self.path.clone(), source })
    }

    fn iter(&self) -> Result<KvIter<'_>, KvStoreError> {
        let path = self.path.clone();
        let items: Result<Vec<(Vec<u8>, Vec<u8>)>, kv::Error> = self
            .bucket
            .iter()
            .map(|item| {
                let item = item?;
                let key: kv::Raw = item.key()?;
                let value: kv::Raw = item.value()?;
                Ok((key.to_vec(), value.to_vec()))
            })
            .collect();
        let items = items.map_err(|source| KvStoreError::Iterate { path, source })?;
        Ok(Box::new(items.into_iter()))
    }

    fn compact(&self) -> Result<(), KvStoreError> {
        self.bucket.flush().map_err(|source| KvStoreError::Write { path: self.path.clone(), source })
    }

    fn close(&self) -> Result<(), KvStoreError> {
        self.store.flush().map_err(|source| KvStoreError::Write { path: self.path.clone(), source })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// In-memory `BTreeMap`-backed store for unit tests that don't need a
/// filesystem, matching the teacher's `test-support` feature convention.
pub struct MemKvStore {
    path: PathBuf,
    data: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemKvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), data: Mutex::new(BTreeMap::new()) }
    }
}

impl KvStore for MemKvStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvStoreError> {
        self.data.lock().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn iter(&self) -> Result<KvIter<'_>, KvStoreError> {
        let snapshot: Vec<(Vec<u8>, Vec<u8>)> =
            self.data.lock().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Ok(Box::new(snapshot.into_iter()))
    }

    fn compact(&self) -> Result<(), KvStoreError> {
        Ok(())
    }

    fn close(&self) -> Result<(), KvStoreError> {
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "kv_store_tests.rs"]
mod tests;
