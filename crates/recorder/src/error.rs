// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the recorder and replayer, per spec.md §7: storage
//! I/O failures are logged and absorbed (the write is dropped, not
//! propagated to the publisher), while replay deserialization failures
//! skip just the offending message.

use thiserror::Error;

use crate::kv_store::KvStoreError;
use crate::record_key::RecordKeyError;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to open record file: {0}")]
    Storage(#[from] KvStoreError),

    #[error("failed to create record directory {path}: {source}")]
    CreateDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record key codec error: {0}")]
    Key(#[from] RecordKeyError),

    #[error("failed to subscribe record channel: {0}")]
    Subscribe(#[from] jobmesh_core::CoreError),
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to open record file for replay: {0}")]
    Storage(#[from] KvStoreError),

    #[error("failed to decode record key: {0}")]
    Key(#[from] RecordKeyError),

    #[error("failed to deserialize message payload: {0}")]
    Deserialize(#[from] jobmesh_pubsub::MessageDecodeError),

    #[error("failed to read record file for replay: {0}")]
    Read(#[from] RecorderError),
}
