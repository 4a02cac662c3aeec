// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The capability interface a concrete payload type implements to be
//! publishable: a type tag (via [`crate::channel::type_tag_of`]) plus a
//! serialization pair known at the subscribe-site's type parameter,
//! replacing the source's `CRMessage<T>` CRTP hierarchy (spec.md §9).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageDecodeError {
    #[error("failed to decode message payload: {0}")]
    Malformed(String),
}

/// A publishable payload type. `to_bytes`/`from_bytes` are used by the
/// recorder's write path and the replayer's read path; in-process
/// dispatch never serializes (spec.md §3's `Message` data model).
pub trait Message: Send + Sync + 'static {
    fn to_bytes(&self) -> Vec<u8>;

    fn from_bytes(bytes: &[u8]) -> Result<Self, MessageDecodeError>
    where
        Self: Sized;
}
