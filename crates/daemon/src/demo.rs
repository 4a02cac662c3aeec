// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two demo message types and a periodic publisher, wired in `main.rs` so
//! the daemon binary has something concrete to record or replay. Not part
//! of the library surface; these exist only to exercise the runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use jobmesh_pubsub::{Message, MessageDecodeError, Node};
use serde::{Deserialize, Serialize};

pub const HEARTBEAT_SUB_ID: u64 = 1;
pub const LOG_LINE_SUB_ID: u64 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub seq: u64,
    pub unix_ns: i64,
}

impl Message for Heartbeat {
    fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, MessageDecodeError> {
        serde_json::from_slice(bytes).map_err(|e| MessageDecodeError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub text: String,
}

impl Message for LogLine {
    fn to_bytes(&self) -> Vec<u8> {
        self.text.as_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, MessageDecodeError> {
        Ok(LogLine { text: String::from_utf8_lossy(bytes).into_owned() })
    }
}

/// Publishes a `Heartbeat` once a second and a `LogLine` every five beats,
/// on its own thread, until `shutdown` is set. Used by `record` mode to
/// give the recorder something to persist.
pub fn spawn_publisher(node: std::sync::Arc<Node>, clock: impl jobmesh_core::Clock + 'static, shutdown: std::sync::Arc<std::sync::atomic::AtomicBool>) {
    std::thread::spawn(move || {
        let seq = AtomicU64::new(0);
        while !shutdown.load(Ordering::Acquire) {
            let n = seq.fetch_add(1, Ordering::Relaxed);
            node.publish(HEARTBEAT_SUB_ID, Heartbeat { seq: n, unix_ns: clock.now_unix_ns() });
            if n % 5 == 0 {
                node.publish(LOG_LINE_SUB_ID, LogLine { text: format!("heartbeat {n}") });
            }
            std::thread::sleep(Duration::from_secs(1));
        }
    });
}
