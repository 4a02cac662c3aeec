// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The process-wide `(Channel -> subscribers)` registry, spec.md §4.F.
//! One instance per process (`SubscriptionMap::global`); reads (dispatch)
//! vastly outnumber writes (subscribe/unsubscribe), so a reader-favoring
//! RW lock is the right shape, per spec.md §9's design note.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};

use jobmesh_core::{Clock, SystemClock};
use parking_lot::RwLock;

use crate::channel::Channel;
use crate::node::NodeId;

/// A node's dispatch entry point, as seen by the subscription map. `Node`
/// is the only implementor; this trait exists so the map can hold
/// type-erased subscribers without knowing about any particular `Node`
/// generic parameter (there is none — `Node` itself is not generic, its
/// per-channel callbacks are type-erased internally).
pub(crate) trait DispatchTarget: Send + Sync {
    fn id(&self) -> NodeId;
    fn dispatch(&self, channel: Channel, payload: Arc<dyn Any + Send + Sync>);
}

struct ChannelEntry {
    subscribers: Vec<Arc<dyn DispatchTarget>>,
    latest_delivered_ns: AtomicI64,
}

impl ChannelEntry {
    fn new() -> Self {
        Self { subscribers: Vec::new(), latest_delivered_ns: AtomicI64::new(0) }
    }
}

/// The global `(Channel -> subscribers)` registry.
#[derive(Default)]
pub struct SubscriptionMap {
    channels: RwLock<HashMap<Channel, ChannelEntry>>,
}

static GLOBAL: OnceLock<SubscriptionMap> = OnceLock::new();

impl SubscriptionMap {
    /// The process-wide singleton. There is intentionally no way to
    /// construct a second instance — spec.md §4.F and §9 describe exactly
    /// one registry per process, not sharded by runner.
    pub fn global() -> &'static SubscriptionMap {
        GLOBAL.get_or_init(SubscriptionMap::default)
    }

    /// Appends `node` to `channel`'s subscriber list if it isn't already
    /// present. Returns `false` on a duplicate subscribe.
    pub(crate) fn subscribe(&self, channel: Channel, node: Arc<dyn DispatchTarget>) -> bool {
        let mut channels = self.channels.write();
        let entry = channels.entry(channel).or_insert_with(ChannelEntry::new);
        if entry.subscribers.iter().any(|existing| existing.id() == node.id()) {
            return false;
        }
        entry.subscribers.push(node);
        true
    }

    /// Removes `node_id` from `channel`'s subscriber list. A miss (the
    /// channel doesn't exist, or the node isn't subscribed) is logged and
    /// otherwise a no-op, per spec.md §4.F's failure model.
    pub(crate) fn unsubscribe(&self, channel: Channel, node_id: NodeId) {
        let mut channels = self.channels.write();
        let Some(entry) = channels.get_mut(&channel) else {
            tracing::warn!(?channel, "unsubscribe: channel has no subscribers");
            return;
        };
        let before = entry.subscribers.len();
        entry.subscribers.retain(|s| s.id() != node_id);
        if entry.subscribers.len() == before {
            tracing::warn!(?channel, ?node_id, "unsubscribe: node was not subscribed");
        }
    }

    /// Enqueues one dispatch per subscriber of `channel` and updates the
    /// channel's last-delivered timestamp. An unknown channel is silently
    /// a no-op (no subscribers) per spec.md §4.F.
    pub(crate) fn dispatch(&self, channel: Channel, payload: Arc<dyn Any + Send + Sync>) {
        let channels = self.channels.read();
        let Some(entry) = channels.get(&channel) else {
            return;
        };
        for subscriber in &entry.subscribers {
            subscriber.dispatch(channel, Arc::clone(&payload));
        }
        entry.latest_delivered_ns.store(SystemClock.now_unix_ns(), Ordering::Release);
    }

    /// Last time (nanoseconds) a message was dispatched on `channel`, or 0
    /// if the channel has never received one.
    pub fn latest_delivered_time_ns(&self, channel: Channel) -> i64 {
        let channels = self.channels.read();
        channels.get(&channel).map(|e| e.latest_delivered_ns.load(Ordering::Acquire)).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, channel: Channel) -> usize {
        self.channels.read().get(&channel).map(|e| e.subscribers.len()).unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "subscription_map_tests.rs"]
mod tests;
