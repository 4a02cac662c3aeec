// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Node` owns subscriptions and publishes into the [`SubscriptionMap`],
//! spec.md §4.G. A node is bound to a [`JobRunner`] by weak reference;
//! `publish` stamps the sub-id and fans out through the global map, which
//! calls back into `dispatch` (this node's [`DispatchTarget`] impl) once
//! per subscribed channel to enqueue the callback as a job.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use jobmesh_core::CoreError;
use jobmesh_runtime::{AliveToken, JobRunner, Strand, WeakJobRunner};
use parking_lot::RwLock;

use crate::channel::Channel;
use crate::message::Message;
use crate::subscription_map::{DispatchTarget, SubscriptionMap};

/// Process-unique identity for a `Node`, used to detect duplicate
/// subscriptions and to remove the right entry on unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

fn next_node_id() -> NodeId {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    NodeId(COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[derive(Clone)]
enum Invoke {
    Plain(Arc<dyn Fn(&dyn Any) + Send + Sync>),
    WithToken(Arc<dyn Fn(&dyn Any, AliveToken) + Send + Sync>),
}

struct SubscriptionEntry {
    invoke: Invoke,
    strand: Option<Arc<Strand>>,
}

struct NodeInner {
    id: NodeId,
    runner: WeakJobRunner,
    subscriptions: RwLock<HashMap<Channel, SubscriptionEntry>>,
}

impl DispatchTarget for NodeInner {
    fn id(&self) -> NodeId {
        self.id
    }

    /// Looks up this node's callback for `channel` and enqueues a job that
    /// invokes it with `payload` — through the registered strand if any,
    /// otherwise directly on the runner. A runner that has been dropped is
    /// logged and skipped (spec.md §4.F's failure model), not a panic.
    fn dispatch(&self, channel: Channel, payload: Arc<dyn Any + Send + Sync>) {
        let (invoke, strand) = {
            let subscriptions = self.subscriptions.read();
            let Some(entry) = subscriptions.get(&channel) else {
                tracing::warn!(?channel, node_id = ?self.id, "dispatch: node has no subscription for this channel");
                return;
            };
            (entry.invoke.clone(), entry.strand.clone())
        };

        match invoke {
            Invoke::Plain(f) => {
                let job: Box<dyn FnOnce() + Send> = Box::new(move || f(payload.as_ref()));
                self.submit(strand, job);
            }
            Invoke::WithToken(f) => self.submit_with_token(strand, move |token| f(payload.as_ref(), token)),
        }
    }
}

impl NodeInner {
    fn submit(&self, strand: Option<Arc<Strand>>, job: Box<dyn FnOnce() + Send>) {
        match strand {
            Some(strand) => strand.add_job(job),
            None => match self.runner.upgrade() {
                Some(runner) => {
                    runner.add_job(job);
                }
                None => tracing::error!(node_id = ?self.id, "dispatch: node's runner has been dropped"),
            },
        }
    }

    fn submit_with_token(&self, strand: Option<Arc<Strand>>, job: impl FnOnce(AliveToken) + Send + 'static) {
        match strand {
            Some(strand) => strand.add_job_with_token(job),
            None => match self.runner.upgrade() {
                Some(runner) => {
                    let hint = runner.default_scheduler_hint();
                    runner.add_job_with_token(job, hint);
                }
                None => tracing::error!(node_id = ?self.id, "dispatch: node's runner has been dropped"),
            },
        }
    }
}

/// A node owned by the application and bound to a [`JobRunner`]. Construct
/// with [`Node::new`]; subscribe with one of the `subscribe*` methods;
/// publish with [`Node::publish`]. Dropping a `Node` unsubscribes it from
/// every channel it holds, per spec.md §4.G.
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    pub fn new(runner: &JobRunner) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id: next_node_id(),
                runner: runner.downgrade(),
                subscriptions: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Registers `callback` for `channel`, serialized through `strand` if
    /// given. Fails with [`CoreError::DuplicateSubscription`] if this node
    /// already has a subscription for the channel — spec.md §9 resolves
    /// the "what if both callback shapes are registered" ambiguity by
    /// requiring exactly one per (node, channel).
    pub fn subscribe<M: Message>(
        &self,
        sub_id: u64,
        callback: impl Fn(&M) + Send + Sync + 'static,
        strand: Option<Arc<Strand>>,
    ) -> Result<(), CoreError> {
        let invoke: Arc<dyn Fn(&dyn Any) + Send + Sync> = Arc::new(move |payload: &dyn Any| {
            let msg = payload.downcast_ref::<M>().expect("type tag guarantees this downcast");
            callback(msg);
        });
        self.register(Channel::of::<M>(sub_id), strand, Invoke::Plain(invoke))
    }

    /// `allow_concurrency = false` creates and binds a private strand so
    /// this channel's callbacks never overlap; `true` subscribes with no
    /// strand.
    pub fn subscribe_with_concurrency<M: Message>(
        &self,
        sub_id: u64,
        callback: impl Fn(&M) + Send + Sync + 'static,
        allow_concurrency: bool,
    ) -> Result<(), CoreError> {
        let strand = if allow_concurrency {
            None
        } else {
            let runner = self.inner.runner.upgrade().ok_or(CoreError::RunnerGone)?;
            Some(runner.make_strand())
        };
        self.subscribe(sub_id, callback, strand)
    }

    /// Registers a callback that accepts an [`AliveToken`]; strand
    /// advancement (if `strand` is set) waits for every clone of the token
    /// to drop before admitting the channel's next job.
    pub fn subscribe_with_token<M: Message>(
        &self,
        sub_id: u64,
        callback: impl Fn(&M, AliveToken) + Send + Sync + 'static,
        strand: Option<Arc<Strand>>,
    ) -> Result<(), CoreError> {
        let invoke: Arc<dyn Fn(&dyn Any, AliveToken) + Send + Sync> = Arc::new(move |payload: &dyn Any, token| {
            let msg = payload.downcast_ref::<M>().expect("type tag guarantees this downcast");
            callback(msg, token);
        });
        self.register(Channel::of::<M>(sub_id), strand, Invoke::WithToken(invoke))
    }

    fn register(&self, channel: Channel, strand: Option<Arc<Strand>>, invoke: Invoke) -> Result<(), CoreError> {
        {
            let mut subscriptions = self.inner.subscriptions.write();
            if subscriptions.contains_key(&channel) {
                return Err(CoreError::DuplicateSubscription);
            }
            subscriptions.insert(channel, SubscriptionEntry { invoke, strand });
        }

        if !SubscriptionMap::global().subscribe(channel, Arc::clone(&self.inner) as Arc<dyn DispatchTarget>) {
            self.inner.subscriptions.write().remove(&channel);
            return Err(CoreError::DuplicateSubscription);
        }
        Ok(())
    }

    /// Removes this node's subscription for `channel`, if any.
    pub fn unsubscribe(&self, channel: Channel) -> Result<(), CoreError> {
        let removed = self.inner.subscriptions.write().remove(&channel).is_some();
        if !removed {
            return Err(CoreError::NotSubscribed);
        }
        SubscriptionMap::global().unsubscribe(channel, self.inner.id);
        Ok(())
    }

    /// Stamps `msg`'s channel with `sub_id` and fans it out through the
    /// global [`SubscriptionMap`].
    pub fn publish<M: Message>(&self, sub_id: u64, msg: M) {
        let channel = Channel::of::<M>(sub_id);
        let payload: Arc<dyn Any + Send + Sync> = Arc::new(msg);
        SubscriptionMap::global().dispatch(channel, payload);
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let channels: Vec<Channel> = self.inner.subscriptions.read().keys().copied().collect();
        for channel in channels {
            SubscriptionMap::global().unsubscribe(channel, self.inner.id);
        }
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
