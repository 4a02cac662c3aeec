// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jobmesh_runtime::{JobRunner, JobRunnerConfig};

use super::*;
use crate::message::MessageDecodeError;
use crate::node::Node;
use crate::Message;

struct Probe {
    id: NodeId,
    hits: AtomicUsize,
}

fn runner() -> JobRunner {
    JobRunner::new(JobRunnerConfig { thread_num: 1, always_active_thread_num: 1, active_time: Duration::from_millis(50) }).expect("spawn test runner")
}

/// Mints a fresh, process-unique `NodeId` by building (and immediately
/// discarding) a real `Node` — `NodeId`'s only constructor is private to
/// the `node` module, so this sibling module borrows one rather than
/// fabricating an identity of its own.
fn fresh_node_id(runner: &JobRunner) -> NodeId {
    Node::new(runner).id()
}

impl Probe {
    fn new(runner: &JobRunner) -> Arc<Self> {
        Arc::new(Self { id: fresh_node_id(runner), hits: AtomicUsize::new(0) })
    }
}

impl DispatchTarget for Probe {
    fn id(&self) -> NodeId {
        self.id
    }

    fn dispatch(&self, _channel: Channel, _payload: Arc<dyn Any + Send + Sync>) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }
}

struct Ping;
impl Message for Ping {
    fn to_bytes(&self) -> Vec<u8> {
        Vec::new()
    }
    fn from_bytes(_bytes: &[u8]) -> Result<Self, MessageDecodeError> {
        Ok(Ping)
    }
}

fn channel(sub_id: u64) -> Channel {
    Channel::of::<Ping>(sub_id)
}

#[test]
fn subscribe_then_dispatch_reaches_the_subscriber() {
    let r = runner();
    let map = SubscriptionMap::default();
    let probe = Probe::new(&r);
    let ch = channel(1);
    assert!(map.subscribe(ch, Arc::clone(&probe) as Arc<dyn DispatchTarget>));

    map.dispatch(ch, Arc::new(Ping));
    assert_eq!(probe.hits.load(Ordering::Relaxed), 1);
}

#[test]
fn duplicate_subscribe_is_rejected() {
    let r = runner();
    let map = SubscriptionMap::default();
    let probe = Probe::new(&r);
    let ch = channel(2);
    assert!(map.subscribe(ch, Arc::clone(&probe) as Arc<dyn DispatchTarget>));
    assert!(!map.subscribe(ch, Arc::clone(&probe) as Arc<dyn DispatchTarget>));
    assert_eq!(map.subscriber_count(ch), 1);
}

#[test]
fn unsubscribe_removes_the_node_and_stops_dispatch() {
    let r = runner();
    let map = SubscriptionMap::default();
    let probe = Probe::new(&r);
    let ch = channel(3);
    map.subscribe(ch, Arc::clone(&probe) as Arc<dyn DispatchTarget>);
    map.unsubscribe(ch, probe.id());
    assert_eq!(map.subscriber_count(ch), 0);

    map.dispatch(ch, Arc::new(Ping));
    assert_eq!(probe.hits.load(Ordering::Relaxed), 0);
}

#[test]
fn unsubscribe_of_an_unknown_channel_is_a_harmless_no_op() {
    let r = runner();
    let map = SubscriptionMap::default();
    map.unsubscribe(channel(99), fresh_node_id(&r));
}

#[test]
fn unsubscribe_of_a_node_not_subscribed_is_a_harmless_no_op() {
    let r = runner();
    let map = SubscriptionMap::default();
    let probe = Probe::new(&r);
    let ch = channel(100);
    map.subscribe(ch, Arc::clone(&probe) as Arc<dyn DispatchTarget>);
    map.unsubscribe(ch, fresh_node_id(&r));
    assert_eq!(map.subscriber_count(ch), 1);
}

#[test]
fn dispatch_to_an_unknown_channel_is_a_no_op() {
    let map = SubscriptionMap::default();
    map.dispatch(channel(4), Arc::new(Ping));
    assert_eq!(map.latest_delivered_time_ns(channel(4)), 0);
}

#[test]
fn dispatch_fans_out_to_every_subscriber() {
    let r = runner();
    let map = SubscriptionMap::default();
    let a = Probe::new(&r);
    let b = Probe::new(&r);
    let ch = channel(5);
    map.subscribe(ch, Arc::clone(&a) as Arc<dyn DispatchTarget>);
    map.subscribe(ch, Arc::clone(&b) as Arc<dyn DispatchTarget>);

    map.dispatch(ch, Arc::new(Ping));

    assert_eq!(a.hits.load(Ordering::Relaxed), 1);
    assert_eq!(b.hits.load(Ordering::Relaxed), 1);
}

#[test]
fn dispatch_advances_the_latest_delivered_timestamp() {
    let r = runner();
    let map = SubscriptionMap::default();
    let probe = Probe::new(&r);
    let ch = channel(6);
    map.subscribe(ch, Arc::clone(&probe) as Arc<dyn DispatchTarget>);

    assert_eq!(map.latest_delivered_time_ns(ch), 0);
    map.dispatch(ch, Arc::new(Ping));
    assert!(map.latest_delivered_time_ns(ch) > 0);
}
