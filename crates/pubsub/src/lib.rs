// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jobmesh-pubsub: the type-indexed publish/subscribe fabric sitting on
//! top of jobmesh-runtime.
//!
//! A [`Channel`] is a `(TypeTag, sub_id)` pair. The process-wide
//! [`SubscriptionMap`] tracks which [`Node`]s subscribe to which channels;
//! `Node::publish` hands a message to the map, which enqueues one job per
//! subscriber onto that subscriber's runner (through its strand, if it
//! registered one) rather than invoking any callback itself.

mod channel;
mod message;
mod node;
mod subscription_map;

pub use channel::{type_tag_of, Channel, TypeTag};
pub use message::{Message, MessageDecodeError};
pub use node::{Node, NodeId};
pub use subscription_map::SubscriptionMap;
