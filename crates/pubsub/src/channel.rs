// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Channel` is the `(TypeTag, sub_id)` pair that identifies a logical
//! topic, per spec.md §3. Rather than a language-reflection handle (the
//! source's mechanism), each concrete message type gets a stable tag via
//! [`std::any::TypeId`] — two distinct Rust types are guaranteed distinct
//! `TypeId`s, which is exactly the invariant spec.md §3 requires.

use std::any::TypeId;

use crate::message::Message;

/// Process-stable identifier for a concrete message type.
pub type TypeTag = TypeId;

/// Returns the stable [`TypeTag`] for message type `M`.
pub fn type_tag_of<M: Message>() -> TypeTag {
    TypeId::of::<M>()
}

/// `(TypeTag, sub_id)`. Two subscriptions on the same `Channel` address
/// the same logical topic regardless of which `Node` registered them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel {
    pub type_tag: TypeTag,
    pub sub_id: u64,
}

impl Channel {
    pub fn of<M: Message>(sub_id: u64) -> Self {
        Self { type_tag: type_tag_of::<M>(), sub_id }
    }
}
