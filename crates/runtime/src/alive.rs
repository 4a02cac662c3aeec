// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A clonable handle whose *last* drop fires a release callback — the
//! mechanism a [`crate::Strand`] uses to defer "this job is done" past a
//! callback's own return, for callbacks that spawn sub-jobs and hand them a
//! clone of the token.

use std::sync::Arc;

use parking_lot::Mutex;

type ReleaseFn = Box<dyn FnOnce() + Send>;

struct Inner {
    on_release: Mutex<Option<ReleaseFn>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(release) = self.on_release.lock().take() {
            release();
        }
    }
}

/// Clone freely; the `on_release` closure given to [`AliveToken::new`] runs
/// exactly once, when the last clone (including the original) is dropped.
#[derive(Clone)]
pub struct AliveToken {
    inner: Arc<Inner>,
}

impl AliveToken {
    pub fn new(on_release: impl FnOnce() + Send + 'static) -> Self {
        Self { inner: Arc::new(Inner { on_release: Mutex::new(Some(Box::new(on_release))) }) }
    }
}
