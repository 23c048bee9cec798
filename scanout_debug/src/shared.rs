// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sinks that stay reachable after being handed to the composer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use scanout_core::trace::{
    BindEvent, CommitEvent, CompositionEvent, FlatteningEvent, HotplugEvent, TraceSink,
};

/// A [`TraceSink`] shared between the composer and the host.
///
/// Install one clone with `Hwc::set_trace_sink` and keep another to read the
/// inner sink, for example a [`RecorderSink`](crate::recorder::RecorderSink)
/// to export at the end of a session.
#[derive(Debug, Default)]
pub struct SharedSink<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SharedSink<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> SharedSink<S> {
    /// Wraps `sink`.
    pub fn new(sink: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sink)),
        }
    }

    /// Locks the inner sink. Events arriving meanwhile wait.
    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: TraceSink> TraceSink for SharedSink<S> {
    fn on_bind(&mut self, e: &BindEvent) {
        self.lock().on_bind(e);
    }

    fn on_composition(&mut self, e: &CompositionEvent) {
        self.lock().on_composition(e);
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.lock().on_commit(e);
    }

    fn on_hotplug(&mut self, e: &HotplugEvent) {
        self.lock().on_hotplug(e);
    }

    fn on_flattening(&mut self, e: &FlatteningEvent) {
        self.lock().on_flattening(e);
    }
}
