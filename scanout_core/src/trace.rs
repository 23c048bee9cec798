// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structured diagnostics for binding and composition.
//!
//! This module provides a [`TraceSink`] trait with one method per event. All
//! method bodies default to no-ops, so implementing only the events you care
//! about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.

use crate::flatten::FlatteningState;
use crate::hw::{ConnectorRef, CrtcId};
use crate::output::DisplayId;
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted after a pipeline bind attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindEvent {
    /// Logical display.
    pub display: DisplayId,
    /// Connector being bound.
    pub connector: ConnectorRef,
    /// Bound CRTC, or `None` if no pipeline was found.
    pub crtc: Option<CrtcId>,
    /// Overlay planes obtained.
    pub overlay_planes: u32,
    /// When the attempt finished.
    pub at: HostTime,
}

/// Emitted when a frame's composition has been built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompositionEvent {
    /// Logical display.
    pub display: DisplayId,
    /// Frame counter of the display.
    pub frame_index: u64,
    /// Hardware layers in the composition.
    pub layers: u32,
    /// Whether one of them is the client target.
    pub client_target: bool,
    /// When the composition was built.
    pub at: HostTime,
}

/// Emitted after an atomic commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitEvent {
    /// Logical display.
    pub display: DisplayId,
    /// Frame counter of the display.
    pub frame_index: u64,
    /// Test-only commit.
    pub test_only: bool,
    /// A mode was applied.
    pub modeset: bool,
    /// The kernel accepted the request.
    pub success: bool,
    /// When the commit returned.
    pub at: HostTime,
}

/// Emitted when a connection change is reported to the consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HotplugEvent {
    /// Logical display.
    pub display: DisplayId,
    /// New connection state.
    pub connected: bool,
    /// When the change was handled.
    pub at: HostTime,
}

/// Emitted when a display's flattening state changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlatteningEvent {
    /// Logical display.
    pub display: DisplayId,
    /// State after the change.
    pub state: FlatteningState,
    /// When the state changed.
    pub at: HostTime,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called after a pipeline bind attempt.
    fn on_bind(&mut self, e: &BindEvent) {
        _ = e;
    }

    /// Called when a composition has been built.
    fn on_composition(&mut self, e: &CompositionEvent) {
        _ = e;
    }

    /// Called after an atomic commit.
    fn on_commit(&mut self, e: &CommitEvent) {
        _ = e;
    }

    /// Called when a hotplug notification is sent.
    fn on_hotplug(&mut self, e: &HotplugEvent) {
        _ = e;
    }

    /// Called when a flattening state changes.
    fn on_flattening(&mut self, e: &FlatteningEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        Self::maybe(Some(sink))
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::maybe(None)
    }

    /// Creates a tracer from a sink that may not be installed.
    #[inline]
    #[must_use]
    pub fn maybe(sink: Option<&'a mut dyn TraceSink>) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`BindEvent`].
    #[inline]
    pub fn bind(&mut self, e: &BindEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_bind(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`CompositionEvent`].
    #[inline]
    pub fn composition(&mut self, e: &CompositionEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_composition(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`CommitEvent`].
    #[inline]
    pub fn commit(&mut self, e: &CommitEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_commit(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`HotplugEvent`].
    #[inline]
    pub fn hotplug(&mut self, e: &HotplugEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_hotplug(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FlatteningEvent`].
    #[inline]
    pub fn flattening(&mut self, e: &FlatteningEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_flattening(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::{ConnectorId, DeviceId};

    fn sample_commit() -> CommitEvent {
        CommitEvent {
            display: DisplayId::PRIMARY,
            frame_index: 9,
            test_only: false,
            modeset: true,
            success: true,
            at: HostTime(5_000),
        }
    }

    #[test]
    fn noop_sink_accepts_everything() {
        let mut sink = NoopSink;
        sink.on_commit(&sample_commit());
        sink.on_bind(&BindEvent {
            display: DisplayId::PRIMARY,
            connector: ConnectorRef {
                device: DeviceId(0),
                connector: ConnectorId(1),
            },
            crtc: None,
            overlay_planes: 0,
            at: HostTime(0),
        });
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        tracer.commit(&sample_commit());
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        use alloc::vec::Vec;

        struct RecordingSink {
            frames: Vec<u64>,
        }
        impl TraceSink for RecordingSink {
            fn on_commit(&mut self, e: &CommitEvent) {
                self.frames.push(e.frame_index);
            }
        }

        let mut sink = RecordingSink { frames: Vec::new() };
        let mut tracer = Tracer::new(&mut sink);
        tracer.commit(&sample_commit());
        drop(tracer);
        assert_eq!(sink.frames, [9], "one commit recorded");
    }
}
