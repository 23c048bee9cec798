// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are printed in microseconds on the monotonic clock.

use std::io::Write;

use scanout_core::time::HostTime;
use scanout_core::trace::{
    BindEvent, CommitEvent, CompositionEvent, FlatteningEvent, HotplugEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write + Send>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns the destination.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn us(t: HostTime) -> f64 {
    t.nanos() as f64 / 1000.0
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_bind(&mut self, e: &BindEvent) {
        let _ = match e.crtc {
            Some(crtc) => writeln!(
                self.writer,
                "[bind] display={} connector={}:{} crtc={} overlays={} at {:.1}µs",
                e.display,
                e.connector.device.0,
                e.connector.connector.0,
                crtc.0,
                e.overlay_planes,
                us(e.at),
            ),
            None => writeln!(
                self.writer,
                "[bind] display={} connector={}:{} FAILED at {:.1}µs",
                e.display,
                e.connector.device.0,
                e.connector.connector.0,
                us(e.at),
            ),
        };
    }

    fn on_composition(&mut self, e: &CompositionEvent) {
        let _ = writeln!(
            self.writer,
            "[composition] display={} frame={} layers={}{} at {:.1}µs",
            e.display,
            e.frame_index,
            e.layers,
            if e.client_target { " +client" } else { "" },
            us(e.at),
        );
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        let kind = if e.test_only { "test" } else { "commit" };
        let result = if e.success { "ok" } else { "REJECTED" };
        let _ = writeln!(
            self.writer,
            "[{kind}] display={} frame={}{} {result} at {:.1}µs",
            e.display,
            e.frame_index,
            if e.modeset { " modeset" } else { "" },
            us(e.at),
        );
    }

    fn on_hotplug(&mut self, e: &HotplugEvent) {
        let _ = writeln!(
            self.writer,
            "[hotplug] display={} {} at {:.1}µs",
            e.display,
            if e.connected { "connected" } else { "disconnected" },
            us(e.at),
        );
    }

    fn on_flattening(&mut self, e: &FlatteningEvent) {
        let _ = writeln!(
            self.writer,
            "[flattening] display={} {} at {:.1}µs",
            e.display,
            e.state,
            us(e.at),
        );
    }
}
