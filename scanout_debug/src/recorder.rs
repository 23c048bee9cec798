// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as little-endian records, each prefixed with a one-byte tag.
//! [`decode`] reads them back as an iterator of [`RecordedEvent`]. Decoding
//! stops at the first unknown tag or truncated record.

use scanout_core::flatten::FlatteningState;
use scanout_core::hw::{ConnectorId, ConnectorRef, CrtcId, DeviceId};
use scanout_core::output::DisplayId;
use scanout_core::time::HostTime;
use scanout_core::trace::{
    BindEvent, CommitEvent, CompositionEvent, FlatteningEvent, HotplugEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_BIND: u8 = 1;
const TAG_COMPOSITION: u8 = 2;
const TAG_COMMIT: u8 = 3;
const TAG_HOTPLUG: u8 = 4;
const TAG_FLATTENING: u8 = 5;

const COMMIT_TEST_ONLY: u8 = 1 << 0;
const COMMIT_MODESET: u8 = 1 << 1;
const COMMIT_SUCCESS: u8 = 1 << 2;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_header(&mut self, tag: u8, display: DisplayId) {
        self.write_u8(tag);
        self.write_u64(display.0);
    }

    fn write_flattening(&mut self, state: FlatteningState) {
        let (tag, countdown) = match state {
            FlatteningState::Disabled => (0, 0),
            FlatteningState::NotRequired => (1, 0),
            FlatteningState::Flattened => (2, 0),
            FlatteningState::ClientRefreshRequested => (3, 0),
            FlatteningState::Countdown(n) => (4, n),
        };
        self.write_u8(tag);
        self.write_u32(countdown);
    }
}

impl TraceSink for RecorderSink {
    fn on_bind(&mut self, e: &BindEvent) {
        self.write_header(TAG_BIND, e.display);
        self.write_u32(e.connector.device.0);
        self.write_u32(e.connector.connector.0);
        self.write_u8(u8::from(e.crtc.is_some()));
        self.write_u32(e.crtc.map_or(0, |c| c.0));
        self.write_u32(e.overlay_planes);
        self.write_u64(e.at.nanos());
    }

    fn on_composition(&mut self, e: &CompositionEvent) {
        self.write_header(TAG_COMPOSITION, e.display);
        self.write_u64(e.frame_index);
        self.write_u32(e.layers);
        self.write_u8(u8::from(e.client_target));
        self.write_u64(e.at.nanos());
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.write_header(TAG_COMMIT, e.display);
        self.write_u64(e.frame_index);
        let mut flags = 0;
        if e.test_only {
            flags |= COMMIT_TEST_ONLY;
        }
        if e.modeset {
            flags |= COMMIT_MODESET;
        }
        if e.success {
            flags |= COMMIT_SUCCESS;
        }
        self.write_u8(flags);
        self.write_u64(e.at.nanos());
    }

    fn on_hotplug(&mut self, e: &HotplugEvent) {
        self.write_header(TAG_HOTPLUG, e.display);
        self.write_u8(u8::from(e.connected));
        self.write_u64(e.at.nanos());
    }

    fn on_flattening(&mut self, e: &FlatteningEvent) {
        self.write_header(TAG_FLATTENING, e.display);
        self.write_flattening(e.state);
        self.write_u64(e.at.nanos());
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A [`BindEvent`].
    Bind(BindEvent),
    /// A [`CompositionEvent`].
    Composition(CompositionEvent),
    /// A [`CommitEvent`].
    Commit(CommitEvent),
    /// A [`HotplugEvent`].
    Hotplug(HotplugEvent),
    /// A [`FlatteningEvent`].
    Flattening(FlatteningEvent),
}

impl RecordedEvent {
    /// The display the event belongs to.
    #[must_use]
    pub fn display(&self) -> DisplayId {
        match self {
            Self::Bind(e) => e.display,
            Self::Composition(e) => e.display,
            Self::Commit(e) => e.display,
            Self::Hotplug(e) => e.display,
            Self::Flattening(e) => e.display,
        }
    }

    /// When the event happened.
    #[must_use]
    pub fn at(&self) -> HostTime {
        match self {
            Self::Bind(e) => e.at,
            Self::Composition(e) => e.at,
            Self::Commit(e) => e.at,
            Self::Hotplug(e) => e.at,
            Self::Flattening(e) => e.at,
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_flattening(&mut self) -> Option<FlatteningState> {
        let tag = self.read_u8()?;
        let countdown = self.read_u32()?;
        Some(match tag {
            0 => FlatteningState::Disabled,
            1 => FlatteningState::NotRequired,
            2 => FlatteningState::Flattened,
            3 => FlatteningState::ClientRefreshRequested,
            _ => FlatteningState::Countdown(countdown),
        })
    }

    fn decode_bind(&mut self, display: DisplayId) -> Option<RecordedEvent> {
        let connector = ConnectorRef {
            device: DeviceId(self.read_u32()?),
            connector: ConnectorId(self.read_u32()?),
        };
        let has_crtc = self.read_u8()? != 0;
        let crtc = self.read_u32()?;
        Some(RecordedEvent::Bind(BindEvent {
            display,
            connector,
            crtc: has_crtc.then_some(CrtcId(crtc)),
            overlay_planes: self.read_u32()?,
            at: self.read_time()?,
        }))
    }

    fn decode_composition(&mut self, display: DisplayId) -> Option<RecordedEvent> {
        Some(RecordedEvent::Composition(CompositionEvent {
            display,
            frame_index: self.read_u64()?,
            layers: self.read_u32()?,
            client_target: self.read_u8()? != 0,
            at: self.read_time()?,
        }))
    }

    fn decode_commit(&mut self, display: DisplayId) -> Option<RecordedEvent> {
        let frame_index = self.read_u64()?;
        let flags = self.read_u8()?;
        Some(RecordedEvent::Commit(CommitEvent {
            display,
            frame_index,
            test_only: flags & COMMIT_TEST_ONLY != 0,
            modeset: flags & COMMIT_MODESET != 0,
            success: flags & COMMIT_SUCCESS != 0,
            at: self.read_time()?,
        }))
    }

    fn decode_hotplug(&mut self, display: DisplayId) -> Option<RecordedEvent> {
        Some(RecordedEvent::Hotplug(HotplugEvent {
            display,
            connected: self.read_u8()? != 0,
            at: self.read_time()?,
        }))
    }

    fn decode_flattening(&mut self, display: DisplayId) -> Option<RecordedEvent> {
        Some(RecordedEvent::Flattening(FlatteningEvent {
            display,
            state: self.read_flattening()?,
            at: self.read_time()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        let display = DisplayId(self.read_u64()?);
        match tag {
            TAG_BIND => self.decode_bind(display),
            TAG_COMPOSITION => self.decode_composition(display),
            TAG_COMMIT => self.decode_commit(display),
            TAG_HOTPLUG => self.decode_hotplug(display),
            TAG_FLATTENING => self.decode_flattening(display),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
