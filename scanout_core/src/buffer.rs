// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opaque buffer handles and their scanout description.

use core::fmt;

/// Consumer-owned buffer reference. Its meaning is private to the buffer
/// describer that resolves it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferHandle(pub u64);

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferHandle({:#x})", self.0)
    }
}

/// One memory plane of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PlaneLayout {
    /// GEM handle on the scanout device.
    pub handle: u32,
    /// Bytes per row.
    pub pitch: u32,
    /// Byte offset of the plane within the object.
    pub offset: u32,
}

/// What the transport needs to wrap a buffer as a framebuffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// DRM fourcc code.
    pub format: u32,
    /// Format modifier, if the producer set one.
    pub modifier: Option<u64>,
    /// Up to four memory planes; unused slots are `None`.
    pub planes: [Option<PlaneLayout>; 4],
}

impl BufferInfo {
    /// A single-plane buffer.
    #[must_use]
    pub const fn single_plane(width: u32, height: u32, format: u32, layout: PlaneLayout) -> Self {
        Self {
            width,
            height,
            format,
            modifier: None,
            planes: [Some(layout), None, None, None],
        }
    }
}

/// Builds a fourcc code from its four characters.
#[must_use]
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// `XR24`, the format every primary plane supports.
pub const FORMAT_XRGB8888: u32 = fourcc(b"XR24");
/// `AR24`.
pub const FORMAT_ARGB8888: u32 = fourcc(b"AR24");
