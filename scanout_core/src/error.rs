// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy for display operations.
//!
//! [`ScanoutError`] is what every consumer-facing operation returns. Handle
//! and parameter errors are returned synchronously and never retried;
//! resource errors abort the current frame only and leave the display usable.

use core::fmt;

/// Which kind of handle a [`ScanoutError::BadHandle`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// Unknown logical display.
    Display,
    /// Unknown layer handle.
    Layer,
    /// Unknown display configuration id.
    Config,
}

/// A feature that is intentionally not implemented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Virtual (writeback-backed) displays.
    VirtualDisplay,
    /// Doze and doze-suspend power modes.
    Doze,
    /// HDR and advanced color paths.
    Hdr,
    /// Color modes other than native.
    ColorMode,
    /// Client target dataspaces other than unknown.
    Dataspace,
    /// Client target sizes outside the device's framebuffer limits.
    ClientTargetSize,
    /// Display identification data (no EDID available).
    Identification,
    /// Connection type of a writeback or unclassified connector.
    ConnectionType,
}

/// The hardware or memory resource that ran out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    /// A layer buffer could not be imported as a framebuffer.
    Import,
    /// More composition entries than the pipeline has planes.
    Planes,
    /// A property blob could not be created.
    Blob,
    /// The kernel rejected the atomic transaction.
    Commit,
    /// An object was already claimed by another pipeline.
    Claim,
}

/// Errors returned by display operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanoutError {
    /// Unknown display, layer or config id.
    BadHandle(HandleKind),
    /// An input was out of range.
    BadParameter,
    /// The feature is intentionally unimplemented.
    Unsupported(Feature),
    /// A claim, import or commit failed for hardware or memory reasons.
    ResourceExhausted(Resource),
    /// No legal encoder/CRTC/plane assignment exists for the display.
    TopologyMismatch,
    /// The composition had nothing in it.
    ///
    /// Presentation treats this as benign; other callers see it as an error.
    NoLayers,
}

impl fmt::Display for ScanoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadHandle(kind) => write!(f, "unknown {kind:?} handle"),
            Self::BadParameter => f.write_str("parameter out of range"),
            Self::Unsupported(feature) => write!(f, "{feature:?} is not supported"),
            Self::ResourceExhausted(resource) => write!(f, "{resource:?} resource exhausted"),
            Self::TopologyMismatch => f.write_str("no pipeline is bound to the display"),
            Self::NoLayers => f.write_str("no layers to compose"),
        }
    }
}

impl core::error::Error for ScanoutError {}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            ScanoutError::BadHandle(HandleKind::Layer).to_string(),
            "unknown Layer handle",
            "handle kind should be named"
        );
        assert_eq!(
            ScanoutError::ResourceExhausted(Resource::Import).to_string(),
            "Import resource exhausted",
            "resource should be named"
        );
        assert_eq!(
            ScanoutError::NoLayers.to_string(),
            "no layers to compose",
            "benign empty composition has its own message"
        );
    }
}
