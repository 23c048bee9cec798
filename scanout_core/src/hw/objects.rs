// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::vec::Vec;

use super::id::{CrtcId, EncoderId, PlaneId, PropertyId};

/// Bridges a CRTC's pixel stream to a connector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Encoder {
    /// Kernel object id.
    pub id: EncoderId,
    /// Bitmask over CRTC indices this encoder can be fed from.
    pub possible_crtcs: u32,
    /// CRTC the kernel currently routes through this encoder.
    pub current_crtc: Option<CrtcId>,
}

impl Encoder {
    /// Returns `true` if this encoder can be driven by `crtc`.
    #[inline]
    #[must_use]
    pub const fn supports_crtc(&self, crtc: &Crtc) -> bool {
        crtc.index < 32 && self.possible_crtcs & (1 << crtc.index) != 0
    }
}

/// Property ids of a CRTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CrtcProps {
    /// `ACTIVE`.
    pub active: Option<PropertyId>,
    /// `MODE_ID`.
    pub mode_id: Option<PropertyId>,
    /// `OUT_FENCE_PTR`.
    pub out_fence_ptr: Option<PropertyId>,
}

/// A timing generator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Crtc {
    /// Kernel object id.
    pub id: CrtcId,
    /// Position in the device's CRTC array; compatibility masks index by it.
    pub index: u32,
    /// Property ids.
    pub props: CrtcProps,
}

/// Plane class reported by the `type` property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlaneKind {
    /// Base layer of a CRTC.
    Primary,
    /// Additional layer.
    Overlay,
    /// Cursor; never used for composition.
    Cursor,
}

/// Property ids of a plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PlaneProps {
    /// `FB_ID`.
    pub fb_id: Option<PropertyId>,
    /// `CRTC_ID`.
    pub crtc_id: Option<PropertyId>,
    /// `CRTC_X`.
    pub crtc_x: Option<PropertyId>,
    /// `CRTC_Y`.
    pub crtc_y: Option<PropertyId>,
    /// `CRTC_W`.
    pub crtc_w: Option<PropertyId>,
    /// `CRTC_H`.
    pub crtc_h: Option<PropertyId>,
    /// `SRC_X`.
    pub src_x: Option<PropertyId>,
    /// `SRC_Y`.
    pub src_y: Option<PropertyId>,
    /// `SRC_W`.
    pub src_w: Option<PropertyId>,
    /// `SRC_H`.
    pub src_h: Option<PropertyId>,
    /// `zpos`.
    pub zpos: Option<PropertyId>,
    /// `alpha`.
    pub alpha: Option<PropertyId>,
    /// `IN_FENCE_FD`.
    pub in_fence_fd: Option<PropertyId>,
}

/// A buffer source unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plane {
    /// Kernel object id.
    pub id: PlaneId,
    /// Plane class.
    pub kind: PlaneKind,
    /// Bitmask over CRTC indices this plane can be attached to.
    pub possible_crtcs: u32,
    /// Supported fourcc formats.
    pub formats: Vec<u32>,
    /// Property ids.
    pub props: PlaneProps,
}

impl Plane {
    /// Returns `true` if this plane can scan out on `crtc`.
    #[inline]
    #[must_use]
    pub const fn supports_crtc(&self, crtc: &Crtc) -> bool {
        crtc.index < 32 && self.possible_crtcs & (1 << crtc.index) != 0
    }

    /// Returns `true` if the plane accepts `format`. An empty format list
    /// means the kernel did not report one, which is treated as "any".
    #[must_use]
    pub fn supports_format(&self, format: u32) -> bool {
        self.formats.is_empty() || self.formats.contains(&format)
    }
}
