// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Atomic request building.
//!
//! [`build_request`] turns a [`Composition`] and a [`DisplayPipeline`] into
//! the property writes of one atomic transaction. It does not talk to the
//! kernel; the transport applies the request with the returned flags.
//!
//! Layer `i` of the composition goes to plane `i` of the pipeline (primary
//! first). Pipeline planes without a layer are disabled explicitly so a
//! plane used by the previous frame never lingers.

use alloc::vec::Vec;

use kurbo::Rect;

use crate::composition::{Composition, HwLayer};
use crate::error::{Resource, ScanoutError};
use crate::hw::{BlobId, ConnectorId, CrtcId, Device, PlaneId, PropertyId};
use crate::pipeline::DisplayPipeline;

/// Kernel flags for one atomic commit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CommitFlags {
    /// Ask the kernel whether the request would succeed without applying it.
    pub test_only: bool,
    /// Permit a full modeset.
    pub allow_modeset: bool,
}

/// Object a property write targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyTarget {
    /// A connector.
    Connector(ConnectorId),
    /// A CRTC.
    Crtc(CrtcId),
    /// A plane.
    Plane(PlaneId),
}

/// One property write of an atomic request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PropertyWrite {
    /// Object written.
    pub target: PropertyTarget,
    /// Property id on that object.
    pub property: PropertyId,
    /// Raw property value.
    pub value: u64,
}

/// Property writes of one atomic transaction, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AtomicRequest {
    writes: Vec<PropertyWrite>,
}

impl AtomicRequest {
    /// All writes.
    #[inline]
    #[must_use]
    pub fn writes(&self) -> &[PropertyWrite] {
        &self.writes
    }

    /// Value written to `property` on `target`, if any. The last write wins.
    #[must_use]
    pub fn value_of(&self, target: PropertyTarget, property: PropertyId) -> Option<u64> {
        self.writes
            .iter()
            .rev()
            .find(|w| w.target == target && w.property == property)
            .map(|w| w.value)
    }

    /// Number of writes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Returns `true` if there are no writes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    fn push(&mut self, target: PropertyTarget, property: PropertyId, value: u64) {
        self.writes.push(PropertyWrite {
            target,
            property,
            value,
        });
    }

    fn require(
        &mut self,
        target: PropertyTarget,
        property: Option<PropertyId>,
        value: u64,
    ) -> Result<(), ScanoutError> {
        let property = property.ok_or(ScanoutError::TopologyMismatch)?;
        self.push(target, property, value);
        Ok(())
    }

    fn optional(&mut self, target: PropertyTarget, property: Option<PropertyId>, value: u64) {
        if let Some(property) = property {
            self.push(target, property, value);
        }
    }
}

/// What one commit should do besides showing layers.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommitArgs<'a> {
    /// Layers to show. `None` leaves planes untouched unless `clear` is set.
    pub composition: Option<&'a Composition>,
    /// Mode blob to apply; implies activation and a modeset.
    pub mode_blob: Option<BlobId>,
    /// Explicit CRTC activation. `Some(false)` deactivates the pipeline.
    pub active: Option<bool>,
    /// Disable every pipeline plane.
    pub clear: bool,
    /// Only test the request.
    pub test_only: bool,
}

impl CommitArgs<'_> {
    /// Kernel flags for these arguments.
    #[must_use]
    pub fn flags(&self) -> CommitFlags {
        CommitFlags {
            test_only: self.test_only,
            allow_modeset: self.mode_blob.is_some() || self.active.is_some(),
        }
    }
}

/// Builds the atomic request presenting `args` on `pipeline`.
///
/// # Errors
///
/// - [`ScanoutError::ResourceExhausted`] with [`Resource::Planes`] when the
///   composition has more layers than the pipeline has planes.
/// - [`ScanoutError::TopologyMismatch`] when a pipeline object is missing
///   from `device` or lacks a required property.
pub fn build_request(
    device: &Device,
    pipeline: &DisplayPipeline,
    args: &CommitArgs<'_>,
) -> Result<AtomicRequest, ScanoutError> {
    let mut request = AtomicRequest::default();

    let crtc = device
        .crtc(pipeline.crtc())
        .ok_or(ScanoutError::TopologyMismatch)?;
    let connector = device
        .connector(pipeline.connector())
        .ok_or(ScanoutError::TopologyMismatch)?;
    let crtc_target = PropertyTarget::Crtc(crtc.id);
    let connector_target = PropertyTarget::Connector(connector.id);

    if let Some(blob) = args.mode_blob {
        request.require(crtc_target, crtc.props.mode_id, u64::from(blob.0))?;
        request.require(crtc_target, crtc.props.active, 1)?;
        request.require(
            connector_target,
            connector.props.crtc_id,
            u64::from(crtc.id.0),
        )?;
    } else if let Some(active) = args.active {
        request.require(crtc_target, crtc.props.active, u64::from(active))?;
        if active {
            request.require(
                connector_target,
                connector.props.crtc_id,
                u64::from(crtc.id.0),
            )?;
        } else {
            request.require(crtc_target, crtc.props.mode_id, 0)?;
            request.require(connector_target, connector.props.crtc_id, 0)?;
        }
    }

    let layers: &[HwLayer] = args
        .composition
        .map(Composition::layers)
        .unwrap_or_default();
    if layers.len() > pipeline.plane_capacity() {
        return Err(ScanoutError::ResourceExhausted(Resource::Planes));
    }
    if args.composition.is_none() && !args.clear {
        return Ok(request);
    }

    let mut zpos = 0_u64;
    for (index, plane_id) in pipeline.planes().enumerate() {
        let plane = device
            .plane(plane_id)
            .ok_or(ScanoutError::TopologyMismatch)?;
        let target = PropertyTarget::Plane(plane.id);
        let layer = if args.clear { None } else { layers.get(index) };
        let Some(layer) = layer else {
            request.require(target, plane.props.fb_id, 0)?;
            request.require(target, plane.props.crtc_id, 0)?;
            continue;
        };

        let props = &plane.props;
        request.require(target, props.fb_id, u64::from(layer.framebuffer.0))?;
        request.require(target, props.crtc_id, u64::from(crtc.id.0))?;

        let dst = DestRect::from_rect(layer.display_frame);
        request.require(target, props.crtc_x, signed(dst.x))?;
        request.require(target, props.crtc_y, signed(dst.y))?;
        request.require(target, props.crtc_w, u64::from(dst.w))?;
        request.require(target, props.crtc_h, u64::from(dst.h))?;

        let src = layer.source_crop;
        request.require(target, props.src_x, fixed_16_16(src.x0))?;
        request.require(target, props.src_y, fixed_16_16(src.y0))?;
        request.require(target, props.src_w, fixed_16_16(src.width()))?;
        request.require(target, props.src_h, fixed_16_16(src.height()))?;

        request.optional(target, props.zpos, zpos);
        request.optional(target, props.alpha, alpha_16(layer.alpha));
        zpos += 1;
    }
    Ok(request)
}

/// Integer destination rectangle in display pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DestRect {
    x: i32,
    y: i32,
    w: u32,
    h: u32,
}

impl DestRect {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "display coordinates fit in i32/u32; float casts saturate"
    )]
    fn from_rect(rect: Rect) -> Self {
        let rect = rect.round();
        Self {
            x: rect.x0 as i32,
            y: rect.y0 as i32,
            w: rect.width() as u32,
            h: rect.height() as u32,
        }
    }
}

/// Signed KMS property value: two's complement in the low bits.
fn signed(v: i32) -> u64 {
    i64::from(v) as u64
}

/// 16.16 fixed point, as `SRC_*` expects.
#[expect(
    clippy::cast_possible_truncation,
    reason = "buffer coordinates are far below 2^16; float casts saturate"
)]
fn fixed_16_16(v: f64) -> u64 {
    u64::from((v * 65536.0) as u32)
}

/// Plane `alpha` is 16 bits wide.
#[expect(
    clippy::cast_possible_truncation,
    reason = "alpha is validated to 0..=1 so the product fits in u16"
)]
fn alpha_16(alpha: f32) -> u64 {
    u64::from((alpha * 65535.0) as u16)
}
