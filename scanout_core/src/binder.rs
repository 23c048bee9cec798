// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pipeline binding.
//!
//! [`bind_pipeline`] searches for an encoder, CRTC and primary plane that can
//! drive a connector and are all free, then claims them together. The search
//! is preference-ordered so that a configuration already lit by firmware is
//! kept:
//!
//! 1. the connector's current encoder, then the rest of its encoders;
//! 2. per encoder, its current CRTC, then every compatible CRTC;
//! 3. per CRTC, exactly one compatible primary plane (cursor planes are
//!    ignored).
//!
//! Encoder, CRTC and primary plane are claimed all-or-nothing. Overlay planes
//! are best-effort: ones already held elsewhere are skipped.

use alloc::vec::Vec;

use crate::claim::{ClaimTable, OwnerToken};
use crate::hw::{ClaimKey, ConnectorId, Crtc, Device, Encoder, PlaneKind};
use crate::pipeline::DisplayPipeline;

/// Knobs for [`bind_pipeline`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindOptions {
    /// Claim compatible overlay planes in addition to the primary.
    pub use_overlay_planes: bool,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            use_overlay_planes: true,
        }
    }
}

/// Binds a pipeline for `connector`, claiming its objects for `owner`.
///
/// Returns `None` when no legal, free combination exists; the claim table is
/// then exactly as it was.
pub fn bind_pipeline(
    device: &Device,
    claims: &mut ClaimTable,
    connector: ConnectorId,
    owner: OwnerToken,
    options: BindOptions,
) -> Option<DisplayPipeline> {
    let conn = device.connector(connector)?;

    let current = conn
        .current_encoder()
        .filter(|id| conn.encoders.contains(id))
        .and_then(|id| device.encoder(id));
    let rest = conn
        .encoders
        .iter()
        .filter(|id| Some(**id) != conn.current_encoder())
        .filter_map(|id| device.encoder(*id));

    for encoder in current.into_iter().chain(rest) {
        if let Some(pipeline) = bind_with_encoder(device, claims, connector, encoder, owner, options)
        {
            return Some(pipeline);
        }
    }
    None
}

fn bind_with_encoder(
    device: &Device,
    claims: &mut ClaimTable,
    connector: ConnectorId,
    encoder: &Encoder,
    owner: OwnerToken,
    options: BindOptions,
) -> Option<DisplayPipeline> {
    let dev = device.id();
    if claims
        .owner(ClaimKey::encoder(dev, encoder.id))
        .is_some_and(|o| o != owner)
    {
        return None;
    }

    let current = encoder
        .current_crtc
        .and_then(|id| device.crtc(id))
        .filter(|crtc| encoder.supports_crtc(crtc));
    let rest = device
        .crtcs()
        .iter()
        .filter(|crtc| Some(crtc.id) != encoder.current_crtc && encoder.supports_crtc(crtc));

    for crtc in current.into_iter().chain(rest) {
        if let Some(pipeline) =
            bind_with_crtc(device, claims, connector, encoder, crtc, owner, options)
        {
            return Some(pipeline);
        }
    }
    None
}

fn bind_with_crtc(
    device: &Device,
    claims: &mut ClaimTable,
    connector: ConnectorId,
    encoder: &Encoder,
    crtc: &Crtc,
    owner: OwnerToken,
    options: BindOptions,
) -> Option<DisplayPipeline> {
    let dev = device.id();
    let compatible = || device.planes().iter().filter(move |p| p.supports_crtc(crtc));

    let mut primaries = compatible().filter(|p| p.kind == PlaneKind::Primary);
    let primary = primaries.next()?;
    if primaries.next().is_some() {
        return None;
    }

    claims
        .claim_all(
            &[
                ClaimKey::encoder(dev, encoder.id),
                ClaimKey::crtc(dev, crtc.id),
                ClaimKey::plane(dev, primary.id),
            ],
            owner,
        )
        .ok()?;

    let mut overlay_planes = Vec::new();
    if options.use_overlay_planes {
        for plane in compatible().filter(|p| p.kind == PlaneKind::Overlay) {
            if claims.claim(ClaimKey::plane(dev, plane.id), owner).is_ok() {
                overlay_planes.push(plane.id);
            }
        }
    }

    Some(DisplayPipeline {
        device: dev,
        connector,
        encoder: encoder.id,
        crtc: crtc.id,
        primary_plane: primary.id,
        overlay_planes,
        owner,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::{CrtcId, EncoderId, PlaneId};
    use crate::testing::{TopologyBuilder, plane};

    fn bind(device: &Device, claims: &mut ClaimTable, c: u32, owner: u64) -> Option<DisplayPipeline> {
        bind_pipeline(
            device,
            claims,
            ConnectorId(c),
            OwnerToken(owner),
            BindOptions::default(),
        )
    }

    #[test]
    fn binds_compatible_objects_once() {
        let device = TopologyBuilder::new()
            .crtcs(2)
            .encoder(10, 0b11, None)
            .plane(plane(30, PlaneKind::Primary, 0b01))
            .plane(plane(31, PlaneKind::Primary, 0b10))
            .plane(plane(32, PlaneKind::Overlay, 0b11))
            .plane(plane(33, PlaneKind::Cursor, 0b11))
            .connected(1, &[10], None)
            .build();
        let mut claims = ClaimTable::new();

        let p = bind(&device, &mut claims, 1, 1).expect("pipeline");
        assert_eq!(p.encoder(), EncoderId(10), "only encoder");
        assert_eq!(p.crtc(), CrtcId(100), "first compatible CRTC");
        assert_eq!(p.primary_plane(), PlaneId(30), "its primary");
        assert_eq!(p.overlay_planes(), &[PlaneId(32)], "overlay, no cursor");
        assert_eq!(claims.len(), 4, "encoder, CRTC, primary, overlay");
        assert_eq!(p.plane_capacity(), 2, "primary plus one overlay");
    }

    #[test]
    fn prefers_current_encoder_and_crtc() {
        let device = TopologyBuilder::new()
            .crtcs(2)
            .encoder(10, 0b11, None)
            .encoder(11, 0b11, Some(101))
            .plane(plane(30, PlaneKind::Primary, 0b01))
            .plane(plane(31, PlaneKind::Primary, 0b10))
            .connected(1, &[10, 11], Some(11))
            .build();
        let mut claims = ClaimTable::new();

        let p = bind(&device, &mut claims, 1, 1).expect("pipeline");
        assert_eq!(p.encoder(), EncoderId(11), "current encoder first");
        assert_eq!(p.crtc(), CrtcId(101), "its current CRTC first");
        assert_eq!(p.primary_plane(), PlaneId(31), "primary of CRTC 101");
    }

    #[test]
    fn contended_crtc_binds_exactly_once() {
        let device = TopologyBuilder::new()
            .crtcs(1)
            .encoder(10, 0b1, None)
            .encoder(11, 0b1, None)
            .plane(plane(30, PlaneKind::Primary, 0b1))
            .connected(1, &[10], None)
            .connected(2, &[11], None)
            .build();
        let mut claims = ClaimTable::new();

        assert!(bind(&device, &mut claims, 1, 1).is_some(), "first wins");
        let before = claims.clone();
        assert!(bind(&device, &mut claims, 2, 2).is_none(), "second loses");
        assert_eq!(claims.count_owned(OwnerToken(2)), 0, "no orphan claims");
        assert_eq!(claims.len(), before.len(), "table unchanged");
        assert!(
            claims.is_free(ClaimKey::encoder(device.id(), EncoderId(11))),
            "loser's encoder stays free"
        );
    }

    #[test]
    fn ambiguous_primary_falls_through_to_next_crtc() {
        let device = TopologyBuilder::new()
            .crtcs(2)
            .encoder(10, 0b11, None)
            .plane(plane(30, PlaneKind::Primary, 0b01))
            .plane(plane(31, PlaneKind::Primary, 0b01))
            .plane(plane(32, PlaneKind::Primary, 0b10))
            .connected(1, &[10], None)
            .build();
        let mut claims = ClaimTable::new();

        let p = bind(&device, &mut claims, 1, 1).expect("pipeline");
        assert_eq!(p.crtc(), CrtcId(101), "CRTC 100 has two primaries");
        assert_eq!(p.primary_plane(), PlaneId(32), "single primary of 101");
    }

    #[test]
    fn overlays_are_best_effort() {
        let device = TopologyBuilder::new()
            .crtcs(2)
            .encoder(10, 0b01, None)
            .encoder(11, 0b10, None)
            .plane(plane(30, PlaneKind::Primary, 0b01))
            .plane(plane(31, PlaneKind::Primary, 0b10))
            .plane(plane(32, PlaneKind::Overlay, 0b11))
            .plane(plane(33, PlaneKind::Overlay, 0b10))
            .connected(1, &[10], None)
            .connected(2, &[11], None)
            .build();
        let mut claims = ClaimTable::new();

        let a = bind(&device, &mut claims, 1, 1).expect("first");
        let b = bind(&device, &mut claims, 2, 2).expect("second");
        assert_eq!(a.overlay_planes(), &[PlaneId(32)], "first takes shared");
        assert_eq!(b.overlay_planes(), &[PlaneId(33)], "second skips it");

        b.release(&mut claims);
        a.release(&mut claims);
        assert!(claims.is_empty(), "release drops every claim");
    }

    #[test]
    fn overlays_can_be_disabled() {
        let device = TopologyBuilder::new()
            .crtcs(1)
            .encoder(10, 0b1, None)
            .plane(plane(30, PlaneKind::Primary, 0b1))
            .plane(plane(31, PlaneKind::Overlay, 0b1))
            .connected(1, &[10], None)
            .build();
        let mut claims = ClaimTable::new();
        let p = bind_pipeline(
            &device,
            &mut claims,
            ConnectorId(1),
            OwnerToken(1),
            BindOptions {
                use_overlay_planes: false,
            },
        )
        .expect("pipeline");
        assert!(p.overlay_planes().is_empty(), "overlays not requested");
        assert_eq!(claims.len(), 3, "only the mandatory three");
    }

    #[test]
    fn no_primary_means_no_pipeline() {
        let device = TopologyBuilder::new()
            .crtcs(1)
            .encoder(10, 0b1, None)
            .plane(plane(31, PlaneKind::Overlay, 0b1))
            .connected(1, &[10], None)
            .build();
        let mut claims = ClaimTable::new();
        assert!(bind(&device, &mut claims, 1, 1).is_none(), "needs primary");
        assert!(claims.is_empty(), "nothing claimed");
        assert!(
            bind(&device, &mut claims, 7, 1).is_none(),
            "unknown connector"
        );
    }
}
