// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bound display pipelines.

use alloc::vec::Vec;

use crate::claim::{ClaimTable, OwnerToken};
use crate::hw::{ConnectorId, CrtcId, DeviceId, EncoderId, PlaneId};

/// The connector, encoder, CRTC and planes serving one display.
///
/// Built only by [`bind_pipeline`](crate::binder::bind_pipeline), which leaves
/// every object except the connector claimed under [`owner`](Self::owner).
/// Immutable afterwards; a topology change produces a new pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayPipeline {
    pub(crate) device: DeviceId,
    pub(crate) connector: ConnectorId,
    pub(crate) encoder: EncoderId,
    pub(crate) crtc: CrtcId,
    pub(crate) primary_plane: PlaneId,
    pub(crate) overlay_planes: Vec<PlaneId>,
    pub(crate) owner: OwnerToken,
}

impl DisplayPipeline {
    /// Device all objects live on.
    #[inline]
    #[must_use]
    pub const fn device(&self) -> DeviceId {
        self.device
    }

    /// The connector (read, never claimed).
    #[inline]
    #[must_use]
    pub const fn connector(&self) -> ConnectorId {
        self.connector
    }

    /// The claimed encoder.
    #[inline]
    #[must_use]
    pub const fn encoder(&self) -> EncoderId {
        self.encoder
    }

    /// The claimed CRTC.
    #[inline]
    #[must_use]
    pub const fn crtc(&self) -> CrtcId {
        self.crtc
    }

    /// The single primary plane.
    #[inline]
    #[must_use]
    pub const fn primary_plane(&self) -> PlaneId {
        self.primary_plane
    }

    /// Overlay planes obtained best-effort, in device order.
    #[inline]
    #[must_use]
    pub fn overlay_planes(&self) -> &[PlaneId] {
        &self.overlay_planes
    }

    /// Primary plane followed by overlays.
    pub fn planes(&self) -> impl Iterator<Item = PlaneId> + '_ {
        core::iter::once(self.primary_plane).chain(self.overlay_planes.iter().copied())
    }

    /// How many layers the pipeline can scan out at once.
    #[inline]
    #[must_use]
    pub fn plane_capacity(&self) -> usize {
        1 + self.overlay_planes.len()
    }

    /// Claim holder for every object in this pipeline.
    #[inline]
    #[must_use]
    pub const fn owner(&self) -> OwnerToken {
        self.owner
    }

    /// Tears the pipeline down, releasing all its claims at once.
    ///
    /// # Panics
    ///
    /// Panics if the table does not hold exactly the claims this pipeline
    /// was built with.
    pub fn release(self, claims: &mut ClaimTable) {
        let expected = 3 + self.overlay_planes.len();
        let released = claims.release_owner(self.owner);
        assert_eq!(
            released, expected,
            "pipeline for {:?} held {released} claims, expected {expected}",
            self.connector
        );
    }
}
