// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixture topologies for unit tests.

use alloc::vec::Vec;

use crate::hw::{
    ConnectionState, Connector, ConnectorId, ConnectorProbe, ConnectorProps, ConnectorType, Crtc,
    CrtcId, CrtcProps, Device, DeviceId, DeviceResources, Encoder, EncoderId, Plane, PlaneId,
    PlaneKind, PlaneProps, PropertyId,
};
use crate::mode::{MODE_TYPE_PREFERRED, tests::mode};

/// A plane with every property present. Property ids are `id * 100 + n`.
pub(crate) fn plane(id: u32, kind: PlaneKind, possible_crtcs: u32) -> Plane {
    let p = |n| Some(PropertyId(id * 100 + n));
    Plane {
        id: PlaneId(id),
        kind,
        possible_crtcs,
        formats: Vec::new(),
        props: PlaneProps {
            fb_id: p(1),
            crtc_id: p(2),
            crtc_x: p(3),
            crtc_y: p(4),
            crtc_w: p(5),
            crtc_h: p(6),
            src_x: p(7),
            src_y: p(8),
            src_w: p(9),
            src_h: p(10),
            zpos: p(11),
            alpha: None,
            in_fence_fd: None,
        },
    }
}

pub(crate) struct TopologyBuilder {
    resources: DeviceResources,
}

impl TopologyBuilder {
    pub(crate) fn new() -> Self {
        Self {
            resources: DeviceResources {
                min_size: (1, 1),
                max_size: (8192, 8192),
                ..DeviceResources::default()
            },
        }
    }

    /// Adds `n` CRTCs with ids `100..100 + n`.
    pub(crate) fn crtcs(mut self, n: u32) -> Self {
        for index in 0..n {
            let id = 100 + index;
            self.resources.crtcs.push(Crtc {
                id: CrtcId(id),
                index,
                props: CrtcProps {
                    active: Some(PropertyId(id * 100 + 1)),
                    mode_id: Some(PropertyId(id * 100 + 2)),
                    out_fence_ptr: Some(PropertyId(id * 100 + 3)),
                },
            });
        }
        self
    }

    pub(crate) fn encoder(mut self, id: u32, possible_crtcs: u32, current: Option<u32>) -> Self {
        self.resources.encoders.push(Encoder {
            id: EncoderId(id),
            possible_crtcs,
            current_crtc: current.map(CrtcId),
        });
        self
    }

    pub(crate) fn plane(mut self, plane: Plane) -> Self {
        self.resources.planes.push(plane);
        self
    }

    pub(crate) fn connector(
        mut self,
        id: u32,
        kind: ConnectorType,
        state: ConnectionState,
        encoders: &[u32],
        current: Option<u32>,
    ) -> Self {
        let mut preferred = mode(1920, 1080, 60);
        preferred.kind |= MODE_TYPE_PREFERRED;
        let same_kind = self
            .resources
            .connectors
            .iter()
            .filter(|c| c.kind == kind)
            .count();
        let kind_id = u32::try_from(same_kind).expect("few connectors") + 1;
        self.resources.connectors.push(Connector::new(
            ConnectorId(id),
            kind,
            kind_id,
            encoders.iter().copied().map(EncoderId).collect(),
            ConnectorProps {
                crtc_id: Some(PropertyId(id * 100 + 1)),
                dpms: Some(PropertyId(id * 100 + 2)),
            },
            ConnectorProbe {
                state,
                modes: alloc::vec![preferred, mode(1280, 720, 60)],
                current_encoder: current.map(EncoderId),
                mm_width: 340,
                mm_height: 190,
                edid: None,
            },
        ));
        self
    }

    /// Adds a connected eDP connector.
    pub(crate) fn connected(self, id: u32, encoders: &[u32], current: Option<u32>) -> Self {
        self.connector(
            id,
            ConnectorType::Edp,
            ConnectionState::Connected,
            encoders,
            current,
        )
    }

    pub(crate) fn build(self) -> Device {
        Device::new(DeviceId(0), "/dev/dri/card0", self.resources).expect("fixture qualifies")
    }
}
