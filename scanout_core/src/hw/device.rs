// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use super::connector::{ConnectorClass, ConnectorProbe};
use super::id::{ConnectorId, CrtcId, DeviceId, EncoderId, PlaneId};
use super::{Connector, Crtc, Encoder, Plane};

/// Everything a transport reports about a device at enumeration.
#[derive(Clone, Debug, Default)]
pub struct DeviceResources {
    /// Smallest framebuffer the device accepts, `(width, height)`.
    pub min_size: (u32, u32),
    /// Largest framebuffer the device accepts, `(width, height)`.
    pub max_size: (u32, u32),
    /// CRTCs in kernel order; `Crtc::index` must match the position.
    pub crtcs: Vec<Crtc>,
    /// Encoders in kernel order.
    pub encoders: Vec<Encoder>,
    /// Connectors in kernel order, writeback included.
    pub connectors: Vec<Connector>,
    /// Planes in kernel order.
    pub planes: Vec<Plane>,
}

/// Device enumeration errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceError {
    /// The node reported no CRTCs, connectors or encoders.
    NotKms,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotKms => f.write_str("device has no modesetting resources"),
        }
    }
}

impl core::error::Error for DeviceError {}

/// One scanout controller and the objects it owns.
#[derive(Clone, Debug)]
pub struct Device {
    id: DeviceId,
    path: String,
    min_size: (u32, u32),
    max_size: (u32, u32),
    connectors: Vec<Connector>,
    writeback_connectors: Vec<Connector>,
    encoders: Vec<Encoder>,
    crtcs: Vec<Crtc>,
    planes: Vec<Plane>,
}

impl Device {
    /// Builds a device from enumerated resources.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotKms`] if any of the CRTC, connector or encoder
    /// counts is zero.
    ///
    /// # Panics
    ///
    /// Panics if a CRTC's `index` does not match its position.
    pub fn new(
        id: DeviceId,
        path: impl Into<String>,
        resources: DeviceResources,
    ) -> Result<Self, DeviceError> {
        if resources.crtcs.is_empty()
            || resources.connectors.is_empty()
            || resources.encoders.is_empty()
        {
            return Err(DeviceError::NotKms);
        }
        for (i, crtc) in resources.crtcs.iter().enumerate() {
            assert!(
                crtc.index as usize == i,
                "CRTC {:?} has index {} but sits at position {i}",
                crtc.id,
                crtc.index
            );
        }
        let (writeback_connectors, connectors) = resources
            .connectors
            .into_iter()
            .partition(|c| c.class() == ConnectorClass::Writeback);
        Ok(Self {
            id,
            path: path.into(),
            min_size: resources.min_size,
            max_size: resources.max_size,
            connectors,
            writeback_connectors,
            encoders: resources.encoders,
            crtcs: resources.crtcs,
            planes: resources.planes,
        })
    }

    /// Device id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> DeviceId {
        self.id
    }

    /// Node path the device was opened from.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Smallest framebuffer size.
    #[inline]
    #[must_use]
    pub const fn min_size(&self) -> (u32, u32) {
        self.min_size
    }

    /// Largest framebuffer size.
    #[inline]
    #[must_use]
    pub const fn max_size(&self) -> (u32, u32) {
        self.max_size
    }

    /// Non-writeback connectors in kernel order.
    #[inline]
    #[must_use]
    pub fn connectors(&self) -> &[Connector] {
        &self.connectors
    }

    /// Writeback connectors, kept apart from displays.
    #[inline]
    #[must_use]
    pub fn writeback_connectors(&self) -> &[Connector] {
        &self.writeback_connectors
    }

    /// Encoders in kernel order.
    #[inline]
    #[must_use]
    pub fn encoders(&self) -> &[Encoder] {
        &self.encoders
    }

    /// CRTCs in kernel order.
    #[inline]
    #[must_use]
    pub fn crtcs(&self) -> &[Crtc] {
        &self.crtcs
    }

    /// Planes in kernel order.
    #[inline]
    #[must_use]
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Looks up a connector.
    #[must_use]
    pub fn connector(&self, id: ConnectorId) -> Option<&Connector> {
        self.connectors.iter().find(|c| c.id == id)
    }

    /// Looks up an encoder.
    #[must_use]
    pub fn encoder(&self, id: EncoderId) -> Option<&Encoder> {
        self.encoders.iter().find(|e| e.id == id)
    }

    /// Looks up a CRTC.
    #[must_use]
    pub fn crtc(&self, id: CrtcId) -> Option<&Crtc> {
        self.crtcs.iter().find(|c| c.id == id)
    }

    /// Looks up a plane.
    #[must_use]
    pub fn plane(&self, id: PlaneId) -> Option<&Plane> {
        self.planes.iter().find(|p| p.id == id)
    }

    /// Re-reads a connector's state after a hotplug event.
    ///
    /// Returns `false` if the connector is unknown.
    pub fn refresh_connector(&mut self, id: ConnectorId, probe: ConnectorProbe) -> bool {
        match self.connectors.iter_mut().find(|c| c.id == id) {
            Some(connector) => {
                connector.refresh(probe);
                true
            }
            None => false,
        }
    }
}
