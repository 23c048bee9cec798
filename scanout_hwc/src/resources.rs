// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Devices, claims and display numbering.
//!
//! The [`ResourceManager`] is created once at startup and lives behind the
//! composer's master lock. It owns every opened device (object model plus
//! transport handle), the claim table shared by all pipelines, and the
//! display-number assignment, which never changes after startup.

use std::fmt;
use std::sync::Arc;

use scanout_core::binder::{BindOptions, bind_pipeline};
use scanout_core::claim::{ClaimTable, OwnerToken};
use scanout_core::hw::{Connector, ConnectorRef, Device, DeviceError, DeviceId};
use scanout_core::output::DisplayId;
use scanout_core::pipeline::DisplayPipeline;
use scanout_core::topology::{DisplayAssignment, order_displays};
use tracing::{debug, info, warn};

use crate::config::HwcConfig;
use crate::error::{InitError, TransportError};
use crate::transport::{DeviceOpener, KmsDevice};

/// Upper bound on `%` pattern expansion.
const MAX_DEVICE_NODES: u32 = 64;

/// An opened device.
pub(crate) struct DeviceEntry {
    pub(crate) model: Device,
    pub(crate) kms: Arc<dyn KmsDevice>,
}

impl fmt::Debug for DeviceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEntry")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Owner of all devices and hardware claims.
#[derive(Debug)]
pub(crate) struct ResourceManager {
    devices: Vec<DeviceEntry>,
    claims: ClaimTable,
    assignments: Vec<DisplayAssignment>,
    bind_options: BindOptions,
}

impl ResourceManager {
    /// Opens every device matching the configured path and numbers the
    /// displays.
    pub(crate) fn init(config: &HwcConfig, opener: &dyn DeviceOpener) -> Result<Self, InitError> {
        let mut devices = Vec::new();
        for path in node_paths(&config.device_path, opener) {
            let id = DeviceId(u32::try_from(devices.len()).unwrap_or(u32::MAX));
            match open_device(opener, id, &path) {
                Ok(entry) => {
                    info!(
                        "{path}: {} connectors, {} CRTCs, {} planes",
                        entry.model.connectors().len(),
                        entry.model.crtcs().len(),
                        entry.model.planes().len()
                    );
                    devices.push(entry);
                }
                Err(OpenError::NotKms) => debug!("{path}: not a modesetting device, skipped"),
                Err(OpenError::Transport(err)) => warn!("{path}: {err}"),
            }
        }
        if devices.is_empty() {
            return Err(InitError::NoUsableDevice);
        }

        let models: Vec<Device> = devices.iter().map(|d| d.model.clone()).collect();
        let assignments = order_displays(&models, &config.primary_display_order)
            .map_err(|_| InitError::NoPrimaryDisplay)?;

        Ok(Self {
            devices,
            claims: ClaimTable::new(),
            assignments,
            bind_options: BindOptions {
                use_overlay_planes: config.use_overlay_planes,
            },
        })
    }

    /// Display numbers with their connectors, primary first.
    pub(crate) fn assignments(&self) -> &[DisplayAssignment] {
        &self.assignments
    }

    pub(crate) fn device(&self, id: DeviceId) -> Option<&DeviceEntry> {
        self.devices.get(id.0 as usize)
    }

    pub(crate) fn connector(&self, connector: ConnectorRef) -> Option<&Connector> {
        self.device(connector.device)?
            .model
            .connector(connector.connector)
    }

    pub(crate) fn claims(&self) -> &ClaimTable {
        &self.claims
    }

    /// Binds a pipeline for `display`'s connector.
    pub(crate) fn bind(&mut self, display: DisplayId, connector: ConnectorRef) -> Option<DisplayPipeline> {
        let entry = self.devices.get(connector.device.0 as usize)?;
        bind_pipeline(
            &entry.model,
            &mut self.claims,
            connector.connector,
            OwnerToken::from(display),
            self.bind_options,
        )
    }

    /// Releases every claim of `pipeline`.
    pub(crate) fn release(&mut self, pipeline: DisplayPipeline) {
        pipeline.release(&mut self.claims);
    }

    /// Re-probes a connector. Returns `true` if its connection state changed.
    pub(crate) fn refresh_connector(&mut self, connector: ConnectorRef) -> Result<bool, TransportError> {
        let Some(entry) = self.devices.get_mut(connector.device.0 as usize) else {
            return Ok(false);
        };
        let probe = entry.kms.probe_connector(connector.connector)?;
        let before = entry
            .model
            .connector(connector.connector)
            .map(Connector::state);
        entry.model.refresh_connector(connector.connector, probe);
        let after = entry
            .model
            .connector(connector.connector)
            .map(Connector::state);
        Ok(before != after)
    }
}

enum OpenError {
    NotKms,
    Transport(TransportError),
}

impl From<TransportError> for OpenError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<DeviceError> for OpenError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::NotKms => Self::NotKms,
        }
    }
}

fn open_device(opener: &dyn DeviceOpener, id: DeviceId, path: &str) -> Result<DeviceEntry, OpenError> {
    let kms = opener.open(path)?;
    let resources = kms.resources()?;
    let model = Device::new(id, path, resources)?;
    Ok(DeviceEntry { model, kms })
}

/// Expands a `%` pattern into existing node paths, stopping at the first
/// missing index. A plain path is returned as is.
fn node_paths(pattern: &str, opener: &dyn DeviceOpener) -> Vec<String> {
    let Some(prefix) = pattern.strip_suffix('%') else {
        return vec![pattern.to_owned()];
    };
    (0..MAX_DEVICE_NODES)
        .map(|i| format!("{prefix}{i}"))
        .take_while(|path| opener.node_exists(path))
        .collect()
}
