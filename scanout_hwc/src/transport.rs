// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The kernel-facing collaborators.
//!
//! The composer never issues ioctls itself. A [`DeviceOpener`] finds and
//! opens device nodes, each yielding a [`KmsDevice`]; a [`BufferDescriber`]
//! turns opaque consumer buffer handles into framebuffer descriptions.
//! `scanout_backend_drm` implements all three for Linux.
//!
//! An atomic commit is all-or-nothing: on error nothing of the request was
//! applied.

use std::os::fd::OwnedFd;
use std::sync::Arc;

use scanout_core::buffer::{BufferHandle, BufferInfo};
use scanout_core::commit::{AtomicRequest, CommitFlags, PropertyTarget};
use scanout_core::hw::{BlobId, ConnectorId, ConnectorProbe, DeviceResources, FramebufferId, PropertyId};
use scanout_core::mode::Mode;

use crate::error::TransportError;

/// An opened KMS device.
pub trait KmsDevice: Send + Sync {
    /// Enumerates CRTCs, encoders, connectors and planes with their property
    /// ids.
    fn resources(&self) -> Result<DeviceResources, TransportError>;

    /// Re-reads a connector's connection state, modes and EDID.
    fn probe_connector(&self, connector: ConnectorId) -> Result<ConnectorProbe, TransportError>;

    /// Uploads a mode as a property blob.
    fn create_mode_blob(&self, mode: &Mode) -> Result<BlobId, TransportError>;

    /// Destroys a property blob.
    fn destroy_blob(&self, blob: BlobId) -> Result<(), TransportError>;

    /// Wraps a buffer as a framebuffer.
    fn add_framebuffer(&self, info: &BufferInfo) -> Result<FramebufferId, TransportError>;

    /// Releases a framebuffer.
    fn remove_framebuffer(&self, framebuffer: FramebufferId) -> Result<(), TransportError>;

    /// Writes one property outside of an atomic commit.
    fn set_property(
        &self,
        target: PropertyTarget,
        property: PropertyId,
        value: u64,
    ) -> Result<(), TransportError>;

    /// Applies `request` in one kernel transaction. Returns an out-fence that
    /// signals when the frame is on screen, if the device produced one.
    fn atomic_commit(
        &self,
        request: &AtomicRequest,
        flags: CommitFlags,
    ) -> Result<Option<OwnedFd>, TransportError>;
}

/// Finds and opens device nodes.
pub trait DeviceOpener {
    /// Returns `true` if a node exists at `path`.
    fn node_exists(&self, path: &str) -> bool;

    /// Opens the node at `path`.
    fn open(&self, path: &str) -> Result<Arc<dyn KmsDevice>, TransportError>;
}

/// Resolves opaque consumer buffers.
pub trait BufferDescriber: Send + Sync {
    /// Describes `buffer` for framebuffer creation.
    fn describe(&self, buffer: BufferHandle) -> Result<BufferInfo, TransportError>;
}
