// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Kernel scanout objects.
//!
//! A [`Device`] is an arena of the objects one KMS node reports at
//! enumeration: [`Connector`]s, [`Encoder`]s, [`Crtc`]s and [`Plane`]s. Objects
//! refer to each other only through integer ids, never through references,
//! so ownership can move between pipelines by editing a claim table alone.

mod connector;
mod device;
mod id;
mod objects;

pub use connector::{
    ConnectionState, Connector, ConnectorClass, ConnectorProbe, ConnectorProps, ConnectorType,
};
pub use device::{Device, DeviceError, DeviceResources};
pub use id::{
    BlobId, ClaimKey, ConnectorId, ConnectorRef, CrtcId, DeviceId, EncoderId, FramebufferId,
    ObjectId, PlaneId, PropertyId,
};
pub use objects::{Crtc, CrtcProps, Encoder, Plane, PlaneKind, PlaneProps};
