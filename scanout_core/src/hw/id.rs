// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;

macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

object_id!(
    /// Index of an opened device in the resource manager.
    DeviceId
);
object_id!(
    /// Kernel object id of a connector.
    ConnectorId
);
object_id!(
    /// Kernel object id of an encoder.
    EncoderId
);
object_id!(
    /// Kernel object id of a CRTC.
    CrtcId
);
object_id!(
    /// Kernel object id of a plane.
    PlaneId
);
object_id!(
    /// Kernel id of an object property.
    PropertyId
);
object_id!(
    /// Kernel id of a property blob.
    BlobId
);
object_id!(
    /// Kernel id of a framebuffer.
    FramebufferId
);

/// A claimable object on some device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectId {
    /// An encoder.
    Encoder(EncoderId),
    /// A CRTC.
    Crtc(CrtcId),
    /// A plane.
    Plane(PlaneId),
}

/// Key of a claim-table entry: an object on a specific device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClaimKey {
    /// Device the object belongs to.
    pub device: DeviceId,
    /// The object.
    pub object: ObjectId,
}

impl ClaimKey {
    /// Claim key for an encoder.
    #[inline]
    #[must_use]
    pub const fn encoder(device: DeviceId, id: EncoderId) -> Self {
        Self {
            device,
            object: ObjectId::Encoder(id),
        }
    }

    /// Claim key for a CRTC.
    #[inline]
    #[must_use]
    pub const fn crtc(device: DeviceId, id: CrtcId) -> Self {
        Self {
            device,
            object: ObjectId::Crtc(id),
        }
    }

    /// Claim key for a plane.
    #[inline]
    #[must_use]
    pub const fn plane(device: DeviceId, id: PlaneId) -> Self {
        Self {
            device,
            object: ObjectId::Plane(id),
        }
    }
}

/// A connector on a specific device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectorRef {
    /// Owning device.
    pub device: DeviceId,
    /// Connector on that device.
    pub connector: ConnectorId,
}
