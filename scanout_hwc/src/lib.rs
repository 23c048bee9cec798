// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display composer runtime for scanout.
//!
//! [`Hwc`] binds every logical display to a connector, encoder, CRTC and a
//! set of planes, then turns each presented frame into one atomic commit.
//! Around that sit the threads a composer needs:
//!
//! - one vsync timer per display, started and stopped on demand
//! - one flattening timer per display that asks the consumer for a refresh
//!   once a multi-layer scene has been idle long enough
//! - an optional hotplug listener fed by a [`HotplugSource`]
//!
//! Kernel access goes through the traits in [`KmsDevice`],
//! [`DeviceOpener`] and [`BufferDescriber`]. The `scanout_backend_drm` crate
//! implements them on top of the `drm` crate; tests use in-memory fakes.
//!
//! # Locking
//!
//! One lock guards all display and resource state. Consumer callbacks are
//! never called while it is held, so a callback may call back into [`Hwc`].

mod callbacks;
mod config;
mod display;
mod error;
mod hotplug;
mod hwc;
mod resources;
mod time;
mod transport;
mod vsync;

#[cfg(test)]
mod testing;

pub use callbacks::{HotplugCallback, RefreshCallback, VsyncCallback};
pub use config::{
    ENV_DEVICE, ENV_FLATTENING_COUNTDOWN, ENV_PRIMARY_DISPLAY_ORDER, ENV_SCALE_WITH_GPU,
    ENV_USE_OVERLAY_PLANES, HwcConfig,
};
pub use display::{
    ColorMode, ColorTransformHint, ConnectionType, DisplayAttribute, PowerMode, RenderIntent,
};
pub use error::{InitError, TransportError};
pub use hotplug::{ChannelHotplugSource, HotplugSender, HotplugSource, channel};
pub use hwc::{HdrCapabilities, Hwc};
pub use time::now;
pub use transport::{BufferDescriber, DeviceOpener, KmsDevice};
