// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Linux DRM/KMS backend for `scanout_hwc`.
//!
//! - [`DrmOpener`] and [`DrmDevice`] implement the kernel transport with the
//!   `drm` crate: resource enumeration, mode blobs, planar framebuffers and
//!   atomic commits with an out-fence.
//! - [`UdevHotplugSource`] feeds the composer's hotplug listener from kernel
//!   uevents.
//! - [`BufferRegistry`] resolves consumer buffer handles to the GEM layout
//!   the allocator registered.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scanout_backend_drm::{BufferRegistry, DrmOpener, UdevHotplugSource};
//! use scanout_hwc::{HwcConfig, Hwc};
//!
//! let buffers = Arc::new(BufferRegistry::new());
//! let mut hwc = Hwc::new(HwcConfig::from_env(), &DrmOpener, buffers.clone())?;
//! hwc.start_hotplug(Box::new(UdevHotplugSource::new()?))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod buffers;
mod card;
mod uevent;

pub use buffers::BufferRegistry;
pub use card::{DrmDevice, DrmOpener};
pub use uevent::UdevHotplugSource;
