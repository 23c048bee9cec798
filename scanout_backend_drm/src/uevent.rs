// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Kernel uevent hotplug source.

use std::ffi::OsStr;
use std::io;
use std::time::Duration;

use rustix::event::{PollFd, PollFlags, poll};
use rustix::time::Timespec;
use scanout_hwc::HotplugSource;
use tracing::debug;
use udev::{EventType, MonitorBuilder, MonitorSocket};

/// Listens for `drm_minor` change events carrying `HOTPLUG=1`.
pub struct UdevHotplugSource {
    socket: MonitorSocket,
}

impl std::fmt::Debug for UdevHotplugSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdevHotplugSource").finish_non_exhaustive()
    }
}

impl UdevHotplugSource {
    /// Opens a netlink monitor filtered to the drm subsystem.
    ///
    /// # Errors
    ///
    /// Any error from creating or binding the udev monitor.
    pub fn new() -> io::Result<Self> {
        let socket = MonitorBuilder::new()?
            .match_subsystem_devtype("drm", "drm_minor")?
            .listen()?;
        Ok(Self { socket })
    }
}

impl HotplugSource for UdevHotplugSource {
    fn wait_event(&mut self, timeout: Duration) -> io::Result<bool> {
        let ready = {
            let mut fds = [PollFd::new(&self.socket, PollFlags::IN)];
            poll(&mut fds, Some(&timespec(timeout)))?
        };
        if ready == 0 {
            return Ok(false);
        }
        let mut hotplug = false;
        for event in self.socket.iter() {
            if is_hotplug(event.event_type(), event.property_value("HOTPLUG")) {
                debug!("hotplug uevent from {}", event.sysname().to_string_lossy());
                hotplug = true;
            }
        }
        Ok(hotplug)
    }
}

fn is_hotplug(kind: EventType, flag: Option<&OsStr>) -> bool {
    matches!(kind, EventType::Change) && flag.is_some_and(|v| v == "1")
}

fn timespec(timeout: Duration) -> Timespec {
    Timespec {
        tv_sec: i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX),
        tv_nsec: timeout.subsec_nanos().into(),
    }
}
