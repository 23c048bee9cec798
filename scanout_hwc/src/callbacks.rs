// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Consumer callback table.
//!
//! One handler per event kind, replaceable by registering again. The table
//! has its own lock, distinct from the composer's master lock. The master
//! lock is never held while this one is taken, so a handler may call back
//! into the composer.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use scanout_core::output::DisplayId;
use scanout_core::time::{Duration, HostTime};

/// Called with a display and its new connection state.
pub type HotplugCallback = Arc<dyn Fn(DisplayId, bool) + Send + Sync>;
/// Called on every vsync of an enabled display, with the timestamp and the
/// current vsync period.
pub type VsyncCallback = Arc<dyn Fn(DisplayId, HostTime, Duration) + Send + Sync>;
/// Called when a display wants the consumer to redraw.
pub type RefreshCallback = Arc<dyn Fn(DisplayId) + Send + Sync>;

#[derive(Default)]
pub(crate) struct CallbackTable {
    pub(crate) hotplug: Option<HotplugCallback>,
    pub(crate) vsync: Option<VsyncCallback>,
    pub(crate) refresh: Option<RefreshCallback>,
}

/// Registered consumer handlers.
#[derive(Default)]
pub(crate) struct Callbacks {
    table: Mutex<CallbackTable>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        f.debug_struct("Callbacks")
            .field("hotplug", &table.hotplug.is_some())
            .field("vsync", &table.vsync.is_some())
            .field("refresh", &table.refresh.is_some())
            .finish()
    }
}

impl Callbacks {
    pub(crate) fn set_hotplug(&self, callback: Option<HotplugCallback>) {
        self.table.lock().hotplug = callback;
    }

    pub(crate) fn set_vsync(&self, callback: Option<VsyncCallback>) {
        self.table.lock().vsync = callback;
    }

    pub(crate) fn set_refresh(&self, callback: Option<RefreshCallback>) {
        self.table.lock().refresh = callback;
    }

    /// Clone of the hotplug handler. It is invoked after the table lock is
    /// dropped so a handler may re-register.
    pub(crate) fn hotplug(&self) -> Option<HotplugCallback> {
        self.table.lock().hotplug.clone()
    }

    /// Runs `f` with the table locked.
    pub(crate) fn with_table<R>(&self, f: impl FnOnce(&CallbackTable) -> R) -> R {
        f(&self.table.lock())
    }

    /// Delivers a vsync under the table lock.
    pub(crate) fn dispatch_vsync(&self, display: DisplayId, at: HostTime, period: Duration) {
        self.with_table(|table| {
            if let Some(vsync) = &table.vsync {
                vsync(display, at, period);
            }
        });
    }
}
