// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Periodic vsync timers.
//!
//! A [`VsyncWorker`] owns one thread that, while enabled, wakes on every
//! multiple of the period on the monotonic clock and invokes its callback.
//! Enabling and disabling take effect immediately; a disabled worker sleeps
//! on a condition variable.
//!
//! The callback runs on the worker thread without the worker's own lock held.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use scanout_core::time::{Duration, HostTime};

use crate::time::now;

/// What a worker does after its callback returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum VsyncAction {
    /// Keep firing.
    Continue,
    /// Disable the worker until re-enabled.
    Stop,
}

/// Period used before a display has an active mode.
pub(crate) const FALLBACK_PERIOD: Duration = Duration(16_666_666);

#[derive(Debug, Default)]
struct WorkerState {
    enabled: bool,
    shutdown: bool,
    /// Bumped on every enable so a stale sleep never fires.
    generation: u64,
}

#[derive(Debug)]
struct WorkerShared {
    state: Mutex<WorkerState>,
    wake: Condvar,
    period: AtomicU64,
}

/// A thread delivering periodic callbacks.
#[derive(Debug)]
pub(crate) struct VsyncWorker {
    shared: Arc<WorkerShared>,
    thread: Option<JoinHandle<()>>,
}

impl VsyncWorker {
    /// Spawns a disabled worker.
    pub(crate) fn spawn<F>(name: String, period: Duration, mut callback: F) -> io::Result<Self>
    where
        F: FnMut(HostTime, Duration) -> VsyncAction + Send + 'static,
    {
        let period = if period.as_nanos() == 0 {
            FALLBACK_PERIOD
        } else {
            period
        };
        let shared = Arc::new(WorkerShared {
            state: Mutex::new(WorkerState::default()),
            wake: Condvar::new(),
            period: AtomicU64::new(period.as_nanos()),
        });
        let thread_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name(name)
            .spawn(move || run(&thread_shared, &mut callback))?;
        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Arms or disarms the worker.
    ///
    /// Arming an armed worker re-arms it, so a callback that arms its own
    /// worker keeps it running even if it then returns [`VsyncAction::Stop`].
    /// Deadlines stay on multiples of the period either way.
    pub(crate) fn set_enabled(&self, enabled: bool) {
        let mut state = self.shared.state.lock();
        if !enabled && !state.enabled {
            return;
        }
        state.enabled = enabled;
        if enabled {
            state.generation += 1;
        }
        self.shared.wake.notify_all();
    }

    /// Returns `true` while the worker is armed.
    pub(crate) fn is_enabled(&self) -> bool {
        self.shared.state.lock().enabled
    }

    /// Changes the period used from the next wake-up on.
    pub(crate) fn set_period(&self, period: Duration) {
        if period.as_nanos() > 0 {
            self.shared.period.store(period.as_nanos(), Ordering::Relaxed);
        }
    }

    /// Current period.
    pub(crate) fn period(&self) -> Duration {
        Duration(self.shared.period.load(Ordering::Relaxed))
    }
}

impl Drop for VsyncWorker {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.wake.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            _ = thread.join();
        }
    }
}

fn run<F>(shared: &WorkerShared, callback: &mut F)
where
    F: FnMut(HostTime, Duration) -> VsyncAction,
{
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            return;
        }
        if !state.enabled {
            shared.wake.wait(&mut state);
            continue;
        }

        let generation = state.generation;
        let period = Duration(shared.period.load(Ordering::Relaxed));
        let now = now();
        let deadline = now.next_multiple_of(period);
        let sleep = deadline.saturating_duration_since(now);
        let timed_out = shared
            .wake
            .wait_for(&mut state, std::time::Duration::from_nanos(sleep.as_nanos()))
            .timed_out();
        if !timed_out || state.shutdown || !state.enabled || state.generation != generation {
            continue;
        }

        let action = parking_lot::MutexGuard::unlocked(&mut state, || callback(deadline, period));
        if action == VsyncAction::Stop && state.generation == generation {
            state.enabled = false;
        }
    }
}
