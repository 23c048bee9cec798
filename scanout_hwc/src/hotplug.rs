// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hotplug event delivery.
//!
//! A [`HotplugSource`] blocks until the kernel (or a host) reports that some
//! connector may have changed. The listener thread then runs the composer's
//! hotplug handler, which works out which displays actually changed.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error};

/// How long the listener blocks before checking whether it should stop.
const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);

/// Something that reports connector changes.
pub trait HotplugSource: Send {
    /// Blocks up to `timeout` for an event. Returns `Ok(true)` if one (or
    /// several) arrived.
    ///
    /// # Errors
    ///
    /// Any error stops the listener.
    fn wait_event(&mut self, timeout: std::time::Duration) -> io::Result<bool>;
}

/// Sending half of [`channel`].
#[derive(Clone, Debug)]
pub struct HotplugSender {
    tx: Sender<()>,
}

impl HotplugSender {
    /// Reports that connectors may have changed. Returns `false` once the
    /// listener is gone.
    pub fn notify(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// A [`HotplugSource`] fed from a channel, for hosts that run their own
/// device monitor.
#[derive(Debug)]
pub struct ChannelHotplugSource {
    rx: Receiver<()>,
}

/// Creates a connected sender and source.
#[must_use]
pub fn channel() -> (HotplugSender, ChannelHotplugSource) {
    let (tx, rx) = channel::unbounded();
    (HotplugSender { tx }, ChannelHotplugSource { rx })
}

impl HotplugSource for ChannelHotplugSource {
    fn wait_event(&mut self, timeout: std::time::Duration) -> io::Result<bool> {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => {
                // Bursts collapse into one rescan.
                while self.rx.try_recv().is_ok() {}
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "hotplug sender dropped",
            )),
        }
    }
}

/// Thread running a hotplug handler for every source event.
#[derive(Debug)]
pub(crate) struct HotplugListener {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HotplugListener {
    pub(crate) fn spawn<H>(mut source: Box<dyn HotplugSource>, mut handler: H) -> io::Result<Self>
    where
        H: FnMut() + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let thread = std::thread::Builder::new()
            .name("scanout-hotplug".into())
            .spawn(move || {
                while thread_running.load(Ordering::Acquire) {
                    match source.wait_event(POLL_INTERVAL) {
                        Ok(true) => {
                            debug!("hotplug event");
                            handler();
                        }
                        Ok(false) => {}
                        Err(err) => {
                            error!("hotplug source failed, listener stops: {err}");
                            return;
                        }
                    }
                }
            })?;
        Ok(Self {
            running,
            thread: Some(thread),
        })
    }
}

impl Drop for HotplugListener {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    #[test]
    fn bursts_collapse() {
        let (tx, mut source) = channel();
        assert!(tx.notify(), "listener alive");
        assert!(tx.notify(), "listener alive");
        assert!(
            source.wait_event(POLL_INTERVAL).unwrap(),
            "event delivered"
        );
        assert!(
            !source
                .wait_event(std::time::Duration::from_millis(1))
                .unwrap(),
            "second notify folded into the first"
        );
    }

    #[test]
    fn disconnected_sender_is_an_error() {
        let (tx, mut source) = channel();
        drop(tx);
        assert!(
            source.wait_event(POLL_INTERVAL).is_err(),
            "no sender left"
        );
    }

    #[test]
    fn listener_runs_handler_and_stops() {
        let (tx, source) = channel();
        let hits = Arc::new(AtomicU32::new(0));
        let seen = hits.clone();
        let listener = HotplugListener::spawn(Box::new(source), move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        tx.notify();
        let start = Instant::now();
        while hits.load(Ordering::SeqCst) == 0 && start.elapsed().as_secs() < 2 {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1, "handler ran once");
        drop(listener);
        assert!(!tx.notify(), "source dropped with the listener");
    }
}
