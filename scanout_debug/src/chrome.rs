// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//! Each logical display becomes its own process row.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use scanout_core::flatten::FlatteningState;
use scanout_core::time::HostTime;

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// # Errors
///
/// Returns any error from `writer`.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for recorded in decode(bytes) {
        let pid = recorded.display().0;
        let ts = us(recorded.at());
        match recorded {
            RecordedEvent::Bind(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": if e.crtc.is_some() { "Bind" } else { "BindFailed" },
                    "cat": "Binding",
                    "ts": ts,
                    "pid": pid,
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "device": e.connector.device.0,
                        "connector": e.connector.connector.0,
                        "crtc": e.crtc.map(|c| c.0),
                        "overlay_planes": e.overlay_planes,
                    }
                }));
            }
            RecordedEvent::Composition(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Composition",
                    "cat": "Frame",
                    "ts": ts,
                    "pid": pid,
                    "tid": 0,
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "layers": e.layers,
                        "client_target": e.client_target,
                    }
                }));
            }
            RecordedEvent::Commit(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": if e.test_only { "TestCommit" } else { "Commit" },
                    "cat": "Frame",
                    "ts": ts,
                    "pid": pid,
                    "tid": if e.test_only { 1 } else { 0 },
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "modeset": e.modeset,
                        "success": e.success,
                    }
                }));
            }
            RecordedEvent::Hotplug(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": if e.connected { "Connected" } else { "Disconnected" },
                    "cat": "Hotplug",
                    "ts": ts,
                    "pid": pid,
                    "tid": 0,
                    "s": "g",
                }));
            }
            RecordedEvent::Flattening(e) => {
                let countdown = match e.state {
                    FlatteningState::Countdown(n) => n,
                    _ => 0,
                };
                events.push(json!({
                    "ph": "C",
                    "name": "FlatteningCountdown",
                    "cat": "Flattening",
                    "ts": ts,
                    "pid": pid,
                    "args": {
                        "vsyncs": countdown,
                    }
                }));
                events.push(json!({
                    "ph": "i",
                    "name": format!("Flattening: {}", e.state),
                    "cat": "Flattening",
                    "ts": ts,
                    "pid": pid,
                    "tid": 0,
                    "s": "p",
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn us(t: HostTime) -> f64 {
    t.nanos() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use scanout_core::output::DisplayId;
    use scanout_core::trace::{CommitEvent, FlatteningEvent, HotplugEvent, TraceSink};

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        rec.on_hotplug(&HotplugEvent {
            display: DisplayId(2),
            connected: true,
            at: HostTime(1_000),
        });
        rec.on_commit(&CommitEvent {
            display: DisplayId(2),
            frame_index: 0,
            test_only: true,
            modeset: true,
            success: true,
            at: HostTime(3_000),
        });
        rec.on_flattening(&FlatteningEvent {
            display: DisplayId::PRIMARY,
            state: FlatteningState::Countdown(60),
            at: HostTime(4_000),
        });

        let mut out = Vec::new();
        export(rec.as_bytes(), &mut out).unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.len(), 4, "flattening emits a counter and an instant");

        assert_eq!(parsed[0]["name"], "Connected", "hotplug first");
        assert_eq!(parsed[0]["pid"], 2, "display is the process row");
        assert_eq!(parsed[0]["ts"], 1.0, "microseconds");

        assert_eq!(parsed[1]["name"], "TestCommit", "test commit named");
        assert_eq!(parsed[1]["tid"], 1, "test commits on their own track");

        assert_eq!(parsed[2]["ph"], "C", "counter event");
        assert_eq!(parsed[2]["args"]["vsyncs"], 60, "countdown value");
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], &mut out).unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        assert!(parsed.is_empty(), "no events");
    }
}
