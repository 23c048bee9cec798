// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Trace consumers for the scanout composer.
//!
//! Enable the `trace` feature of `scanout_hwc` and hand one of these sinks to
//! [`Hwc::set_trace_sink`](https://docs.rs/scanout_hwc) to see what the
//! composer did: which pipeline each display got, how many layers each frame
//! carried, and whether its test and real commits were accepted.
//!
//! Use [`pretty::PrettyPrintSink`] for live logs. Use [`recorder::RecorderSink`]
//! during a session and [`chrome::export`] afterwards to inspect it on a
//! timeline, one row per display. Wrap a sink in [`shared::SharedSink`] to
//! keep access to it after installing it.

pub mod chrome;
pub mod pretty;
pub mod recorder;
pub mod shared;
