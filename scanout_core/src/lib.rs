// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hardware object model and per-frame composition for KMS scanout.
//!
//! `scanout_core` holds everything that can be decided without talking to a
//! kernel: which connector, encoder, CRTC and planes serve a logical display,
//! which layers go to hardware planes, and what property writes make up one
//! atomic transaction. It is `no_std` compatible (with `alloc`); the
//! `scanout_hwc` crate supplies threads, locks and a transport.
//!
//! # Architecture
//!
//! ```text
//!   Device (enumerated objects)
//!       │
//!       ▼
//!   topology::order_displays ──► DisplayId ↔ ConnectorRef
//!       │
//!       ▼
//!   binder::bind_pipeline ──► ClaimTable ──► DisplayPipeline
//!                                                 │
//!                 ┌───────────────────────────────┘
//!                 ▼
//!   LayerStore ──► LayerAssigner::assign ──► composition::order_entries
//!                                                 │
//!                 ┌───────────────────────────────┘
//!                 ▼
//!   Composition ──► commit::build_request ──► AtomicRequest
//! ```
//!
//! **[`hw`]**: arena of kernel objects (connectors, encoders, CRTCs, planes)
//! addressed by integer ids.
//!
//! **[`claim`]**: exclusive ownership of encoders, CRTCs and planes. A claim
//! table entry is the only thing that makes an object "taken".
//!
//! **[`binder`]**: preference-ordered search for a conflict-free pipeline.
//!
//! **[`topology`]**: primary-display policy and logical display numbering.
//!
//! **[`mode`]**: display modes and the per-display configuration table.
//!
//! **[`layer`]**: consumer layers with never-reused handles.
//!
//! **[`composition`]** and **[`commit`]**: per-frame ordered hardware layers
//! and the property writes that present them.
//!
//! **[`backend`]**: the [`LayerAssigner`](backend::LayerAssigner) policy seam
//! deciding device vs. client composition.
//!
//! **[`flatten`]**: client-flattening countdown state machine.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types, with
//! a zero-overhead [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod backend;
pub mod binder;
pub mod buffer;
pub mod claim;
pub mod commit;
pub mod composition;
pub mod error;
pub mod flatten;
pub mod hw;
pub mod layer;
pub mod mode;
pub mod output;
pub mod pipeline;
pub mod stats;
#[cfg(test)]
mod testing;
pub mod time;
pub mod topology;
pub mod trace;
