// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Consumer layers.
//!
//! A *layer* is one drawable the consumer wants on screen. Each layer has:
//!
//! - An identity ([`LayerId`]) allocated from a counter that never goes
//!   backwards, so a destroyed handle can never name a newer layer.
//! - **Consumer properties**: buffer, source crop, display frame, blend mode,
//!   plane alpha, z-order and dataspace.
//! - A **requested** composition type from the consumer and a **validated**
//!   type written by the [`LayerAssigner`](crate::backend::LayerAssigner).
//!
//! Z-order is consumer-assigned and need not be unique. Composition orders
//! layers by `(z_order, LayerId)`, so ties resolve by creation order.

mod id;
mod store;

pub use id::LayerId;
pub use store::{BlendMode, CompositionType, Dataspace, Layer, LayerStore};
