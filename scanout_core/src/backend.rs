// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer assignment policy.
//!
//! Validation asks a [`LayerAssigner`] which layers go to hardware planes
//! ([`Device`](CompositionType::Device)) and which the consumer must render
//! into the client target ([`Client`](CompositionType::Client)). The
//! display controller only relies on the contract:
//!
//! - input: the display's layers and how many planes its pipeline has;
//! - output: a validated type on every layer, plus change and request counts.
//!
//! Whatever the policy decides, the composition built from it must fit:
//! device layers plus one client target (when any layer is client) must not
//! exceed the plane capacity.
//!
//! [`GenericAssigner`] is the default policy. It keeps client layers in one
//! contiguous z range, since the client target occupies a single plane
//! position.

use core::ops::Range;

use alloc::vec::Vec;

use crate::layer::{CompositionType, Layer, LayerId, LayerStore};

/// Result of validating a display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValidateOutcome {
    /// Layers whose validated type differs from the requested one.
    pub changed_types: usize,
    /// Layer requests the consumer must honor. Always zero for the generic
    /// policy.
    pub requests: usize,
    /// Area of all layers, in pixels.
    pub total_pixops: u64,
    /// Area of client layers, in pixels.
    pub gpu_pixops: u64,
}

/// Decides device vs. client composition for a display's layers.
pub trait LayerAssigner {
    /// Writes a validated type on every layer of `layers`.
    fn assign(&mut self, layers: &mut LayerStore, plane_capacity: usize) -> ValidateOutcome;
}

/// Default [`LayerAssigner`].
///
/// A layer is client if it asks for client composition, has no buffer, or
/// (with [`scale_with_gpu`](Self::scale_with_gpu)) needs scaling. The client
/// range spans from the lowest to the highest such layer; device layers
/// inside it become client too. If the rest still needs more planes than
/// the pipeline has, the range grows downwards first, then upwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenericAssigner {
    /// Route scaled layers through the client target.
    pub scale_with_gpu: bool,
}

impl GenericAssigner {
    fn needs_client(&self, layer: &Layer) -> bool {
        layer.requested_type() == CompositionType::Client
            || layer.buffer().is_none()
            || (self.scale_with_gpu && layer.is_scaled())
    }
}

impl LayerAssigner for GenericAssigner {
    fn assign(&mut self, layers: &mut LayerStore, plane_capacity: usize) -> ValidateOutcome {
        let ordered: Vec<(LayerId, bool)> = layers
            .z_sorted()
            .into_iter()
            .map(|(id, layer)| (id, self.needs_client(layer)))
            .collect();

        let first = ordered.iter().position(|(_, c)| *c);
        let last = ordered.iter().rposition(|(_, c)| *c);
        let mut range = match (first, last) {
            (Some(first), Some(last)) => first..last + 1,
            _ => 0..0,
        };
        grow_client_range(&mut range, ordered.len(), plane_capacity);

        for (index, (id, _)) in ordered.iter().enumerate() {
            let ty = if range.contains(&index) {
                CompositionType::Client
            } else {
                CompositionType::Device
            };
            // Ids come from the store itself.
            _ = layers.set_validated_type(*id, ty);
        }
        outcome(layers)
    }
}

/// Extends `range` until the layers outside it, plus one plane for the
/// client target, fit in `capacity`.
fn grow_client_range(range: &mut Range<usize>, len: usize, capacity: usize) {
    let needed = |r: &Range<usize>| len - r.len() + usize::from(!r.is_empty());
    while range.len() < len && needed(range) > capacity {
        if range.is_empty() {
            *range = 0..1;
        } else if range.start > 0 {
            range.start -= 1;
        } else {
            range.end += 1;
        }
    }
}

/// Marks every layer as client, as the fallback when a test commit of the
/// validated assignment fails.
pub fn assign_all_client(layers: &mut LayerStore) -> ValidateOutcome {
    let ids: Vec<LayerId> = layers.iter().map(|(id, _)| id).collect();
    for id in ids {
        _ = layers.set_validated_type(id, CompositionType::Client);
    }
    outcome(layers)
}

fn outcome(layers: &LayerStore) -> ValidateOutcome {
    let mut total = 0;
    let mut gpu = 0;
    for (_, layer) in layers.iter() {
        let area = pixel_area(layer);
        total += area;
        if layer.validated_type() == CompositionType::Client {
            gpu += area;
        }
    }
    ValidateOutcome {
        changed_types: layers.changed_types().len(),
        requests: 0,
        total_pixops: total,
        gpu_pixops: gpu,
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "frame areas are far below u64::MAX; float casts saturate"
)]
fn pixel_area(layer: &Layer) -> u64 {
    layer.display_frame().area().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferHandle;
    use kurbo::Rect;

    fn store(client: &[bool]) -> (LayerStore, Vec<LayerId>) {
        let mut store = LayerStore::new();
        let mut ids = Vec::new();
        for (z, is_client) in client.iter().enumerate() {
            let id = store.create();
            store.set_z_order(id, u32::try_from(z).unwrap()).unwrap();
            store.set_buffer(id, Some(BufferHandle(1))).unwrap();
            store
                .set_display_frame(id, Rect::new(0.0, 0.0, 10.0, 10.0))
                .unwrap();
            store
                .set_source_crop(id, Rect::new(0.0, 0.0, 10.0, 10.0))
                .unwrap();
            let ty = if *is_client {
                CompositionType::Client
            } else {
                CompositionType::Device
            };
            store.set_requested_type(id, ty).unwrap();
            ids.push(id);
        }
        (store, ids)
    }

    fn validated(store: &LayerStore) -> Vec<CompositionType> {
        store
            .z_sorted()
            .into_iter()
            .map(|(_, l)| l.validated_type())
            .collect()
    }

    use CompositionType::{Client as C, Device as D};

    #[test]
    fn everything_fits() {
        let (mut layers, _) = store(&[false, false]);
        let out = GenericAssigner::default().assign(&mut layers, 2);
        assert_eq!(validated(&layers), [D, D], "two planes, two layers");
        assert_eq!(out.changed_types, 0, "nothing changed");
        assert_eq!(out.total_pixops, 200, "two 10x10 layers");
        assert_eq!(out.gpu_pixops, 0, "no client work");
    }

    #[test]
    fn client_range_is_contiguous() {
        let (mut layers, _) = store(&[true, false, true, false]);
        let out = GenericAssigner::default().assign(&mut layers, 4);
        assert_eq!(validated(&layers), [C, C, C, D], "gap filled");
        assert_eq!(out.changed_types, 1, "layer 1 demoted");
    }

    #[test]
    fn range_grows_to_fit_planes() {
        let (mut layers, _) = store(&[false, false, false, true]);
        GenericAssigner::default().assign(&mut layers, 2);
        assert_eq!(
            validated(&layers),
            [D, C, C, C],
            "one device plane plus the client target"
        );
    }

    #[test]
    fn range_created_when_no_client() {
        let (mut layers, _) = store(&[false, false, false]);
        GenericAssigner::default().assign(&mut layers, 1);
        assert_eq!(validated(&layers), [C, C, C], "single plane holds the target");
    }

    #[test]
    fn scaled_layers_go_to_gpu() {
        let (mut layers, ids) = store(&[false, false]);
        layers
            .set_display_frame(ids[1], Rect::new(0.0, 0.0, 20.0, 20.0))
            .unwrap();
        GenericAssigner {
            scale_with_gpu: true,
        }
        .assign(&mut layers, 4);
        assert_eq!(validated(&layers), [D, C], "scaled layer is client");
    }

    #[test]
    fn all_client_fallback() {
        let (mut layers, _) = store(&[false, true]);
        let out = assign_all_client(&mut layers);
        assert_eq!(validated(&layers), [C, C], "everything client");
        assert_eq!(out.gpu_pixops, out.total_pixops, "all pixels on the GPU");
    }

    #[test]
    fn growth_terminates() {
        let mut range = 0..0;
        grow_client_range(&mut range, 0, 0);
        assert_eq!(range, 0..0, "no layers");
        let mut range = 1..2;
        grow_client_range(&mut range, 3, 0);
        assert_eq!(range, 0..3, "covers everything when nothing fits");
    }
}
