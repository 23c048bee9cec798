// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame composition.
//!
//! A [`Composition`] is the bottom-to-top list of buffers one atomic commit
//! puts on planes. It contains every layer validated as
//! [`Device`](CompositionType::Device) plus, if any layer was validated as
//! [`Client`](CompositionType::Client), a single entry for the client target
//! at the lowest client z-order.
//!
//! Ordering is by `(z_order, LayerId)`. The client entry borrows the key of
//! the lowest client layer, so a device layer with the same z-order is kept
//! and ordered by creation rather than replaced.

use alloc::vec::Vec;

use kurbo::Rect;

use crate::error::{HandleKind, ScanoutError};
use crate::hw::FramebufferId;
use crate::layer::{BlendMode, CompositionType, Layer, LayerId, LayerStore};

/// Where a composition entry's pixels come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerSource {
    /// A device-composited consumer layer.
    Layer(LayerId),
    /// The client target holding every client-composited layer.
    ClientTarget,
}

/// One slot of the ordered composition, before buffer import.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompositionEntry {
    /// Pixel source.
    pub source: LayerSource,
    /// Effective z-order.
    pub z_order: u32,
    key: LayerId,
}

/// Orders the entries of the next frame.
///
/// # Errors
///
/// [`ScanoutError::NoLayers`] when no layer was validated as device or
/// client.
pub fn order_entries(store: &LayerStore) -> Result<Vec<CompositionEntry>, ScanoutError> {
    let mut entries: Vec<CompositionEntry> = Vec::new();
    let mut lowest_client: Option<(u32, LayerId)> = None;

    for (id, layer) in store.iter() {
        match layer.validated_type() {
            CompositionType::Device => entries.push(CompositionEntry {
                source: LayerSource::Layer(id),
                z_order: layer.z_order(),
                key: id,
            }),
            CompositionType::Client => {
                let candidate = (layer.z_order(), id);
                if lowest_client.is_none_or(|low| candidate < low) {
                    lowest_client = Some(candidate);
                }
            }
            CompositionType::Invalid => {}
        }
    }
    if let Some((z_order, key)) = lowest_client {
        entries.push(CompositionEntry {
            source: LayerSource::ClientTarget,
            z_order,
            key,
        });
    }
    if entries.is_empty() {
        return Err(ScanoutError::NoLayers);
    }
    entries.sort_by_key(|e| (e.z_order, e.key));
    Ok(entries)
}

/// A composition entry with its buffer imported.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HwLayer {
    /// Pixel source.
    pub source: LayerSource,
    /// Imported framebuffer.
    pub framebuffer: FramebufferId,
    /// Buffer region, in buffer pixels.
    pub source_crop: Rect,
    /// Destination on the display.
    pub display_frame: Rect,
    /// Plane alpha.
    pub alpha: f32,
    /// Blend mode.
    pub blend: BlendMode,
}

/// The ordered hardware layers of one frame, bottom first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Composition {
    layers: Vec<HwLayer>,
}

impl Composition {
    /// Hardware layers, bottom first.
    #[inline]
    #[must_use]
    pub fn layers(&self) -> &[HwLayer] {
        &self.layers
    }

    /// Framebuffers referenced by this composition.
    pub fn framebuffers(&self) -> impl Iterator<Item = FramebufferId> + '_ {
        self.layers.iter().map(|l| l.framebuffer)
    }

    /// Number of layers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` if the composition is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Builds the frame's composition, importing each entry's buffer.
///
/// `import` is called once per entry, bottom first. It owns whatever it
/// creates: if a later import fails, earlier framebuffers are the caller's to
/// release.
///
/// # Errors
///
/// [`ScanoutError::NoLayers`] for an empty frame, or the first error
/// returned by `import`.
pub fn build_composition<F>(
    store: &LayerStore,
    client_target: &Layer,
    mut import: F,
) -> Result<Composition, ScanoutError>
where
    F: FnMut(&Layer) -> Result<FramebufferId, ScanoutError>,
{
    let entries = order_entries(store)?;
    let mut layers = Vec::with_capacity(entries.len());
    for entry in entries {
        let layer = match entry.source {
            LayerSource::Layer(id) => store
                .get(id)
                .ok_or(ScanoutError::BadHandle(HandleKind::Layer))?,
            LayerSource::ClientTarget => client_target,
        };
        let framebuffer = import(layer)?;
        layers.push(HwLayer {
            source: entry.source,
            framebuffer,
            source_crop: layer.source_crop(),
            display_frame: layer.display_frame(),
            alpha: layer.alpha(),
            blend: layer.blend(),
        });
    }
    Ok(Composition { layers })
}
