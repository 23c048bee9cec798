// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use kurbo::Rect;

use super::id::LayerId;
use crate::buffer::BufferHandle;
use crate::error::{HandleKind, ScanoutError};

/// Who puts a layer on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CompositionType {
    /// Not decided yet.
    #[default]
    Invalid,
    /// Rendered by the consumer into the client target.
    Client,
    /// Scanned out directly by a hardware plane.
    Device,
}

/// How a layer blends with what is below it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Opaque.
    #[default]
    None,
    /// Color already multiplied by alpha.
    Premultiplied,
    /// Straight alpha.
    Coverage,
}

/// Color space tag of a buffer. Zero is "unknown".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Dataspace(pub i32);

impl Dataspace {
    /// Unknown / device default.
    pub const UNKNOWN: Self = Self(0);
}

/// One consumer layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    buffer: Option<BufferHandle>,
    source_crop: Rect,
    display_frame: Rect,
    blend: BlendMode,
    alpha: f32,
    z_order: u32,
    dataspace: Dataspace,
    requested: CompositionType,
    validated: CompositionType,
}

impl Default for Layer {
    fn default() -> Self {
        Self {
            buffer: None,
            source_crop: Rect::ZERO,
            display_frame: Rect::ZERO,
            blend: BlendMode::None,
            alpha: 1.0,
            z_order: 0,
            dataspace: Dataspace::UNKNOWN,
            requested: CompositionType::Invalid,
            validated: CompositionType::Invalid,
        }
    }
}

impl Layer {
    /// Buffer to scan out, if any.
    #[inline]
    #[must_use]
    pub const fn buffer(&self) -> Option<BufferHandle> {
        self.buffer
    }

    /// Region of the buffer to show, in buffer pixels.
    #[inline]
    #[must_use]
    pub const fn source_crop(&self) -> Rect {
        self.source_crop
    }

    /// Where the crop lands on the display.
    #[inline]
    #[must_use]
    pub const fn display_frame(&self) -> Rect {
        self.display_frame
    }

    /// Blend mode.
    #[inline]
    #[must_use]
    pub const fn blend(&self) -> BlendMode {
        self.blend
    }

    /// Plane alpha in `0.0..=1.0`.
    #[inline]
    #[must_use]
    pub const fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Consumer z-order.
    #[inline]
    #[must_use]
    pub const fn z_order(&self) -> u32 {
        self.z_order
    }

    /// Dataspace.
    #[inline]
    #[must_use]
    pub const fn dataspace(&self) -> Dataspace {
        self.dataspace
    }

    /// Composition type the consumer asked for.
    #[inline]
    #[must_use]
    pub const fn requested_type(&self) -> CompositionType {
        self.requested
    }

    /// Composition type decided by validation.
    #[inline]
    #[must_use]
    pub const fn validated_type(&self) -> CompositionType {
        self.validated
    }

    /// Returns `true` when the crop and frame differ in size.
    #[must_use]
    pub fn is_scaled(&self) -> bool {
        self.source_crop.size() != self.display_frame.size()
    }

    /// Sets the buffer.
    pub fn set_buffer(&mut self, buffer: Option<BufferHandle>) {
        self.buffer = buffer;
    }

    /// Sets the source crop.
    pub fn set_source_crop(&mut self, crop: Rect) {
        self.source_crop = crop;
    }

    /// Sets the display frame.
    pub fn set_display_frame(&mut self, frame: Rect) {
        self.display_frame = frame;
    }

    /// Sets the dataspace.
    pub fn set_dataspace(&mut self, dataspace: Dataspace) {
        self.dataspace = dataspace;
    }

    /// Sets the blend mode.
    pub fn set_blend(&mut self, blend: BlendMode) {
        self.blend = blend;
    }
}

/// Layers of one display, keyed by never-reused handles.
#[derive(Clone, Debug)]
pub struct LayerStore {
    layers: BTreeMap<LayerId, Layer>,
    next_id: u64,
}

impl Default for LayerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerStore {
    /// Creates an empty store. The first handle is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            layers: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Creates a layer with default properties.
    pub fn create(&mut self) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        self.layers.insert(id, Layer::default());
        id
    }

    /// Destroys a layer.
    ///
    /// # Errors
    ///
    /// [`ScanoutError::BadHandle`] if the layer does not exist.
    pub fn destroy(&mut self, id: LayerId) -> Result<(), ScanoutError> {
        self.layers
            .remove(&id)
            .map(|_| ())
            .ok_or(ScanoutError::BadHandle(HandleKind::Layer))
    }

    /// Looks up a layer.
    #[inline]
    #[must_use]
    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }

    /// Looks up a layer for mutation.
    ///
    /// # Errors
    ///
    /// [`ScanoutError::BadHandle`] if the layer does not exist.
    pub fn get_mut(&mut self, id: LayerId) -> Result<&mut Layer, ScanoutError> {
        self.layers
            .get_mut(&id)
            .ok_or(ScanoutError::BadHandle(HandleKind::Layer))
    }

    /// Sets a layer's buffer.
    ///
    /// # Errors
    ///
    /// [`ScanoutError::BadHandle`] for unknown layers.
    pub fn set_buffer(
        &mut self,
        id: LayerId,
        buffer: Option<BufferHandle>,
    ) -> Result<(), ScanoutError> {
        self.get_mut(id)?.buffer = buffer;
        Ok(())
    }

    /// Sets a layer's source crop.
    ///
    /// # Errors
    ///
    /// [`ScanoutError::BadHandle`] for unknown layers,
    /// [`ScanoutError::BadParameter`] for a crop with negative size.
    pub fn set_source_crop(&mut self, id: LayerId, crop: Rect) -> Result<(), ScanoutError> {
        let layer = self.get_mut(id)?;
        if crop.width() < 0.0 || crop.height() < 0.0 {
            return Err(ScanoutError::BadParameter);
        }
        layer.source_crop = crop;
        Ok(())
    }

    /// Sets a layer's display frame.
    ///
    /// # Errors
    ///
    /// [`ScanoutError::BadHandle`] for unknown layers,
    /// [`ScanoutError::BadParameter`] for a frame with negative size.
    pub fn set_display_frame(&mut self, id: LayerId, frame: Rect) -> Result<(), ScanoutError> {
        let layer = self.get_mut(id)?;
        if frame.width() < 0.0 || frame.height() < 0.0 {
            return Err(ScanoutError::BadParameter);
        }
        layer.display_frame = frame;
        Ok(())
    }

    /// Sets a layer's blend mode.
    ///
    /// # Errors
    ///
    /// [`ScanoutError::BadHandle`] for unknown layers.
    pub fn set_blend_mode(&mut self, id: LayerId, blend: BlendMode) -> Result<(), ScanoutError> {
        self.get_mut(id)?.blend = blend;
        Ok(())
    }

    /// Sets a layer's plane alpha.
    ///
    /// # Errors
    ///
    /// [`ScanoutError::BadHandle`] for unknown layers,
    /// [`ScanoutError::BadParameter`] outside `0.0..=1.0`.
    pub fn set_alpha(&mut self, id: LayerId, alpha: f32) -> Result<(), ScanoutError> {
        let layer = self.get_mut(id)?;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ScanoutError::BadParameter);
        }
        layer.alpha = alpha;
        Ok(())
    }

    /// Sets a layer's z-order.
    ///
    /// # Errors
    ///
    /// [`ScanoutError::BadHandle`] for unknown layers.
    pub fn set_z_order(&mut self, id: LayerId, z_order: u32) -> Result<(), ScanoutError> {
        self.get_mut(id)?.z_order = z_order;
        Ok(())
    }

    /// Sets a layer's dataspace.
    ///
    /// # Errors
    ///
    /// [`ScanoutError::BadHandle`] for unknown layers.
    pub fn set_dataspace(&mut self, id: LayerId, dataspace: Dataspace) -> Result<(), ScanoutError> {
        self.get_mut(id)?.dataspace = dataspace;
        Ok(())
    }

    /// Sets the composition type the consumer asks for.
    ///
    /// # Errors
    ///
    /// [`ScanoutError::BadHandle`] for unknown layers,
    /// [`ScanoutError::BadParameter`] for [`CompositionType::Invalid`].
    pub fn set_requested_type(
        &mut self,
        id: LayerId,
        ty: CompositionType,
    ) -> Result<(), ScanoutError> {
        let layer = self.get_mut(id)?;
        if ty == CompositionType::Invalid {
            return Err(ScanoutError::BadParameter);
        }
        layer.requested = ty;
        Ok(())
    }

    /// Layers in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (LayerId, &Layer)> + '_ {
        self.layers.iter().map(|(id, layer)| (*id, layer))
    }

    /// Layers sorted by `(z_order, LayerId)`, bottom first.
    #[must_use]
    pub fn z_sorted(&self) -> Vec<(LayerId, &Layer)> {
        let mut out: Vec<_> = self.iter().collect();
        out.sort_by_key(|(id, layer)| (layer.z_order, *id));
        out
    }

    /// Writes a validated type.
    ///
    /// # Errors
    ///
    /// [`ScanoutError::BadHandle`] for unknown layers.
    pub fn set_validated_type(
        &mut self,
        id: LayerId,
        ty: CompositionType,
    ) -> Result<(), ScanoutError> {
        self.get_mut(id)?.validated = ty;
        Ok(())
    }

    /// Layers whose validated type differs from what was requested.
    #[must_use]
    pub fn changed_types(&self) -> Vec<(LayerId, CompositionType)> {
        self.iter()
            .filter(|(_, l)| l.validated != l.requested)
            .map(|(id, l)| (id, l.validated))
            .collect()
    }

    /// Adopts every validated type as the requested one.
    pub fn accept_changes(&mut self) {
        for layer in self.layers.values_mut() {
            layer.requested = layer.validated;
        }
    }

    /// Number of layers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` if there are no layers.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_never_reused() {
        let mut store = LayerStore::new();
        let a = store.create();
        store.destroy(a).unwrap();
        let b = store.create();
        assert!(b > a, "new handle is newer");
        assert_eq!(
            store.destroy(a),
            Err(ScanoutError::BadHandle(HandleKind::Layer)),
            "stale handle is rejected"
        );
        assert_eq!(
            store.set_z_order(a, 3),
            Err(ScanoutError::BadHandle(HandleKind::Layer)),
            "setters reject stale handles too"
        );
    }

    #[test]
    fn z_ties_resolve_by_creation() {
        let mut store = LayerStore::new();
        let a = store.create();
        let b = store.create();
        let c = store.create();
        store.set_z_order(a, 5).unwrap();
        store.set_z_order(b, 1).unwrap();
        store.set_z_order(c, 1).unwrap();
        let order: Vec<LayerId> = store.z_sorted().into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, [b, c, a], "z first, creation order on ties");
    }

    #[test]
    fn parameter_validation() {
        let mut store = LayerStore::new();
        let a = store.create();
        assert_eq!(
            store.set_alpha(a, 1.5),
            Err(ScanoutError::BadParameter),
            "alpha above one"
        );
        assert_eq!(
            store.set_source_crop(a, Rect::new(10.0, 0.0, 0.0, 5.0)),
            Err(ScanoutError::BadParameter),
            "inverted crop"
        );
        assert_eq!(
            store.set_requested_type(a, CompositionType::Invalid),
            Err(ScanoutError::BadParameter),
            "cannot request invalid"
        );
        assert!(store.set_alpha(a, 0.5).is_ok(), "in range");
    }

    #[test]
    fn changed_types_and_accept() {
        let mut store = LayerStore::new();
        let a = store.create();
        let b = store.create();
        store.set_requested_type(a, CompositionType::Device).unwrap();
        store.set_requested_type(b, CompositionType::Device).unwrap();
        store.set_validated_type(a, CompositionType::Device).unwrap();
        store.set_validated_type(b, CompositionType::Client).unwrap();
        assert_eq!(
            store.changed_types(),
            [(b, CompositionType::Client)],
            "only b changed"
        );
        store.accept_changes();
        assert!(store.changed_types().is_empty(), "accepted");
        assert_eq!(
            store.get(b).map(Layer::requested_type),
            Some(CompositionType::Client),
            "request follows validation"
        );
    }
}
