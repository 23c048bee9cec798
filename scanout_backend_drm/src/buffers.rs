// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-populated buffer table.

use std::collections::HashMap;
use std::io;

use parking_lot::RwLock;
use scanout_core::buffer::{BufferHandle, BufferInfo};
use scanout_hwc::{BufferDescriber, TransportError};

/// A [`BufferDescriber`] backed by a table the buffer allocator fills.
///
/// The allocator registers each buffer when it imports it on the scanout
/// device and unregisters it when the last reference goes away.
#[derive(Debug, Default)]
pub struct BufferRegistry {
    buffers: RwLock<HashMap<BufferHandle, BufferInfo>>,
}

impl BufferRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `info` for `handle`, returning the description it replaced.
    pub fn register(&self, handle: BufferHandle, info: BufferInfo) -> Option<BufferInfo> {
        self.buffers.write().insert(handle, info)
    }

    /// Forgets `handle`.
    pub fn unregister(&self, handle: BufferHandle) -> Option<BufferInfo> {
        self.buffers.write().remove(&handle)
    }

    /// Number of registered buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.read().len()
    }

    /// Whether no buffer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.read().is_empty()
    }
}

impl BufferDescriber for BufferRegistry {
    fn describe(&self, buffer: BufferHandle) -> Result<BufferInfo, TransportError> {
        self.buffers.read().get(&buffer).copied().ok_or_else(|| {
            TransportError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{buffer:?} was never registered"),
            ))
        })
    }
}
