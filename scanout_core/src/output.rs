// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Logical display identification.
//!
//! [`DisplayId`] is the handle exposed to the consumer. It is assigned once
//! at enumeration and survives hotplug: the pipeline behind it may change,
//! the number never does.

use core::fmt;

/// Identifies a logical display output.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayId(pub u64);

impl DisplayId {
    /// The canonical primary display slot.
    pub const PRIMARY: Self = Self(1);

    /// Returns `true` for the primary display.
    #[inline]
    #[must_use]
    pub const fn is_primary(self) -> bool {
        self.0 == Self::PRIMARY.0
    }

    /// Returns the display that follows this one in numbering order.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Debug for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DisplayId({})", self.0)
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
