// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Exclusive ownership of encoders, CRTCs and planes.
//!
//! The [`ClaimTable`] maps each claimed [`ClaimKey`] to the [`OwnerToken`]
//! holding it. Objects themselves carry no owner field; "who owns this plane"
//! is always a lookup here, which is what lets a hotplug revoke a whole
//! pipeline by dropping one owner's entries.
//!
//! Invariant: a key has at most one owner. A failed claim never changes the
//! table.

use alloc::collections::BTreeMap;
use core::fmt;

use crate::hw::ClaimKey;
use crate::output::DisplayId;

/// Opaque identity of a claim holder.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerToken(pub u64);

impl From<DisplayId> for OwnerToken {
    #[inline]
    fn from(display: DisplayId) -> Self {
        Self(display.0)
    }
}

impl fmt::Debug for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerToken({})", self.0)
    }
}

/// A claim was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimError {
    /// The object is held by `owner`.
    AlreadyClaimed {
        /// The object that was asked for.
        key: ClaimKey,
        /// Its current holder.
        owner: OwnerToken,
    },
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyClaimed { key, owner } => {
                write!(f, "{key:?} is already claimed by {owner:?}")
            }
        }
    }
}

impl core::error::Error for ClaimError {}

/// Table of exclusive claims.
#[derive(Clone, Debug, Default)]
pub struct ClaimTable {
    claims: BTreeMap<ClaimKey, OwnerToken>,
}

impl ClaimTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key` for `owner`.
    ///
    /// Claiming an object the same owner already holds succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::AlreadyClaimed`] if another owner holds `key`.
    /// The existing claim is untouched.
    pub fn claim(&mut self, key: ClaimKey, owner: OwnerToken) -> Result<(), ClaimError> {
        match self.claims.get(&key) {
            Some(&current) if current != owner => Err(ClaimError::AlreadyClaimed {
                key,
                owner: current,
            }),
            _ => {
                self.claims.insert(key, owner);
                Ok(())
            }
        }
    }

    /// Claims every key or none of them.
    ///
    /// # Errors
    ///
    /// Returns the first conflict found. The table is unchanged on error.
    pub fn claim_all(&mut self, keys: &[ClaimKey], owner: OwnerToken) -> Result<(), ClaimError> {
        for &key in keys {
            if let Some(&current) = self.claims.get(&key)
                && current != owner
            {
                return Err(ClaimError::AlreadyClaimed {
                    key,
                    owner: current,
                });
            }
        }
        for &key in keys {
            self.claims.insert(key, owner);
        }
        Ok(())
    }

    /// Releases `key`, returning its former owner.
    pub fn release(&mut self, key: ClaimKey) -> Option<OwnerToken> {
        self.claims.remove(&key)
    }

    /// Releases everything `owner` holds. Returns how many claims were dropped.
    pub fn release_owner(&mut self, owner: OwnerToken) -> usize {
        let before = self.claims.len();
        self.claims.retain(|_, o| *o != owner);
        before - self.claims.len()
    }

    /// Current holder of `key`. This is a lookup; it grants nothing.
    #[inline]
    #[must_use]
    pub fn owner(&self, key: ClaimKey) -> Option<OwnerToken> {
        self.claims.get(&key).copied()
    }

    /// Returns `true` if nobody holds `key`.
    #[inline]
    #[must_use]
    pub fn is_free(&self, key: ClaimKey) -> bool {
        !self.claims.contains_key(&key)
    }

    /// Number of objects `owner` holds.
    #[must_use]
    pub fn count_owned(&self, owner: OwnerToken) -> usize {
        self.claims.values().filter(|o| **o == owner).count()
    }

    /// Total number of claims.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Returns `true` if nothing is claimed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}
