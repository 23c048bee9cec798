// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display modes and per-display configuration tables.
//!
//! A [`Mode`] is one timing set reported by a connector. A
//! [`DisplayConfigs`] table numbers those modes as consumer-visible config
//! ids and groups them by resolution, so that modes differing only in
//! refresh rate can be switched seamlessly.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

/// Mode type bit marking the connector's preferred mode.
pub const MODE_TYPE_PREFERRED: u32 = 1 << 3;
/// Mode flag bit for interlaced scanout.
pub const MODE_FLAG_INTERLACE: u32 = 1 << 4;
/// Mode flag bit for double-scan.
pub const MODE_FLAG_DBLSCAN: u32 = 1 << 5;

/// Size in bytes of the kernel's mode-info structure.
pub const MODE_BLOB_LEN: usize = 68;

const MODE_NAME_LEN: usize = 32;

/// One display timing set.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Mode {
    /// Pixel clock in kHz.
    pub clock: u32,
    /// Active horizontal pixels.
    pub hdisplay: u16,
    /// Horizontal sync start.
    pub hsync_start: u16,
    /// Horizontal sync end.
    pub hsync_end: u16,
    /// Total horizontal pixels including blanking.
    pub htotal: u16,
    /// Horizontal skew.
    pub hskew: u16,
    /// Active vertical lines.
    pub vdisplay: u16,
    /// Vertical sync start.
    pub vsync_start: u16,
    /// Vertical sync end.
    pub vsync_end: u16,
    /// Total vertical lines including blanking.
    pub vtotal: u16,
    /// Vertical scan multiplier.
    pub vscan: u16,
    /// Nominal refresh rate in Hz as reported by the kernel.
    pub vrefresh: u32,
    /// `DRM_MODE_FLAG_*` bits.
    pub flags: u32,
    /// `DRM_MODE_TYPE_*` bits.
    pub kind: u32,
    /// Human-readable mode name, e.g. `1920x1080`.
    pub name: String,
}

impl Mode {
    /// Active area as `(width, height)`.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> (u16, u16) {
        (self.hdisplay, self.vdisplay)
    }

    /// Returns `true` if the connector marked this mode preferred.
    #[inline]
    #[must_use]
    pub const fn is_preferred(&self) -> bool {
        self.kind & MODE_TYPE_PREFERRED != 0
    }

    /// Returns `true` for interlaced modes.
    #[inline]
    #[must_use]
    pub const fn is_interlaced(&self) -> bool {
        self.flags & MODE_FLAG_INTERLACE != 0
    }

    /// Refresh rate computed from the timings.
    ///
    /// Falls back to the reported `vrefresh` when the totals are zero.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "refresh rates fit easily in f32"
    )]
    pub fn refresh_hz(&self) -> f32 {
        if self.htotal == 0 || self.vtotal == 0 {
            return self.vrefresh as f32;
        }
        let mut rate =
            f64::from(self.clock) * 1000.0 / (f64::from(self.htotal) * f64::from(self.vtotal));
        if self.is_interlaced() {
            rate *= 2.0;
        }
        if self.flags & MODE_FLAG_DBLSCAN != 0 {
            rate /= 2.0;
        }
        if self.vscan > 1 {
            rate /= f64::from(self.vscan);
        }
        rate as f32
    }

    /// Serializes the mode into the kernel's mode-info layout, ready to be
    /// uploaded as a `MODE_ID` property blob.
    #[must_use]
    pub fn to_blob_bytes(&self) -> [u8; MODE_BLOB_LEN] {
        let mut out = [0_u8; MODE_BLOB_LEN];
        let mut at = 0;
        let mut put = |bytes: &[u8]| {
            out[at..at + bytes.len()].copy_from_slice(bytes);
            at += bytes.len();
        };
        put(&self.clock.to_ne_bytes());
        for v in [
            self.hdisplay,
            self.hsync_start,
            self.hsync_end,
            self.htotal,
            self.hskew,
            self.vdisplay,
            self.vsync_start,
            self.vsync_end,
            self.vtotal,
            self.vscan,
        ] {
            put(&v.to_ne_bytes());
        }
        put(&self.vrefresh.to_ne_bytes());
        put(&self.flags.to_ne_bytes());
        put(&self.kind.to_ne_bytes());
        let name = self.name.as_bytes();
        let len = name.len().min(MODE_NAME_LEN - 1);
        put(&name[..len]);
        out
    }
}

/// Removes exact duplicates from a connector's mode list, keeping the first
/// occurrence of each.
pub fn dedup_modes(modes: impl IntoIterator<Item = Mode>) -> Vec<Mode> {
    let mut out: Vec<Mode> = Vec::new();
    for mode in modes {
        if !out.contains(&mode) {
            out.push(mode);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Display configs
// ---------------------------------------------------------------------------

/// A consumer-visible display configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayConfig {
    /// Config id; never reused within a display.
    pub id: u32,
    /// Modes of equal resolution share a group.
    pub group_id: u32,
    /// The timing set.
    pub mode: Mode,
    /// Hidden from the consumer (shadowed interlaced mode).
    pub disabled: bool,
}

/// The config table of one display.
#[derive(Clone, Debug, Default)]
pub struct DisplayConfigs {
    configs: BTreeMap<u32, DisplayConfig>,
    next_id: u32,
    preferred: Option<u32>,
    active: Option<u32>,
}

impl DisplayConfigs {
    /// Creates an empty table. The first config gets id 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Rebuilds the table from a connector's current modes.
    ///
    /// Ids keep increasing across updates so a stale id from before a hotplug
    /// is rejected instead of silently naming a different mode. The active
    /// config is reset to the preferred one.
    pub fn update(&mut self, modes: &[Mode]) {
        self.configs.clear();
        self.preferred = None;
        self.active = None;
        if self.next_id == 0 {
            self.next_id = 1;
        }

        let mut groups: Vec<(u16, u16)> = Vec::new();
        for mode in modes {
            let size = mode.size();
            let group = match groups.iter().position(|g| *g == size) {
                Some(i) => i,
                None => {
                    groups.push(size);
                    groups.len() - 1
                }
            };
            let disabled = mode.is_interlaced()
                && modes.iter().any(|m| m.size() == size && !m.is_interlaced());
            let id = self.next_id;
            self.next_id += 1;
            #[expect(
                clippy::cast_possible_truncation,
                reason = "connectors report far fewer than u32::MAX modes"
            )]
            let group_id = group as u32 + 1;
            if self.preferred.is_none() && mode.is_preferred() && !disabled {
                self.preferred = Some(id);
            }
            self.configs.insert(
                id,
                DisplayConfig {
                    id,
                    group_id,
                    mode: mode.clone(),
                    disabled,
                },
            );
        }
        if self.preferred.is_none() {
            self.preferred = self.configs.values().find(|c| !c.disabled).map(|c| c.id);
        }
        self.active = self.preferred;
    }

    /// Looks up a config by id.
    #[inline]
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&DisplayConfig> {
        self.configs.get(&id)
    }

    /// Ids of configs visible to the consumer, ascending.
    pub fn visible_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.configs.values().filter(|c| !c.disabled).map(|c| c.id)
    }

    /// The preferred config, if the table is non-empty.
    #[inline]
    #[must_use]
    pub fn preferred_id(&self) -> Option<u32> {
        self.preferred
    }

    /// The active config id.
    #[inline]
    #[must_use]
    pub fn active_id(&self) -> Option<u32> {
        self.active
    }

    /// The active config.
    #[must_use]
    pub fn active(&self) -> Option<&DisplayConfig> {
        self.active.and_then(|id| self.configs.get(&id))
    }

    /// Makes `id` the active config. Returns `false` for unknown ids.
    pub fn set_active(&mut self, id: u32) -> bool {
        if self.configs.contains_key(&id) {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    /// Number of configs, including disabled ones.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Returns `true` if the table has no configs.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
