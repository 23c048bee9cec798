// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime configuration.
//!
//! Everything is read once when the [`Hwc`](crate::Hwc) is created. There is
//! no reload path.

use scanout_core::topology::PrimaryDisplayOrder;

/// Environment variable naming the device node or node pattern.
pub const ENV_DEVICE: &str = "SCANOUT_DRM_DEVICE";
/// Environment variable toggling overlay plane use (`0` disables).
pub const ENV_USE_OVERLAY_PLANES: &str = "SCANOUT_USE_OVERLAY_PLANES";
/// Environment variable forcing scaled layers to client composition.
pub const ENV_SCALE_WITH_GPU: &str = "SCANOUT_SCALE_WITH_GPU";
/// Environment variable with the comma-separated primary display order.
pub const ENV_PRIMARY_DISPLAY_ORDER: &str = "SCANOUT_PRIMARY_DISPLAY_ORDER";
/// Environment variable with the flattening countdown in vsyncs.
pub const ENV_FLATTENING_COUNTDOWN: &str = "SCANOUT_FLATTENING_COUNTDOWN";

/// Configuration for [`Hwc::new`](crate::Hwc::new).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HwcConfig {
    /// A device node, or a pattern ending in `%` which is replaced by
    /// `0, 1, 2, …` until a node is missing.
    pub device_path: String,
    /// Claim overlay planes in addition to the primary plane.
    pub use_overlay_planes: bool,
    /// Route layers whose crop and frame differ in size through the client
    /// target.
    pub scale_with_gpu: bool,
    /// Connector preference for the primary display.
    pub primary_display_order: PrimaryDisplayOrder,
    /// Vsyncs between arming flattening and requesting a refresh.
    pub flattening_countdown: u32,
}

impl Default for HwcConfig {
    fn default() -> Self {
        Self {
            device_path: String::from("/dev/dri/card%"),
            use_overlay_planes: true,
            scale_with_gpu: false,
            primary_display_order: PrimaryDisplayOrder::default(),
            flattening_countdown: 60,
        }
    }
}

impl HwcConfig {
    /// Reads the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration from `lookup`, falling back to the defaults
    /// for missing or malformed values.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup(ENV_DEVICE).filter(|p| !p.trim().is_empty()) {
            config.device_path = path.trim().to_owned();
        }
        if let Some(flag) = lookup(ENV_USE_OVERLAY_PLANES).and_then(|v| parse_flag(&v)) {
            config.use_overlay_planes = flag;
        }
        if let Some(flag) = lookup(ENV_SCALE_WITH_GPU).and_then(|v| parse_flag(&v)) {
            config.scale_with_gpu = flag;
        }
        if let Some(order) = lookup(ENV_PRIMARY_DISPLAY_ORDER) {
            config.primary_display_order = PrimaryDisplayOrder::parse(&order);
        }
        if let Some(n) = lookup(ENV_FLATTENING_COUNTDOWN).and_then(|v| v.trim().parse().ok()) {
            config.flattening_countdown = n;
        }
        config
    }
}

/// Integer flags: zero is off, any other number is on.
fn parse_flag(value: &str) -> Option<bool> {
    value.trim().parse::<i64>().ok().map(|v| v != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(
            HwcConfig::from_lookup(|_| None),
            HwcConfig::default(),
            "nothing set"
        );
    }

    #[test]
    fn reads_every_key() {
        let config = HwcConfig::from_lookup(lookup(&[
            (ENV_DEVICE, " /dev/dri/card1 "),
            (ENV_USE_OVERLAY_PLANES, "0"),
            (ENV_SCALE_WITH_GPU, "1"),
            (ENV_PRIMARY_DISPLAY_ORDER, "HDMI-A-1, eDP-1,..."),
            (ENV_FLATTENING_COUNTDOWN, "3"),
        ]));
        assert_eq!(config.device_path, "/dev/dri/card1", "trimmed path");
        assert!(!config.use_overlay_planes, "overlays off");
        assert!(config.scale_with_gpu, "gpu scaling on");
        assert_eq!(
            config.primary_display_order.names(),
            ["HDMI-A-1", "eDP-1"],
            "names trimmed"
        );
        assert!(config.primary_display_order.catch_all(), "catch-all kept");
        assert_eq!(config.flattening_countdown, 3, "countdown");
    }

    #[test]
    fn malformed_values_keep_defaults() {
        let config = HwcConfig::from_lookup(lookup(&[
            (ENV_USE_OVERLAY_PLANES, "yes"),
            (ENV_FLATTENING_COUNTDOWN, "-4"),
            (ENV_DEVICE, "   "),
        ]));
        assert_eq!(config, HwcConfig::default(), "garbage ignored");
    }
}
