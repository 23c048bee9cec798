// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-display composition statistics.

use core::fmt;

/// Running counters of one display.
///
/// Pixel operations are a rough cost unit: the area of every layer shown,
/// and separately the area that went through client composition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Frames presented or attempted.
    pub total_frames: u64,
    /// Frames whose test commit failed during validation.
    pub failed_kms_validate: u64,
    /// Frames whose real commit failed.
    pub failed_kms_present: u64,
    /// Frames composed flattened.
    pub frames_flattened: u64,
    /// Area of all layers.
    pub total_pixops: u64,
    /// Area of client-composited layers.
    pub gpu_pixops: u64,
}

impl Stats {
    /// Counter-wise difference, for "since last dump" reports.
    #[must_use]
    pub const fn minus(&self, earlier: &Self) -> Self {
        Self {
            total_frames: self.total_frames.saturating_sub(earlier.total_frames),
            failed_kms_validate: self
                .failed_kms_validate
                .saturating_sub(earlier.failed_kms_validate),
            failed_kms_present: self
                .failed_kms_present
                .saturating_sub(earlier.failed_kms_present),
            frames_flattened: self.frames_flattened.saturating_sub(earlier.frames_flattened),
            total_pixops: self.total_pixops.saturating_sub(earlier.total_pixops),
            gpu_pixops: self.gpu_pixops.saturating_sub(earlier.gpu_pixops),
        }
    }

    /// Fraction of pixel work done by hardware planes, or `None` before any
    /// frame was validated.
    #[must_use]
    pub fn efficiency(&self) -> Option<f64> {
        if self.total_pixops == 0 {
            return None;
        }
        Some(1.0 - self.gpu_pixops as f64 / self.total_pixops as f64)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(ratio) = self.efficiency() else {
            return f.write_str("No stats yet");
        };
        writeln!(f, " Total frames count: {}", self.total_frames)?;
        writeln!(f, " Failed to test commit frames: {}", self.failed_kms_validate)?;
        writeln!(f, " Failed to commit frames: {}", self.failed_kms_present)?;
        if self.failed_kms_present > 0 {
            writeln!(f, " !!! Internal failure")?;
        }
        writeln!(f, " Flattened frames: {}", self.frames_flattened)?;
        writeln!(
            f,
            " Pixel operations (free units) : [TOTAL: {} / GPU: {}]",
            self.total_pixops, self.gpu_pixops
        )?;
        write!(f, " Composition efficiency: {ratio:.3}")
    }
}
