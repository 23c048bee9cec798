// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic host time.
//!
//! [`HostTime`] is a point on the kernel's monotonic clock in nanoseconds,
//! the same clock vblank timestamps and fences use. [`Duration`] is a span on
//! that clock.

use core::fmt;
use core::ops::{Add, Sub};

/// A point in time on the monotonic clock, in nanoseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Returns the duration between `self` and an earlier time, or zero if
    /// `earlier` is after `self`.
    #[inline]
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }

    /// Checked addition of a duration.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, duration: Duration) -> Option<Self> {
        match self.0.checked_add(duration.0) {
            Some(t) => Some(Self(t)),
            None => None,
        }
    }

    /// Returns the first multiple of `period` strictly after `self`.
    ///
    /// Synthetic vblank timing aligns every tick to this grid so that ticks
    /// stay phase-stable when the worker wakes up late. A zero period returns
    /// `self`.
    #[inline]
    #[must_use]
    pub const fn next_multiple_of(self, period: Duration) -> Self {
        if period.0 == 0 {
            return self;
        }
        Self((self.0 / period.0 + 1) * period.0)
    }
}

impl Add<Duration> for HostTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for HostTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Self) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({})", self.0)
    }
}

/// A span of time in nanoseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(pub u64);

impl Duration {
    /// Zero duration.
    pub const ZERO: Self = Self(0);

    /// Creates a duration from milliseconds.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000_000)
    }

    /// Returns the duration in nanoseconds.
    #[inline]
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// The vblank period of a refresh rate given in hertz.
    ///
    /// Non-positive or non-finite rates yield `None`.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "rate is checked positive and finite; sub-nanosecond precision is not needed"
    )]
    pub fn from_refresh_hz(hz: f32) -> Option<Self> {
        if !hz.is_finite() || hz <= 0.0 {
            return None;
        }
        Some(Self((1e9_f64 / f64::from(hz)) as u64))
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Duration({}ns)", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_multiple_is_strictly_after() {
        let period = Duration(16);
        assert_eq!(
            HostTime(0).next_multiple_of(period),
            HostTime(16),
            "a time on the grid advances one period"
        );
        assert_eq!(
            HostTime(17).next_multiple_of(period),
            HostTime(32),
            "an off-grid time rounds up"
        );
        assert_eq!(
            HostTime(5).next_multiple_of(Duration::ZERO),
            HostTime(5),
            "zero period is identity"
        );
    }

    #[test]
    fn refresh_period() {
        assert_eq!(
            Duration::from_refresh_hz(50.0),
            Some(Duration(20_000_000)),
            "50 Hz is 20 ms"
        );
        assert_eq!(Duration::from_refresh_hz(0.0), None, "zero rate has no period");
        assert_eq!(
            Duration::from_refresh_hz(f32::NAN),
            None,
            "NaN rate has no period"
        );
    }

    #[test]
    fn saturating_since() {
        assert_eq!(
            HostTime(10).saturating_duration_since(HostTime(20)),
            Duration::ZERO,
            "earlier-after-self saturates to zero"
        );
        assert_eq!(HostTime(30) - HostTime(20), Duration(10), "plain subtraction");
    }
}
