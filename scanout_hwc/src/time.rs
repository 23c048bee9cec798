// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host clock reads.

use rustix::time::{ClockId, Timespec, clock_gettime};
use scanout_core::time::HostTime;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Returns the current `CLOCK_MONOTONIC` time in nanoseconds, the clock
/// vsync timestamps are reported in.
#[must_use]
pub fn now() -> HostTime {
    timespec_to_host_time(clock_gettime(ClockId::Monotonic))
}

fn timespec_to_host_time(timespec: Timespec) -> HostTime {
    let seconds = u64::try_from(timespec.tv_sec).unwrap_or(0);
    let nanos = u64::try_from(timespec.tv_nsec)
        .unwrap_or(0)
        .min(999_999_999);

    let nanos_u128 = u128::from(seconds)
        .saturating_mul(NANOS_PER_SECOND)
        .saturating_add(u128::from(nanos));
    HostTime(u64::try_from(nanos_u128).unwrap_or(u64::MAX))
}
