// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Client flattening.
//!
//! When a frame is judged flattenable, the display arms a countdown. Each
//! vsync tick decrements it; when it runs out the consumer is asked once to
//! refresh, so it can re-render the whole scene as a single client buffer.
//! `Disabled`, `NotRequired` and `Flattened` are set by policy and never
//! change on a tick.

use core::fmt;

/// Flattening state of one display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FlatteningState {
    /// Flattening is off.
    #[default]
    Disabled,
    /// The current frame does not need flattening.
    NotRequired,
    /// The last frame was composed flattened.
    Flattened,
    /// The countdown ran out and a refresh was requested.
    ClientRefreshRequested,
    /// Vsyncs left before a refresh is requested. Never zero.
    Countdown(u32),
}

/// An external policy decision applied with [`FlatteningState::apply`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlatteningRequest {
    /// Turn flattening off.
    Disable,
    /// Nothing to flatten.
    NotRequired,
    /// The frame was flattened.
    Flattened,
    /// Start (or restart) a countdown of this many vsyncs.
    Arm(u32),
}

/// What the tick source should do after [`FlatteningState::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TickOutcome {
    /// Keep ticking.
    Continue,
    /// Send one refresh request and stop ticking.
    RefreshRequested,
    /// Nothing is counting down; stop ticking.
    Idle,
}

impl FlatteningState {
    /// Applies a policy decision. Returns `true` if the tick source must be
    /// (re)armed.
    ///
    /// Arming with zero requests a refresh on the next tick, same as one.
    pub fn apply(&mut self, request: FlatteningRequest) -> bool {
        *self = match request {
            FlatteningRequest::Disable => Self::Disabled,
            FlatteningRequest::NotRequired => Self::NotRequired,
            FlatteningRequest::Flattened => Self::Flattened,
            FlatteningRequest::Arm(n) => Self::Countdown(n.max(1)),
        };
        self.is_counting()
    }

    /// Advances by one vsync.
    pub fn tick(&mut self) -> TickOutcome {
        match *self {
            Self::Countdown(1) => {
                *self = Self::ClientRefreshRequested;
                TickOutcome::RefreshRequested
            }
            Self::Countdown(n) => {
                *self = Self::Countdown(n - 1);
                TickOutcome::Continue
            }
            _ => TickOutcome::Idle,
        }
    }

    /// Returns `true` while a countdown is running.
    #[inline]
    #[must_use]
    pub const fn is_counting(&self) -> bool {
        matches!(self, Self::Countdown(_))
    }
}

impl fmt::Display for FlatteningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::NotRequired => f.write_str("Not needed"),
            Self::Flattened => f.write_str("Active"),
            Self::ClientRefreshRequested => f.write_str("Refresh requested"),
            Self::Countdown(n) => write!(f, "{n} VSync remains"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn countdown_fires_once() {
        let mut state = FlatteningState::Disabled;
        assert!(state.apply(FlatteningRequest::Arm(3)), "arming starts ticks");

        assert_eq!(state.tick(), TickOutcome::Continue, "3 -> 2");
        assert_eq!(state.tick(), TickOutcome::Continue, "2 -> 1");
        assert_eq!(state.tick(), TickOutcome::RefreshRequested, "1 -> refresh");
        assert_eq!(
            state,
            FlatteningState::ClientRefreshRequested,
            "refresh requested"
        );
        assert_eq!(state.tick(), TickOutcome::Idle, "no second refresh");
        assert_eq!(state.tick(), TickOutcome::Idle, "still idle");

        assert!(state.apply(FlatteningRequest::Arm(1)), "re-armed");
        assert_eq!(state.tick(), TickOutcome::RefreshRequested, "fires again");
    }

    #[test]
    fn policy_states_ignore_ticks() {
        for request in [
            FlatteningRequest::Disable,
            FlatteningRequest::NotRequired,
            FlatteningRequest::Flattened,
        ] {
            let mut state = FlatteningState::Countdown(5);
            assert!(!state.apply(request), "{request:?} does not arm");
            let before = state;
            assert_eq!(state.tick(), TickOutcome::Idle, "{request:?} is a sink");
            assert_eq!(state, before, "{request:?} unchanged by tick");
        }
    }

    #[test]
    fn zero_countdown_clamps() {
        let mut state = FlatteningState::default();
        state.apply(FlatteningRequest::Arm(0));
        assert_eq!(state, FlatteningState::Countdown(1), "clamped to one");
    }

    #[test]
    fn display_text() {
        assert_eq!(
            FlatteningState::Countdown(7).to_string(),
            "7 VSync remains",
            "countdown text"
        );
        assert_eq!(
            FlatteningState::NotRequired.to_string(),
            "Not needed",
            "policy text"
        );
    }
}
