// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primary-display policy and logical display numbering.
//!
//! [`order_displays`] looks at every connector of every device and decides
//! which one becomes [`DisplayId::PRIMARY`] and which numbers the rest get.
//!
//! Primary candidates are the connected internal or external connectors.
//! Names listed in the [`PrimaryDisplayOrder`] move to the front in list
//! order. When the list ends with the catch-all marker `...`, the unlisted
//! candidates follow, internal panels first. Without the marker, unlisted
//! connectors can never be primary.
//!
//! Every other connected connector is numbered from 2 in discovery order.
//! Disconnected connectors are numbered after those so that they can be
//! surfaced by a later hotplug without renumbering anything.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use crate::hw::{ConnectorClass, ConnectorRef, Device};
use crate::output::DisplayId;

/// List entry meaning "any connector not listed".
pub const CATCH_ALL: &str = "...";

/// Ordered connector-name preference for the primary display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimaryDisplayOrder {
    names: Vec<String>,
    catch_all: bool,
}

impl Default for PrimaryDisplayOrder {
    /// Catch-all only: internal panels first, then anything connected.
    fn default() -> Self {
        Self {
            names: Vec::new(),
            catch_all: true,
        }
    }
}

impl PrimaryDisplayOrder {
    /// Parses a comma-separated list such as `"HDMI-A-1, eDP-1, ..."`.
    ///
    /// An empty list is the default (catch-all only). The marker counts only
    /// as the final entry; elsewhere it is ignored.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        let entries: Vec<&str> = list
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .collect();
        if entries.is_empty() {
            return Self::default();
        }
        let catch_all = entries.last() == Some(&CATCH_ALL);
        let names = entries
            .into_iter()
            .filter(|e| *e != CATCH_ALL)
            .map(ToString::to_string)
            .collect();
        Self { names, catch_all }
    }

    /// Listed connector names, in preference order.
    #[inline]
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether unlisted connectors may become primary.
    #[inline]
    #[must_use]
    pub const fn catch_all(&self) -> bool {
        self.catch_all
    }
}

/// A logical display number bound to a connector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayAssignment {
    /// Consumer-visible display id.
    pub display: DisplayId,
    /// Connector serving it.
    pub connector: ConnectorRef,
}

/// Display ordering failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopologyError {
    /// No connector qualifies as primary.
    NoPrimaryCandidate,
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPrimaryCandidate => f.write_str("no connector qualifies as primary display"),
        }
    }
}

impl core::error::Error for TopologyError {}

struct Candidate {
    connector: ConnectorRef,
    name: String,
    internal: bool,
    connected: bool,
}

/// Assigns display numbers to the connectors of `devices`.
///
/// # Errors
///
/// Returns [`TopologyError::NoPrimaryCandidate`] if no connector can be
/// primary under `order`.
pub fn order_displays(
    devices: &[Device],
    order: &PrimaryDisplayOrder,
) -> Result<Vec<DisplayAssignment>, TopologyError> {
    let all: Vec<Candidate> = devices
        .iter()
        .flat_map(|device| {
            device
                .connectors()
                .iter()
                .filter(|c| c.is_display_capable())
                .map(|c| Candidate {
                    connector: ConnectorRef {
                        device: device.id(),
                        connector: c.id,
                    },
                    name: c.name(),
                    internal: c.class() == ConnectorClass::Internal,
                    connected: c.is_connected(),
                })
        })
        .collect();

    let connected: Vec<&Candidate> = all.iter().filter(|c| c.connected).collect();

    let mut ranked: Vec<&Candidate> = Vec::new();
    for name in order.names() {
        for c in connected.iter().filter(|c| c.name == *name) {
            if !ranked.iter().any(|r| r.connector == c.connector) {
                ranked.push(*c);
            }
        }
    }
    if order.catch_all() {
        let unlisted = connected
            .iter()
            .filter(|c| !ranked.iter().any(|r| r.connector == c.connector))
            .copied();
        let (internal, external): (Vec<&Candidate>, Vec<&Candidate>) =
            unlisted.partition(|c| c.internal);
        ranked.extend(internal);
        ranked.extend(external);
    }

    let primary = ranked
        .first()
        .map(|c| c.connector)
        .ok_or(TopologyError::NoPrimaryCandidate)?;

    let mut out = Vec::with_capacity(all.len());
    out.push(DisplayAssignment {
        display: DisplayId::PRIMARY,
        connector: primary,
    });
    let mut next = DisplayId::PRIMARY.next();
    let rest = all
        .iter()
        .filter(|c| c.connected)
        .chain(all.iter().filter(|c| !c.connected))
        .filter(|c| c.connector != primary);
    for c in rest {
        out.push(DisplayAssignment {
            display: next,
            connector: c.connector,
        });
        next = next.next();
    }
    Ok(out)
}
