// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use super::id::{ConnectorId, EncoderId, PropertyId};
use crate::mode::{Mode, dedup_modes};

/// Kernel connector interface type (`DRM_MODE_CONNECTOR_*`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectorType {
    /// Unknown interface.
    Unknown,
    /// VGA.
    Vga,
    /// DVI-I.
    DviI,
    /// DVI-D.
    DviD,
    /// DVI-A.
    DviA,
    /// Composite video.
    Composite,
    /// S-Video.
    SVideo,
    /// LVDS panel.
    Lvds,
    /// Component video.
    Component,
    /// 9-pin DIN.
    NinePinDin,
    /// DisplayPort.
    DisplayPort,
    /// HDMI type A.
    HdmiA,
    /// HDMI type B.
    HdmiB,
    /// TV out.
    Tv,
    /// Embedded DisplayPort.
    Edp,
    /// Virtual connector.
    Virtual,
    /// MIPI DSI.
    Dsi,
    /// Parallel display interface.
    Dpi,
    /// Writeback connector.
    Writeback,
    /// SPI panel.
    Spi,
    /// USB display.
    Usb,
}

impl ConnectorType {
    /// Maps the kernel's numeric interface type.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Vga,
            2 => Self::DviI,
            3 => Self::DviD,
            4 => Self::DviA,
            5 => Self::Composite,
            6 => Self::SVideo,
            7 => Self::Lvds,
            8 => Self::Component,
            9 => Self::NinePinDin,
            10 => Self::DisplayPort,
            11 => Self::HdmiA,
            12 => Self::HdmiB,
            13 => Self::Tv,
            14 => Self::Edp,
            15 => Self::Virtual,
            16 => Self::Dsi,
            17 => Self::Dpi,
            18 => Self::Writeback,
            19 => Self::Spi,
            20 => Self::Usb,
            _ => Self::Unknown,
        }
    }

    /// Name prefix used by the kernel, e.g. `HDMI-A`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "None",
            Self::Vga => "VGA",
            Self::DviI => "DVI-I",
            Self::DviD => "DVI-D",
            Self::DviA => "DVI-A",
            Self::Composite => "Composite",
            Self::SVideo => "SVIDEO",
            Self::Lvds => "LVDS",
            Self::Component => "Component",
            Self::NinePinDin => "DIN",
            Self::DisplayPort => "DP",
            Self::HdmiA => "HDMI-A",
            Self::HdmiB => "HDMI-B",
            Self::Tv => "TV",
            Self::Edp => "eDP",
            Self::Virtual => "Virtual",
            Self::Dsi => "DSI",
            Self::Dpi => "DPI",
            Self::Writeback => "Writeback",
            Self::Spi => "SPI",
            Self::Usb => "USB",
        }
    }

    /// Classification used by the primary-display policy.
    #[must_use]
    pub const fn class(self) -> ConnectorClass {
        match self {
            Self::Lvds | Self::Edp | Self::Dsi | Self::Virtual | Self::Dpi | Self::Spi => {
                ConnectorClass::Internal
            }
            Self::HdmiA | Self::DisplayPort | Self::DviD | Self::DviI | Self::Vga | Self::Usb => {
                ConnectorClass::External
            }
            Self::Writeback => ConnectorClass::Writeback,
            _ => ConnectorClass::Invalid,
        }
    }
}

/// How a connector participates in display enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectorClass {
    /// Built-in panel.
    Internal,
    /// User-pluggable port.
    External,
    /// Writeback; never becomes a display.
    Writeback,
    /// Anything else (TV out, composite, …).
    Invalid,
}

/// Whether a sink is attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// A sink is attached.
    Connected,
    /// Nothing attached.
    #[default]
    Disconnected,
    /// The kernel cannot tell.
    Unknown,
}

/// Property ids of a connector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ConnectorProps {
    /// `CRTC_ID`, routes the connector to a CRTC in an atomic commit.
    pub crtc_id: Option<PropertyId>,
    /// `DPMS`, legacy power state.
    pub dpms: Option<PropertyId>,
}

/// Fresh connector state read from the kernel.
#[derive(Clone, Debug, Default)]
pub struct ConnectorProbe {
    /// Connection state.
    pub state: ConnectionState,
    /// Modes as reported, possibly with duplicates.
    pub modes: Vec<Mode>,
    /// Encoder currently driving the connector.
    pub current_encoder: Option<EncoderId>,
    /// Physical width in millimetres (0 if unknown).
    pub mm_width: u32,
    /// Physical height in millimetres (0 if unknown).
    pub mm_height: u32,
    /// Extended display identification data.
    pub edid: Option<Vec<u8>>,
}

/// A physical output port.
#[derive(Clone, Debug)]
pub struct Connector {
    /// Kernel object id.
    pub id: ConnectorId,
    /// Interface type.
    pub kind: ConnectorType,
    /// Per-type instance number (the `1` in `HDMI-A-1`).
    pub kind_id: u32,
    /// Encoders able to drive this connector, in kernel order.
    pub encoders: Vec<EncoderId>,
    /// Property ids.
    pub props: ConnectorProps,
    state: ConnectionState,
    modes: Vec<Mode>,
    current_encoder: Option<EncoderId>,
    mm_width: u32,
    mm_height: u32,
    edid: Option<Vec<u8>>,
}

impl Connector {
    /// Creates a connector from its static description and an initial probe.
    #[must_use]
    pub fn new(
        id: ConnectorId,
        kind: ConnectorType,
        kind_id: u32,
        encoders: Vec<EncoderId>,
        props: ConnectorProps,
        probe: ConnectorProbe,
    ) -> Self {
        let mut connector = Self {
            id,
            kind,
            kind_id,
            encoders,
            props,
            state: ConnectionState::Disconnected,
            modes: Vec::new(),
            current_encoder: None,
            mm_width: 0,
            mm_height: 0,
            edid: None,
        };
        connector.refresh(probe);
        connector
    }

    /// Applies freshly probed state. Modes are de-duplicated.
    pub fn refresh(&mut self, probe: ConnectorProbe) {
        self.state = probe.state;
        self.modes = dedup_modes(probe.modes);
        self.current_encoder = probe.current_encoder;
        self.mm_width = probe.mm_width;
        self.mm_height = probe.mm_height;
        self.edid = probe.edid;
    }

    /// Kernel-style name such as `eDP-1`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}-{}", self.kind.name(), self.kind_id)
    }

    /// Classification of this connector.
    #[inline]
    #[must_use]
    pub const fn class(&self) -> ConnectorClass {
        self.kind.class()
    }

    /// Returns `true` for internal or external connectors.
    #[inline]
    #[must_use]
    pub const fn is_display_capable(&self) -> bool {
        matches!(
            self.class(),
            ConnectorClass::Internal | ConnectorClass::External
        )
    }

    /// Returns `true` if a sink is attached.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Connection state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// De-duplicated modes in kernel order.
    #[inline]
    #[must_use]
    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    /// Encoder the kernel currently routes this connector through.
    #[inline]
    #[must_use]
    pub const fn current_encoder(&self) -> Option<EncoderId> {
        self.current_encoder
    }

    /// Physical size in millimetres, `(0, 0)` if unknown.
    #[inline]
    #[must_use]
    pub const fn size_mm(&self) -> (u32, u32) {
        (self.mm_width, self.mm_height)
    }

    /// Raw EDID blob.
    #[inline]
    #[must_use]
    pub fn edid(&self) -> Option<&[u8]> {
        self.edid.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::mode::tests::mode;

    #[test]
    fn names_follow_kernel_convention() {
        let c = Connector::new(
            ConnectorId(40),
            ConnectorType::from_raw(11),
            2,
            Vec::new(),
            ConnectorProps::default(),
            ConnectorProbe::default(),
        );
        assert_eq!(c.name(), "HDMI-A-2", "type prefix plus instance");
        assert_eq!(c.class(), ConnectorClass::External, "HDMI is external");
    }

    #[test]
    fn classification() {
        assert_eq!(
            ConnectorType::Edp.class(),
            ConnectorClass::Internal,
            "eDP panel is internal"
        );
        assert_eq!(
            ConnectorType::Writeback.class(),
            ConnectorClass::Writeback,
            "writeback stays separate"
        );
        assert_eq!(
            ConnectorType::Tv.class(),
            ConnectorClass::Invalid,
            "TV out is not a display"
        );
        assert_eq!(
            ConnectorType::from_raw(99),
            ConnectorType::Unknown,
            "unknown raw types map to Unknown"
        );
    }

    #[test]
    fn refresh_dedups_modes() {
        let m = mode(1920, 1080, 60);
        let mut c = Connector::new(
            ConnectorId(1),
            ConnectorType::Edp,
            1,
            Vec::new(),
            ConnectorProps::default(),
            ConnectorProbe::default(),
        );
        assert!(!c.is_connected(), "starts disconnected");
        c.refresh(ConnectorProbe {
            state: ConnectionState::Connected,
            modes: vec![m.clone(), m.clone()],
            ..ConnectorProbe::default()
        });
        assert!(c.is_connected(), "probe applied");
        assert_eq!(c.modes().len(), 1, "duplicate mode removed");
    }
}
