// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory transport for unit tests.
//!
//! Every [`Output`] becomes a connector with its own encoder, CRTC, primary
//! plane and one overlay plane, so displays never compete for hardware.
//! Property ids follow `object id * 100 + n`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use parking_lot::Mutex;
use scanout_core::backend::GenericAssigner;
use scanout_core::buffer::{BufferHandle, BufferInfo, FORMAT_XRGB8888, PlaneLayout};
use scanout_core::commit::{AtomicRequest, CommitFlags, PropertyTarget};
use scanout_core::hw::{
    BlobId, ConnectionState, Connector, ConnectorId, ConnectorProbe, ConnectorProps,
    ConnectorType, Crtc, CrtcId, CrtcProps, DeviceResources, Encoder, EncoderId, FramebufferId,
    Plane, PlaneId, PlaneKind, PlaneProps, PropertyId,
};
use scanout_core::layer::{CompositionType, LayerId};
use scanout_core::mode::{MODE_TYPE_PREFERRED, Mode};
use scanout_core::output::DisplayId;
use scanout_core::trace::Tracer;

use crate::callbacks::Callbacks;
use crate::config::HwcConfig;
use crate::display::{DisplayCtx, DisplayOptions, HwcDisplay};
use crate::error::TransportError;
use crate::resources::ResourceManager;
use crate::transport::{BufferDescriber, DeviceOpener, KmsDevice};

pub(crate) fn mode(w: u16, h: u16, hz: u32) -> Mode {
    let htotal = w + 160;
    let vtotal = h + 45;
    Mode {
        clock: u32::from(htotal) * u32::from(vtotal) * hz / 1000,
        hdisplay: w,
        hsync_start: w + 48,
        hsync_end: w + 80,
        htotal,
        vdisplay: h,
        vsync_start: h + 3,
        vsync_end: h + 8,
        vtotal,
        vrefresh: hz,
        name: format!("{w}x{h}"),
        ..Mode::default()
    }
}

/// One connector of a fake device.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Output {
    pub(crate) connector: u32,
    pub(crate) kind: ConnectorType,
    pub(crate) connected: bool,
}

impl Output {
    pub(crate) fn edp(connector: u32, connected: bool) -> Self {
        Self {
            connector,
            kind: ConnectorType::Edp,
            connected,
        }
    }

    pub(crate) fn hdmi(connector: u32, connected: bool) -> Self {
        Self {
            connector,
            kind: ConnectorType::HdmiA,
            connected,
        }
    }
}

fn probe(connected: bool) -> ConnectorProbe {
    let mut preferred = mode(1920, 1080, 60);
    preferred.kind |= MODE_TYPE_PREFERRED;
    ConnectorProbe {
        state: if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        },
        modes: if connected {
            vec![preferred, mode(1280, 720, 60)]
        } else {
            Vec::new()
        },
        current_encoder: None,
        mm_width: 340,
        mm_height: 190,
        edid: None,
    }
}

fn plane(id: u32, kind: PlaneKind, possible_crtcs: u32) -> Plane {
    let p = |n| Some(PropertyId(id * 100 + n));
    Plane {
        id: PlaneId(id),
        kind,
        possible_crtcs,
        formats: vec![FORMAT_XRGB8888],
        props: PlaneProps {
            fb_id: p(1),
            crtc_id: p(2),
            crtc_x: p(3),
            crtc_y: p(4),
            crtc_w: p(5),
            crtc_h: p(6),
            src_x: p(7),
            src_y: p(8),
            src_w: p(9),
            src_h: p(10),
            zpos: p(11),
            alpha: None,
            in_fence_fd: None,
        },
    }
}

#[derive(Debug, Default)]
struct FakeState {
    probes: BTreeMap<ConnectorId, ConnectorProbe>,
    commits: Vec<(AtomicRequest, CommitFlags)>,
    property_writes: Vec<(PropertyTarget, PropertyId, u64)>,
    fail_test: bool,
    fail_commit: bool,
    next_object: u32,
    framebuffers: BTreeSet<FramebufferId>,
    blobs: BTreeSet<BlobId>,
    uploaded_modes: Vec<Mode>,
}

impl FakeState {
    fn next_id(&mut self) -> u32 {
        self.next_object += 1;
        self.next_object
    }
}

/// A scripted [`KmsDevice`].
#[derive(Debug)]
pub(crate) struct FakeKms {
    outputs: Vec<Output>,
    state: Mutex<FakeState>,
}

impl FakeKms {
    pub(crate) fn new(outputs: &[Output]) -> Arc<Self> {
        let probes = outputs
            .iter()
            .map(|o| (ConnectorId(o.connector), probe(o.connected)))
            .collect();
        Arc::new(Self {
            outputs: outputs.to_vec(),
            state: Mutex::new(FakeState {
                probes,
                next_object: 1000,
                ..FakeState::default()
            }),
        })
    }

    /// A node without modesetting resources.
    pub(crate) fn render_only() -> Arc<Self> {
        Self::new(&[])
    }

    pub(crate) fn set_connection(&self, connector: ConnectorId, state: ConnectionState) {
        let connected = state == ConnectionState::Connected;
        self.state.lock().probes.insert(connector, probe(connected));
    }

    pub(crate) fn fail_test_commits(&self, fail: bool) {
        self.state.lock().fail_test = fail;
    }

    pub(crate) fn fail_commits(&self, fail: bool) {
        self.state.lock().fail_commit = fail;
    }

    pub(crate) fn commit_count(&self) -> usize {
        self.state.lock().commits.len()
    }

    pub(crate) fn last_commit(&self) -> Option<(AtomicRequest, CommitFlags)> {
        self.state.lock().commits.last().cloned()
    }

    pub(crate) fn property_writes(&self) -> Vec<(PropertyTarget, PropertyId, u64)> {
        self.state.lock().property_writes.clone()
    }

    pub(crate) fn live_framebuffers(&self) -> usize {
        self.state.lock().framebuffers.len()
    }

    pub(crate) fn live_framebuffer_ids(&self) -> Vec<FramebufferId> {
        self.state.lock().framebuffers.iter().copied().collect()
    }

    pub(crate) fn live_blobs(&self) -> usize {
        self.state.lock().blobs.len()
    }

    /// The mode of the most recently created blob.
    pub(crate) fn last_uploaded_mode(&self) -> Option<Mode> {
        self.state.lock().uploaded_modes.last().cloned()
    }

    /// Real (not test-only) commits that were allowed to modeset.
    pub(crate) fn modeset_commits(&self) -> usize {
        self.state
            .lock()
            .commits
            .iter()
            .filter(|(_, flags)| !flags.test_only && flags.allow_modeset)
            .count()
    }
}

impl KmsDevice for FakeKms {
    fn resources(&self) -> Result<DeviceResources, TransportError> {
        let state = self.state.lock();
        let mut res = DeviceResources {
            min_size: (1, 1),
            max_size: (8192, 8192),
            ..DeviceResources::default()
        };
        for (index, output) in (0_u32..).zip(&self.outputs) {
            let bit = 1 << index;
            let crtc = 100 + index;
            let encoder = 50 + index;
            res.crtcs.push(Crtc {
                id: CrtcId(crtc),
                index,
                props: CrtcProps {
                    active: Some(PropertyId(crtc * 100 + 1)),
                    mode_id: Some(PropertyId(crtc * 100 + 2)),
                    out_fence_ptr: Some(PropertyId(crtc * 100 + 3)),
                },
            });
            res.encoders.push(Encoder {
                id: EncoderId(encoder),
                possible_crtcs: bit,
                current_crtc: None,
            });
            res.planes
                .push(plane(200 + 2 * index, PlaneKind::Primary, bit));
            res.planes
                .push(plane(201 + 2 * index, PlaneKind::Overlay, bit));

            let same_kind = self.outputs[..res.connectors.len()]
                .iter()
                .filter(|o| o.kind == output.kind)
                .count();
            let kind_id = u32::try_from(same_kind).unwrap() + 1;
            let id = ConnectorId(output.connector);
            res.connectors.push(Connector::new(
                id,
                output.kind,
                kind_id,
                vec![EncoderId(encoder)],
                ConnectorProps {
                    crtc_id: Some(PropertyId(output.connector * 100 + 1)),
                    dpms: Some(PropertyId(output.connector * 100 + 2)),
                },
                state.probes.get(&id).cloned().unwrap_or_default(),
            ));
        }
        Ok(res)
    }

    fn probe_connector(&self, connector: ConnectorId) -> Result<ConnectorProbe, TransportError> {
        self.state
            .lock()
            .probes
            .get(&connector)
            .cloned()
            .ok_or(TransportError::MissingProperty {
                object: connector.0,
                name: "connector",
            })
    }

    fn create_mode_blob(&self, mode: &Mode) -> Result<BlobId, TransportError> {
        let mut state = self.state.lock();
        let blob = BlobId(state.next_id());
        state.blobs.insert(blob);
        state.uploaded_modes.push(mode.clone());
        Ok(blob)
    }

    fn destroy_blob(&self, blob: BlobId) -> Result<(), TransportError> {
        assert!(self.state.lock().blobs.remove(&blob), "{blob:?} destroyed twice");
        Ok(())
    }

    fn add_framebuffer(&self, _info: &BufferInfo) -> Result<FramebufferId, TransportError> {
        let mut state = self.state.lock();
        let fb = FramebufferId(state.next_id());
        state.framebuffers.insert(fb);
        Ok(fb)
    }

    fn remove_framebuffer(&self, framebuffer: FramebufferId) -> Result<(), TransportError> {
        assert!(
            self.state.lock().framebuffers.remove(&framebuffer),
            "{framebuffer:?} removed twice"
        );
        Ok(())
    }

    fn set_property(
        &self,
        target: PropertyTarget,
        property: PropertyId,
        value: u64,
    ) -> Result<(), TransportError> {
        self.state
            .lock()
            .property_writes
            .push((target, property, value));
        Ok(())
    }

    fn atomic_commit(
        &self,
        request: &AtomicRequest,
        flags: CommitFlags,
    ) -> Result<Option<OwnedFd>, TransportError> {
        let mut state = self.state.lock();
        state.commits.push((request.clone(), flags));
        let rejected = if flags.test_only {
            state.fail_test
        } else {
            state.fail_commit
        };
        if rejected {
            return Err(TransportError::Io(std::io::Error::from_raw_os_error(22)));
        }
        if flags.test_only {
            return Ok(None);
        }
        Ok(File::open("/dev/null").ok().map(OwnedFd::from))
    }
}

/// Maps paths to fake devices.
#[derive(Debug, Default)]
pub(crate) struct FakeOpener {
    nodes: BTreeMap<String, Arc<FakeKms>>,
}

impl FakeOpener {
    pub(crate) fn add(&mut self, path: &str, kms: Arc<FakeKms>) {
        self.nodes.insert(path.to_owned(), kms);
    }
}

impl DeviceOpener for FakeOpener {
    fn node_exists(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    fn open(&self, path: &str) -> Result<Arc<dyn KmsDevice>, TransportError> {
        self.nodes
            .get(path)
            .map(|kms| kms.clone() as Arc<dyn KmsDevice>)
            .ok_or_else(|| TransportError::Io(std::io::ErrorKind::NotFound.into()))
    }
}

/// Describes every handle except 0 as a 1920x1080 XRGB buffer.
#[derive(Debug, Default)]
pub(crate) struct FakeDescriber;

impl BufferDescriber for FakeDescriber {
    fn describe(&self, buffer: BufferHandle) -> Result<BufferInfo, TransportError> {
        if buffer.0 == 0 {
            return Err(TransportError::Io(std::io::ErrorKind::InvalidInput.into()));
        }
        Ok(BufferInfo::single_plane(
            1920,
            1080,
            FORMAT_XRGB8888,
            PlaneLayout {
                handle: u32::try_from(buffer.0).unwrap_or(u32::MAX),
                pitch: 1920 * 4,
                offset: 0,
            },
        ))
    }
}

/// A resource manager plus displays, driven without the master lock.
pub(crate) struct Fixture {
    pub(crate) kms: Arc<FakeKms>,
    resources: ResourceManager,
    displays: BTreeMap<DisplayId, HwcDisplay>,
    describer: FakeDescriber,
}

impl Fixture {
    pub(crate) fn new(outputs: &[Output]) -> Self {
        let kms = FakeKms::new(outputs);
        let mut opener = FakeOpener::default();
        opener.add("/dev/dri/card0", kms.clone());
        let mut resources = ResourceManager::init(&HwcConfig::default(), &opener).unwrap();
        let callbacks = Arc::new(Callbacks::default());
        let describer = FakeDescriber;
        let mut displays = BTreeMap::new();
        for assignment in resources.assignments().to_vec() {
            let mut display = HwcDisplay::new(
                assignment.display,
                assignment.connector,
                DisplayOptions {
                    flattening_countdown: 60,
                },
                Box::new(GenericAssigner::default()),
                &callbacks,
            )
            .unwrap();
            let connected = resources
                .connector(assignment.connector)
                .is_some_and(Connector::is_connected);
            if connected {
                let mut ctx = DisplayCtx {
                    resources: &mut resources,
                    describer: &describer,
                    tracer: Tracer::none(),
                };
                assert!(display.bind(&mut ctx), "fixture outputs never conflict");
            }
            displays.insert(assignment.display, display);
        }
        Self {
            kms,
            resources,
            displays,
            describer,
        }
    }

    pub(crate) fn display(&self, id: DisplayId) -> DisplayId {
        assert!(self.displays.contains_key(&id), "no display {id}");
        id
    }

    pub(crate) fn with<R>(
        &mut self,
        id: DisplayId,
        f: impl FnOnce(&mut HwcDisplay, &mut DisplayCtx<'_>) -> R,
    ) -> R {
        let display = self.displays.get_mut(&id).unwrap();
        let mut ctx = DisplayCtx {
            resources: &mut self.resources,
            describer: &self.describer,
            tracer: Tracer::none(),
        };
        f(display, &mut ctx)
    }

    /// Adds a full-screen layer requesting device composition.
    pub(crate) fn add_device_layer(&mut self, id: DisplayId, z: u32, handle: u64) -> LayerId {
        self.with(id, |display, _| {
            let layer = display.create_layer();
            let layers = display.layers_mut();
            let full = kurbo::Rect::new(0.0, 0.0, 1920.0, 1080.0);
            layers.set_buffer(layer, Some(BufferHandle(handle))).unwrap();
            layers.set_source_crop(layer, full).unwrap();
            layers.set_display_frame(layer, full).unwrap();
            layers.set_z_order(layer, z).unwrap();
            layers
                .set_requested_type(layer, CompositionType::Device)
                .unwrap();
            layer
        })
    }
}
