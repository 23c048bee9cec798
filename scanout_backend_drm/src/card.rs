// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Kernel transport on top of the `drm` crate.
//!
//! [`DrmDevice`] opens a card node, enables universal planes and atomic
//! modesetting, and translates between the kernel's handle types and the
//! plain integer ids of `scanout_core`. Property ids are looked up by name
//! at enumeration time; a missing optional property is recorded as `None`.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::ops::{Bound, RangeBounds};
use std::os::fd::{AsFd, BorrowedFd, FromRawFd, OwnedFd};
use std::path::Path;
use std::sync::Arc;

use drm::{ClientCapability, Device as _};
use drm::buffer::{DrmFourcc, DrmModifier, PlanarBuffer};
use drm::control::{
    self, AtomicCommitFlags, Device as ControlDevice, FbCmd2Flags, ResourceHandle, atomic,
    connector, crtc, plane, property,
};
use parking_lot::Mutex;
use scanout_core::buffer::BufferInfo;
use scanout_core::commit::{AtomicRequest, CommitFlags, PropertyTarget};
use scanout_core::hw::{
    BlobId, ConnectionState, Connector, ConnectorId, ConnectorProbe, ConnectorProps,
    ConnectorType, Crtc, CrtcId, CrtcProps, DeviceResources, Encoder, EncoderId, FramebufferId,
    Plane, PlaneId, PlaneKind, PlaneProps, PropertyId,
};
use scanout_core::mode::Mode;
use scanout_hwc::{DeviceOpener, KmsDevice, TransportError};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct Card(File);

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl drm::Device for Card {}
impl ControlDevice for Card {}

/// Name-indexed properties of one kernel object with their current values.
struct Properties {
    entries: HashMap<String, (property::Handle, u64)>,
}

impl Properties {
    fn id(&self, name: &str) -> Option<PropertyId> {
        self.entries
            .get(name)
            .map(|(handle, _)| PropertyId(u32::from(*handle)))
    }

    fn value(&self, name: &str) -> Option<u64> {
        self.entries.get(name).map(|(_, value)| *value)
    }
}

/// An opened DRM card node.
pub struct DrmDevice {
    card: Card,
    path: String,
    /// Every mode the kernel reported, paired with its kernel form, so a
    /// mode can be uploaded as a blob byte-for-byte.
    modes: Mutex<Vec<(Mode, control::Mode)>>,
    out_fence_props: Mutex<HashMap<CrtcId, PropertyId>>,
}

impl std::fmt::Debug for DrmDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrmDevice")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DrmDevice {
    /// Opens `path` read-write and enables the client capabilities the
    /// composer relies on.
    ///
    /// # Errors
    ///
    /// [`TransportError::Io`] if the node cannot be opened and
    /// [`TransportError::MissingCapability`] if the driver lacks universal
    /// planes or atomic modesetting.
    pub fn open(path: &str) -> Result<Self, TransportError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let card = Card(file);
        card.set_client_capability(ClientCapability::UniversalPlanes, true)
            .map_err(|_| TransportError::MissingCapability("universal planes"))?;
        card.set_client_capability(ClientCapability::Atomic, true)
            .map_err(|_| TransportError::MissingCapability("atomic modesetting"))?;
        info!("opened {path}");
        Ok(Self {
            card,
            path: path.to_owned(),
            modes: Mutex::new(Vec::new()),
            out_fence_props: Mutex::new(HashMap::new()),
        })
    }

    /// The node this device was opened from.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    fn properties<H: ResourceHandle>(&self, handle: H) -> Result<Properties, TransportError> {
        let set = self.card.get_properties(handle)?;
        let mut entries = HashMap::new();
        let (ids, values) = set.as_props_and_values();
        for (&id, &value) in ids.iter().zip(values) {
            let info = self.card.get_property(id)?;
            if let Ok(name) = info.name().to_str() {
                entries.insert(name.to_owned(), (id, value));
            }
        }
        Ok(Properties { entries })
    }

    fn probe(&self, info: &connector::Info, props: &Properties) -> ConnectorProbe {
        let modes: Vec<Mode> = info.modes().iter().map(convert_mode).collect();
        {
            let mut cache = self.modes.lock();
            for (mode, raw) in modes.iter().zip(info.modes()) {
                if !cache.iter().any(|(known, _)| known == mode) {
                    cache.push((mode.clone(), *raw));
                }
            }
        }
        let (mm_width, mm_height) = info.size().unwrap_or((0, 0));
        ConnectorProbe {
            state: match info.state() {
                connector::State::Connected => ConnectionState::Connected,
                connector::State::Disconnected => ConnectionState::Disconnected,
                connector::State::Unknown => ConnectionState::Unknown,
            },
            modes,
            current_encoder: info.current_encoder().map(|e| EncoderId(u32::from(e))),
            mm_width,
            mm_height,
            edid: self.edid(info.handle(), props),
        }
    }

    fn edid(&self, connector: connector::Handle, props: &Properties) -> Option<Vec<u8>> {
        let blob = props.value("EDID").filter(|&blob| blob != 0)?;
        match self.card.get_property_blob(blob) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(
                    "{}: connector {}: EDID unreadable: {err}",
                    self.path,
                    u32::from(connector)
                );
                None
            }
        }
    }
}

impl KmsDevice for DrmDevice {
    fn resources(&self) -> Result<DeviceResources, TransportError> {
        let res = self.card.resource_handles()?;
        let crtc_handles = res.crtcs();

        let mut crtcs = Vec::with_capacity(crtc_handles.len());
        let mut fences = HashMap::new();
        for (index, &handle) in crtc_handles.iter().enumerate() {
            let props = self.properties(handle)?;
            let id = CrtcId(u32::from(handle));
            let crtc = Crtc {
                id,
                index: u32::try_from(index).unwrap_or(u32::MAX),
                props: CrtcProps {
                    active: props.id("ACTIVE"),
                    mode_id: props.id("MODE_ID"),
                    out_fence_ptr: props.id("OUT_FENCE_PTR"),
                },
            };
            if let Some(prop) = crtc.props.out_fence_ptr {
                fences.insert(id, prop);
            }
            crtcs.push(crtc);
        }
        *self.out_fence_props.lock() = fences;

        let mut encoders = Vec::with_capacity(res.encoders().len());
        for &handle in res.encoders() {
            let info = self.card.get_encoder(handle)?;
            encoders.push(Encoder {
                id: EncoderId(u32::from(handle)),
                possible_crtcs: crtc_mask(crtc_handles, &res.filter_crtcs(info.possible_crtcs())),
                current_crtc: info.crtc().map(|c| CrtcId(u32::from(c))),
            });
        }

        let mut connectors = Vec::with_capacity(res.connectors().len());
        for &handle in res.connectors() {
            let info = self.card.get_connector(handle, true)?;
            let props = self.properties(handle)?;
            connectors.push(Connector::new(
                ConnectorId(u32::from(handle)),
                ConnectorType::from_raw(u32::from(info.interface())),
                info.interface_id(),
                info.encoders().iter().map(|&e| EncoderId(u32::from(e))).collect(),
                ConnectorProps {
                    crtc_id: props.id("CRTC_ID"),
                    dpms: props.id("DPMS"),
                },
                self.probe(&info, &props),
            ));
        }

        let mut planes = Vec::new();
        for handle in self.card.plane_handles()? {
            let info = self.card.get_plane(handle)?;
            let props = self.properties(handle)?;
            let Some(kind) = props.value("type").and_then(plane_kind) else {
                warn!(
                    "{}: plane {} has no usable type, skipped",
                    self.path,
                    u32::from(handle)
                );
                continue;
            };
            planes.push(Plane {
                id: PlaneId(u32::from(handle)),
                kind,
                possible_crtcs: crtc_mask(crtc_handles, &res.filter_crtcs(info.possible_crtcs())),
                formats: info.formats().to_vec(),
                props: PlaneProps {
                    fb_id: props.id("FB_ID"),
                    crtc_id: props.id("CRTC_ID"),
                    crtc_x: props.id("CRTC_X"),
                    crtc_y: props.id("CRTC_Y"),
                    crtc_w: props.id("CRTC_W"),
                    crtc_h: props.id("CRTC_H"),
                    src_x: props.id("SRC_X"),
                    src_y: props.id("SRC_Y"),
                    src_w: props.id("SRC_W"),
                    src_h: props.id("SRC_H"),
                    zpos: props.id("zpos"),
                    alpha: props.id("alpha"),
                    in_fence_fd: props.id("IN_FENCE_FD"),
                },
            });
        }

        debug!(
            "{}: {} crtcs, {} encoders, {} connectors, {} planes",
            self.path,
            crtcs.len(),
            encoders.len(),
            connectors.len(),
            planes.len()
        );
        let width = res.supported_fb_width();
        let height = res.supported_fb_height();
        Ok(DeviceResources {
            min_size: (lower(&width), lower(&height)),
            max_size: (upper(&width), upper(&height)),
            crtcs,
            encoders,
            connectors,
            planes,
        })
    }

    fn probe_connector(&self, connector: ConnectorId) -> Result<ConnectorProbe, TransportError> {
        let handle: connector::Handle = handle(connector.0)?;
        let info = self.card.get_connector(handle, true)?;
        let props = self.properties(handle)?;
        Ok(self.probe(&info, &props))
    }

    fn create_mode_blob(&self, mode: &Mode) -> Result<BlobId, TransportError> {
        let raw = self
            .modes
            .lock()
            .iter()
            .find(|(known, _)| known == mode)
            .map(|(_, raw)| *raw)
            .ok_or_else(|| invalid(format!("mode {} was never reported", mode.name)))?;
        match self.card.create_property_blob(&raw)? {
            property::Value::Blob(id) => u32::try_from(id)
                .map(BlobId)
                .map_err(|_| invalid(format!("blob id {id} out of range"))),
            other => Err(invalid(format!("kernel returned {other:?} for a blob"))),
        }
    }

    fn destroy_blob(&self, blob: BlobId) -> Result<(), TransportError> {
        self.card.destroy_property_blob(u64::from(blob.0))?;
        Ok(())
    }

    fn add_framebuffer(&self, info: &BufferInfo) -> Result<FramebufferId, TransportError> {
        let planar = Planar::new(info)?;
        let flags = if info.modifier.is_some() {
            FbCmd2Flags::MODIFIERS
        } else {
            FbCmd2Flags::empty()
        };
        let fb = self.card.add_planar_framebuffer(&planar, flags)?;
        Ok(FramebufferId(u32::from(fb)))
    }

    fn remove_framebuffer(&self, framebuffer: FramebufferId) -> Result<(), TransportError> {
        self.card.destroy_framebuffer(handle(framebuffer.0)?)?;
        Ok(())
    }

    fn set_property(
        &self,
        target: PropertyTarget,
        property: PropertyId,
        value: u64,
    ) -> Result<(), TransportError> {
        let property: property::Handle = handle(property.0)?;
        match target {
            PropertyTarget::Connector(id) => {
                self.card
                    .set_property(handle::<connector::Handle>(id.0)?, property, value)?;
            }
            PropertyTarget::Crtc(id) => {
                self.card
                    .set_property(handle::<crtc::Handle>(id.0)?, property, value)?;
            }
            PropertyTarget::Plane(id) => {
                self.card
                    .set_property(handle::<plane::Handle>(id.0)?, property, value)?;
            }
        }
        Ok(())
    }

    #[expect(
        unsafe_code,
        reason = "the out-fence arrives as a raw descriptor written by the kernel"
    )]
    fn atomic_commit(
        &self,
        request: &AtomicRequest,
        flags: CommitFlags,
    ) -> Result<Option<OwnedFd>, TransportError> {
        let mut req = atomic::AtomicModeReq::new();
        let mut first_crtc = None;
        for write in request.writes() {
            let property: property::Handle = handle(write.property.0)?;
            let value = property::Value::Unknown(write.value);
            match write.target {
                PropertyTarget::Connector(id) => {
                    req.add_property(handle::<connector::Handle>(id.0)?, property, value);
                }
                PropertyTarget::Crtc(id) => {
                    first_crtc.get_or_insert(id);
                    req.add_property(handle::<crtc::Handle>(id.0)?, property, value);
                }
                PropertyTarget::Plane(id) => {
                    req.add_property(handle::<plane::Handle>(id.0)?, property, value);
                }
            }
        }

        let mut commit_flags = AtomicCommitFlags::empty();
        if flags.test_only {
            commit_flags |= AtomicCommitFlags::TEST_ONLY;
        }
        if flags.allow_modeset {
            commit_flags |= AtomicCommitFlags::ALLOW_MODESET;
        }

        let fence_prop = match first_crtc {
            Some(crtc) if !flags.test_only => self
                .out_fence_props
                .lock()
                .get(&crtc)
                .map(|prop| (crtc, *prop)),
            _ => None,
        };
        let mut fence: i32 = -1;
        if let Some((crtc, prop)) = fence_prop {
            let ptr = std::ptr::from_mut(&mut fence).expose_provenance() as u64;
            req.add_property(
                handle::<crtc::Handle>(crtc.0)?,
                handle(prop.0)?,
                property::Value::Unknown(ptr),
            );
        }

        self.card.atomic_commit(commit_flags, req)?;

        if fence < 0 {
            return Ok(None);
        }
        // SAFETY: the kernel stored a freshly created sync file descriptor in
        // `fence` during the commit; nothing else owns it.
        Ok(Some(unsafe { OwnedFd::from_raw_fd(fence) }))
    }
}

/// Opens `/dev/dri` nodes as [`DrmDevice`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct DrmOpener;

impl DeviceOpener for DrmOpener {
    fn node_exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn open(&self, path: &str) -> Result<Arc<dyn KmsDevice>, TransportError> {
        Ok(Arc::new(DrmDevice::open(path)?))
    }
}

/// Adapts a [`BufferInfo`] to the `drm` crate's framebuffer description.
#[derive(Debug)]
struct Planar<'a> {
    info: &'a BufferInfo,
    format: DrmFourcc,
}

impl<'a> Planar<'a> {
    fn new(info: &'a BufferInfo) -> Result<Self, TransportError> {
        let format = DrmFourcc::try_from(info.format)
            .map_err(|_| invalid(format!("unknown fourcc {:#010x}", info.format)))?;
        Ok(Self { info, format })
    }
}

impl PlanarBuffer for Planar<'_> {
    fn size(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn format(&self) -> DrmFourcc {
        self.format
    }

    fn modifier(&self) -> Option<DrmModifier> {
        self.info.modifier.map(DrmModifier::from)
    }

    fn pitches(&self) -> [u32; 4] {
        self.info.planes.map(|p| p.map_or(0, |p| p.pitch))
    }

    fn handles(&self) -> [Option<drm::buffer::Handle>; 4] {
        self.info
            .planes
            .map(|p| p.and_then(|p| control::from_u32(p.handle)))
    }

    fn offsets(&self) -> [u32; 4] {
        self.info.planes.map(|p| p.map_or(0, |p| p.offset))
    }
}

fn handle<H: From<control::RawResourceHandle>>(raw: u32) -> Result<H, TransportError> {
    control::from_u32(raw).ok_or_else(|| invalid(format!("object id {raw} is not a handle")))
}

fn invalid(message: String) -> TransportError {
    TransportError::Io(io::Error::new(io::ErrorKind::InvalidInput, message))
}

/// Bitmask over positions in `all` of the entries contained in `allowed`.
fn crtc_mask<T: PartialEq>(all: &[T], allowed: &[T]) -> u32 {
    all.iter()
        .take(32)
        .enumerate()
        .filter(|(_, c)| allowed.contains(c))
        .fold(0, |mask, (i, _)| mask | (1 << i))
}

/// Maps the plane `type` property.
fn plane_kind(raw: u64) -> Option<PlaneKind> {
    match raw {
        0 => Some(PlaneKind::Overlay),
        1 => Some(PlaneKind::Primary),
        2 => Some(PlaneKind::Cursor),
        _ => None,
    }
}

fn convert_mode(mode: &control::Mode) -> Mode {
    let (hdisplay, vdisplay) = mode.size();
    let (hsync_start, hsync_end, htotal) = mode.hsync();
    let (vsync_start, vsync_end, vtotal) = mode.vsync();
    Mode {
        clock: mode.clock(),
        hdisplay,
        hsync_start,
        hsync_end,
        htotal,
        hskew: mode.hskew(),
        vdisplay,
        vsync_start,
        vsync_end,
        vtotal,
        vscan: mode.vscan(),
        vrefresh: mode.vrefresh(),
        flags: mode.flags().bits(),
        kind: mode.mode_type().bits(),
        name: mode.name().to_string_lossy().into_owned(),
    }
}

fn lower(range: &impl RangeBounds<u32>) -> u32 {
    match range.start_bound() {
        Bound::Included(&v) => v,
        Bound::Excluded(&v) => v.saturating_add(1),
        Bound::Unbounded => 0,
    }
}

fn upper(range: &impl RangeBounds<u32>) -> u32 {
    match range.end_bound() {
        Bound::Included(&v) => v,
        Bound::Excluded(&v) => v.saturating_sub(1),
        Bound::Unbounded => u32::MAX,
    }
}
