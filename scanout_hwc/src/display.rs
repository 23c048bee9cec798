// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-display controller.
//!
//! An [`HwcDisplay`] is created for every display number at startup and lives
//! as long as the composer. Its pipeline comes and goes with hotplug; its id,
//! layers and statistics do not.
//!
//! Every method runs under the composer's master lock. Methods that touch
//! hardware take a [`DisplayCtx`] with the resource manager, the buffer
//! describer and the tracer.
//!
//! A frame goes through three steps:
//!
//! 1. `validate`: the [`LayerAssigner`] picks device or client composition
//!    for every layer, then a test-only commit checks that the kernel accepts
//!    the result. If it does not, everything falls back to client.
//! 2. The consumer renders client layers into the client target.
//! 3. `present`: the composition is rebuilt, imported and committed for real.
//!
//! Framebuffers of a frame stay alive until the next frame has been
//! committed, since the hardware scans them out until then.

use std::fmt::Write as _;
use std::io;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use kurbo::Rect;
use parking_lot::Mutex;
use scanout_core::backend::{LayerAssigner, ValidateOutcome, assign_all_client};
use scanout_core::buffer::BufferHandle;
use scanout_core::commit::{CommitArgs, PropertyTarget, build_request};
use scanout_core::composition::{LayerSource, build_composition};
use scanout_core::error::{Feature, HandleKind, Resource, ScanoutError};
use scanout_core::flatten::{FlatteningRequest, FlatteningState, TickOutcome};
use scanout_core::hw::{BlobId, Connector, ConnectorClass, ConnectorRef, FramebufferId};
use scanout_core::layer::{
    BlendMode, CompositionType, Dataspace, Layer, LayerId, LayerStore,
};
use scanout_core::mode::{DisplayConfigs, Mode};
use scanout_core::output::DisplayId;
use scanout_core::pipeline::DisplayPipeline;
use scanout_core::stats::Stats;
use scanout_core::time::Duration;
use scanout_core::trace::{BindEvent, CommitEvent, CompositionEvent, FlatteningEvent, Tracer};
use tracing::{debug, info, warn};

use crate::callbacks::Callbacks;
use crate::resources::ResourceManager;
use crate::time::now;
use crate::transport::{BufferDescriber, KmsDevice};
use crate::vsync::{FALLBACK_PERIOD, VsyncAction, VsyncWorker};

/// `DPMS` property value for "on".
const DPMS_ON: u64 = 0;

// ---------------------------------------------------------------------------
// Public value types
// ---------------------------------------------------------------------------

/// Display power state requested by the consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PowerMode {
    /// Pipeline deactivated, planes cleared.
    Off,
    /// Normal operation.
    On,
    /// Low-power mode. Not supported.
    Doze,
    /// Low-power mode without updates. Not supported.
    DozeSuspend,
}

/// A per-config attribute queried with
/// [`Hwc::get_display_attribute`](crate::Hwc::get_display_attribute).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisplayAttribute {
    /// Horizontal resolution in pixels.
    Width,
    /// Vertical resolution in pixels.
    Height,
    /// Vsync period in nanoseconds.
    VsyncPeriod,
    /// Horizontal dots per thousand inches, or -1 if the size is unknown.
    DpiX,
    /// Vertical dots per thousand inches, or -1 if the size is unknown.
    DpiY,
    /// Group of configs sharing a resolution.
    ConfigGroup,
}

/// How a display is attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    /// Built-in panel.
    Internal,
    /// User-pluggable port.
    External,
}

/// A color mode number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColorMode(pub i32);

impl ColorMode {
    /// The panel's native gamut. The only supported mode.
    pub const NATIVE: Self = Self(0);
    /// Highest defined mode number.
    pub const BT2100_HLG: Self = Self(11);

    const fn is_known(self) -> bool {
        self.0 >= Self::NATIVE.0 && self.0 <= Self::BT2100_HLG.0
    }
}

/// Tells the composer what kind of color transform is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColorTransformHint(pub i32);

impl ColorTransformHint {
    /// No transform.
    pub const IDENTITY: Self = Self(0);
    /// A general 4x4 matrix; requires one.
    pub const ARBITRARY_MATRIX: Self = Self(1);
    /// Highest defined hint.
    pub const CORRECT_TRITANOPIA: Self = Self(6);

    const fn is_known(self) -> bool {
        self.0 >= Self::IDENTITY.0 && self.0 <= Self::CORRECT_TRITANOPIA.0
    }
}

/// A render intent number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderIntent(pub i32);

impl RenderIntent {
    /// Colorimetric rendering. The only supported intent.
    pub const COLORIMETRIC: Self = Self(0);
}

const IDENTITY_MATRIX: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// What a display method needs besides the display itself.
pub(crate) struct DisplayCtx<'a> {
    pub(crate) resources: &'a mut ResourceManager,
    pub(crate) describer: &'a dyn BufferDescriber,
    pub(crate) tracer: Tracer<'a>,
}

/// Per-display tunables copied from the composer config.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DisplayOptions {
    pub(crate) flattening_countdown: u32,
}

/// Framebuffers and a mode blob created for one commit attempt.
#[derive(Debug, Default)]
struct Pending {
    framebuffers: Vec<FramebufferId>,
    blob: Option<BlobId>,
}

impl Pending {
    fn discard(self, kms: &dyn KmsDevice) {
        release_framebuffers(kms, &self.framebuffers);
        if let Some(blob) = self.blob {
            destroy_blob(kms, blob);
        }
    }
}

/// One logical display.
pub(crate) struct HwcDisplay {
    id: DisplayId,
    connector: ConnectorRef,
    pipeline: Option<DisplayPipeline>,

    configs: DisplayConfigs,
    known_modes: Vec<Mode>,
    staged_mode: Option<Mode>,

    layers: LayerStore,
    client_target: Layer,
    assigner: Box<dyn LayerAssigner + Send>,

    color_mode: ColorMode,
    color_transform_hint: ColorTransformHint,
    color_matrix: [f32; 16],
    power_mode: PowerMode,

    active_composition: bool,
    on_screen: Vec<FramebufferId>,
    mode_blob: Option<BlobId>,
    last_fence: Option<OwnedFd>,
    frame_index: u64,

    stats: Stats,
    prev_stats: Stats,
    flattening: Arc<Mutex<FlatteningState>>,
    options: DisplayOptions,

    vsync: VsyncWorker,
    flattening_worker: VsyncWorker,
}

impl std::fmt::Debug for HwcDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HwcDisplay")
            .field("id", &self.id)
            .field("connector", &self.connector)
            .field("pipeline", &self.pipeline)
            .field("layers", &self.layers.len())
            .field("color_mode", &self.color_mode)
            .field("power_mode", &self.power_mode)
            .field("frame_index", &self.frame_index)
            .finish_non_exhaustive()
    }
}

impl HwcDisplay {
    /// Creates an unbound display and its two worker threads.
    pub(crate) fn new(
        id: DisplayId,
        connector: ConnectorRef,
        options: DisplayOptions,
        assigner: Box<dyn LayerAssigner + Send>,
        callbacks: &Arc<Callbacks>,
    ) -> io::Result<Self> {
        let vsync_callbacks = callbacks.clone();
        let vsync = VsyncWorker::spawn(
            format!("scanout-vsync-{id}"),
            FALLBACK_PERIOD,
            move |at, period| {
                vsync_callbacks.dispatch_vsync(id, at, period);
                VsyncAction::Continue
            },
        )?;

        let initial = if options.flattening_countdown == 0 {
            FlatteningState::Disabled
        } else {
            FlatteningState::NotRequired
        };
        let flattening = Arc::new(Mutex::new(initial));
        let tick_state = flattening.clone();
        let tick_callbacks = callbacks.clone();
        let flattening_worker = VsyncWorker::spawn(
            format!("scanout-flatten-{id}"),
            FALLBACK_PERIOD,
            move |_, _| {
                tick_callbacks.with_table(|table| {
                    let outcome = tick_state.lock().tick();
                    match outcome {
                        TickOutcome::Continue => VsyncAction::Continue,
                        TickOutcome::RefreshRequested => {
                            if let Some(refresh) = &table.refresh {
                                refresh(id);
                            }
                            VsyncAction::Stop
                        }
                        TickOutcome::Idle => VsyncAction::Stop,
                    }
                })
            },
        )?;

        let mut client_target = Layer::default();
        client_target.set_blend(BlendMode::Premultiplied);

        Ok(Self {
            id,
            connector,
            pipeline: None,
            configs: DisplayConfigs::new(),
            known_modes: Vec::new(),
            staged_mode: None,
            layers: LayerStore::new(),
            client_target,
            assigner,
            color_mode: ColorMode::NATIVE,
            color_transform_hint: ColorTransformHint::IDENTITY,
            color_matrix: IDENTITY_MATRIX,
            power_mode: PowerMode::On,
            active_composition: false,
            on_screen: Vec::new(),
            mode_blob: None,
            last_fence: None,
            frame_index: 0,
            stats: Stats::default(),
            prev_stats: Stats::default(),
            flattening,
            options,
            vsync,
            flattening_worker,
        })
    }

    #[inline]
    pub(crate) fn id(&self) -> DisplayId {
        self.id
    }

    #[inline]
    pub(crate) fn connector(&self) -> ConnectorRef {
        self.connector
    }

    #[inline]
    pub(crate) fn is_bound(&self) -> bool {
        self.pipeline.is_some()
    }

    #[cfg(test)]
    pub(crate) fn pipeline(&self) -> Option<&DisplayPipeline> {
        self.pipeline.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn stats(&self) -> Stats {
        self.stats
    }

    #[cfg(test)]
    pub(crate) fn flattening_state(&self) -> FlatteningState {
        *self.flattening.lock()
    }

    // -----------------------------------------------------------------------
    // Binding
    // -----------------------------------------------------------------------

    /// Binds a pipeline unless one is bound already. Returns `true` if the
    /// display has a pipeline afterwards.
    pub(crate) fn bind(&mut self, ctx: &mut DisplayCtx<'_>) -> bool {
        if self.pipeline.is_some() {
            return true;
        }
        let pipeline = ctx.resources.bind(self.id, self.connector);
        ctx.tracer.bind(&BindEvent {
            display: self.id,
            connector: self.connector,
            crtc: pipeline.as_ref().map(DisplayPipeline::crtc),
            overlay_planes: pipeline.as_ref().map_or(0, |p| {
                u32::try_from(p.overlay_planes().len()).unwrap_or(u32::MAX)
            }),
            at: now(),
        });
        let Some(pipeline) = pipeline else {
            warn!(
                "display {}: no free pipeline for connector {:?}",
                self.id, self.connector.connector
            );
            return false;
        };
        info!(
            "display {}: bound {:?} -> {:?} -> {:?} with {} planes",
            self.id,
            pipeline.connector(),
            pipeline.encoder(),
            pipeline.crtc(),
            pipeline.plane_capacity()
        );
        self.pipeline = Some(pipeline);
        self.known_modes.clear();
        self.refresh_configs(ctx.resources);
        true
    }

    /// Tears the pipeline down after its connector went away.
    ///
    /// Nothing is committed: the kernel already stopped scanning out. The
    /// framebuffers and the mode blob of the last frame are released and the
    /// claims returned.
    pub(crate) fn unbind(&mut self, resources: &mut ResourceManager) {
        self.vsync.set_enabled(false);
        self.flattening_worker.set_enabled(false);
        let Some(pipeline) = self.pipeline.take() else {
            return;
        };
        if let Some(entry) = resources.device(pipeline.device()) {
            let kms = entry.kms.clone();
            release_framebuffers(&*kms, &std::mem::take(&mut self.on_screen));
            if let Some(blob) = self.mode_blob.take() {
                destroy_blob(&*kms, blob);
            }
        }
        self.active_composition = false;
        self.last_fence = None;
        self.staged_mode = None;
        resources.release(pipeline);
        info!("display {}: pipeline released", self.id);
    }

    /// Rebuilds the config table if the connector's modes changed, and
    /// stages the preferred one.
    fn refresh_configs(&mut self, resources: &ResourceManager) {
        let Some(connector) = resources.connector(self.connector) else {
            return;
        };
        if connector.modes() == self.known_modes.as_slice() {
            return;
        }
        self.known_modes = connector.modes().to_vec();
        self.configs.update(&self.known_modes);
        if let Some(id) = self.configs.preferred_id() {
            // The id comes from the table just built.
            _ = self.apply_config(id);
        }
    }

    // -----------------------------------------------------------------------
    // Layers
    // -----------------------------------------------------------------------

    pub(crate) fn create_layer(&mut self) -> LayerId {
        self.layers.create()
    }

    pub(crate) fn destroy_layer(&mut self, layer: LayerId) -> Result<(), ScanoutError> {
        self.layers.destroy(layer)
    }

    pub(crate) fn layers_mut(&mut self) -> &mut LayerStore {
        &mut self.layers
    }

    pub(crate) fn set_client_target(
        &mut self,
        describer: &dyn BufferDescriber,
        buffer: Option<BufferHandle>,
        dataspace: Dataspace,
    ) -> Result<(), ScanoutError> {
        self.client_target.set_buffer(buffer);
        self.client_target.set_dataspace(dataspace);
        let Some(buffer) = buffer else {
            return Ok(());
        };
        let info = describer.describe(buffer).map_err(|err| {
            warn!("display {}: client target {buffer:?}: {err}", self.id);
            ScanoutError::BadParameter
        })?;
        self.client_target.set_source_crop(Rect::new(
            0.0,
            0.0,
            f64::from(info.width),
            f64::from(info.height),
        ));
        Ok(())
    }

    pub(crate) fn get_changed_composition_types(&self) -> Vec<(LayerId, CompositionType)> {
        self.layers.changed_types()
    }

    pub(crate) fn accept_display_changes(&mut self) {
        self.layers.accept_changes();
    }

    // -----------------------------------------------------------------------
    // Frame
    // -----------------------------------------------------------------------

    pub(crate) fn validate(&mut self, ctx: &mut DisplayCtx<'_>) -> Result<ValidateOutcome, ScanoutError> {
        let capacity = self
            .pipeline
            .as_ref()
            .ok_or(ScanoutError::TopologyMismatch)?
            .plane_capacity();

        let mut outcome = if self.flattening_policy(&mut ctx.tracer) {
            self.stats.frames_flattened += 1;
            assign_all_client(&mut self.layers)
        } else {
            self.assigner.assign(&mut self.layers, capacity)
        };

        match self.create_composition(ctx, true) {
            Ok(_) | Err(ScanoutError::NoLayers) => {}
            Err(err) => {
                debug!("display {}: test commit failed ({err}), all client", self.id);
                self.stats.failed_kms_validate += 1;
                outcome = assign_all_client(&mut self.layers);
            }
        }
        self.stats.total_pixops += outcome.total_pixops;
        self.stats.gpu_pixops += outcome.gpu_pixops;
        Ok(outcome)
    }

    pub(crate) fn present(&mut self, ctx: &mut DisplayCtx<'_>) -> Result<Option<OwnedFd>, ScanoutError> {
        if self.pipeline.is_none() {
            return Err(ScanoutError::TopologyMismatch);
        }
        self.stats.total_frames += 1;
        match self.create_composition(ctx, false) {
            Ok(fence) => Ok(fence),
            Err(ScanoutError::NoLayers) => Ok(None),
            Err(err) => {
                warn!("display {}: present failed: {err}", self.id);
                self.stats.failed_kms_present += 1;
                Err(err)
            }
        }
    }

    /// Builds, imports and commits the current layers.
    ///
    /// A test-only commit leaves no trace: its framebuffers and mode blob
    /// are released right away and the staged mode stays staged. A real
    /// commit replaces the frame on screen and returns a duplicate of its
    /// out-fence.
    pub(crate) fn create_composition(
        &mut self,
        ctx: &mut DisplayCtx<'_>,
        test_only: bool,
    ) -> Result<Option<OwnedFd>, ScanoutError> {
        let pipeline = self.pipeline.as_ref().ok_or(ScanoutError::TopologyMismatch)?;
        let entry = ctx
            .resources
            .device(pipeline.device())
            .ok_or(ScanoutError::TopologyMismatch)?;
        let kms = &*entry.kms;
        let device = &entry.model;

        let mut pending = Pending::default();
        let built = build_composition(&self.layers, &self.client_target, |layer| {
            let fb = import(kms, ctx.describer, layer)?;
            pending.framebuffers.push(fb);
            Ok(fb)
        });
        let composition = match built {
            Ok(composition) => composition,
            Err(err) => {
                pending.discard(kms);
                return Err(err);
            }
        };
        ctx.tracer.composition(&CompositionEvent {
            display: self.id,
            frame_index: self.frame_index,
            layers: u32::try_from(composition.len()).unwrap_or(u32::MAX),
            client_target: composition
                .layers()
                .iter()
                .any(|l| l.source == LayerSource::ClientTarget),
            at: now(),
        });

        if let Some(mode) = &self.staged_mode {
            match kms.create_mode_blob(mode) {
                Ok(blob) => pending.blob = Some(blob),
                Err(err) => {
                    warn!("display {}: mode blob for {}: {err}", self.id, mode.name);
                    pending.discard(kms);
                    return Err(ScanoutError::ResourceExhausted(Resource::Blob));
                }
            }
        }

        let args = CommitArgs {
            composition: Some(&composition),
            mode_blob: pending.blob,
            test_only,
            ..CommitArgs::default()
        };
        let request = match build_request(device, pipeline, &args) {
            Ok(request) => request,
            Err(err) => {
                pending.discard(kms);
                return Err(err);
            }
        };
        let result = kms.atomic_commit(&request, args.flags());
        ctx.tracer.commit(&CommitEvent {
            display: self.id,
            frame_index: self.frame_index,
            test_only,
            modeset: args.mode_blob.is_some(),
            success: result.is_ok(),
            at: now(),
        });

        let fence = match result {
            Ok(fence) => fence,
            Err(err) => {
                if test_only {
                    debug!("display {}: test commit rejected: {err}", self.id);
                } else {
                    warn!("display {}: commit rejected: {err}", self.id);
                }
                pending.discard(kms);
                return Err(ScanoutError::ResourceExhausted(Resource::Commit));
            }
        };
        if test_only {
            pending.discard(kms);
            return Ok(None);
        }

        let previous = std::mem::replace(&mut self.on_screen, pending.framebuffers);
        release_framebuffers(kms, &previous);
        if let Some(blob) = pending.blob {
            if let Some(old) = self.mode_blob.replace(blob) {
                destroy_blob(kms, old);
            }
            self.staged_mode = None;
        }
        self.active_composition = true;
        self.frame_index += 1;
        self.last_fence = fence;
        Ok(self.dup_fence())
    }

    fn dup_fence(&self) -> Option<OwnedFd> {
        let fence = self.last_fence.as_ref()?;
        match fence.try_clone() {
            Ok(dup) => Some(dup),
            Err(err) => {
                warn!("display {}: cannot duplicate fence: {err}", self.id);
                None
            }
        }
    }

    /// A duplicate of the last present fence for every layer.
    pub(crate) fn get_release_fences(&self) -> Vec<(LayerId, OwnedFd)> {
        if self.last_fence.is_none() {
            return Vec::new();
        }
        self.layers
            .iter()
            .filter_map(|(id, _)| self.dup_fence().map(|fence| (id, fence)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Configs
    // -----------------------------------------------------------------------

    pub(crate) fn get_display_configs(&mut self, resources: &ResourceManager) -> Vec<u32> {
        if self.pipeline.is_some() {
            self.refresh_configs(resources);
        }
        self.configs.visible_ids().collect()
    }

    pub(crate) fn get_active_config(&self) -> Result<u32, ScanoutError> {
        self.configs
            .active_id()
            .ok_or(ScanoutError::BadHandle(HandleKind::Config))
    }

    pub(crate) fn set_active_config(&mut self, config: u32) -> Result<(), ScanoutError> {
        self.apply_config(config)
    }

    /// Makes `config` active and stages its mode for the next commit.
    fn apply_config(&mut self, config: u32) -> Result<(), ScanoutError> {
        let mode = match self.configs.get(config) {
            Some(c) if !c.disabled => c.mode.clone(),
            _ => return Err(ScanoutError::BadHandle(HandleKind::Config)),
        };
        self.configs.set_active(config);
        let (width, height) = mode.size();
        self.client_target.set_display_frame(Rect::new(
            0.0,
            0.0,
            f64::from(width),
            f64::from(height),
        ));
        if let Some(period) = Duration::from_refresh_hz(mode.refresh_hz()) {
            self.vsync.set_period(period);
            self.flattening_worker.set_period(period);
        }
        self.staged_mode = Some(mode);
        Ok(())
    }

    pub(crate) fn get_display_attribute(
        &self,
        resources: &ResourceManager,
        config: u32,
        attribute: DisplayAttribute,
    ) -> Result<i32, ScanoutError> {
        let config = self
            .configs
            .get(config)
            .ok_or(ScanoutError::BadHandle(HandleKind::Config))?;
        let (width, height) = config.mode.size();
        let (mm_width, mm_height) = resources
            .connector(self.connector)
            .map_or((0, 0), Connector::size_mm);
        let dpi = |pixels: u16, mm: u32| {
            if mm == 0 {
                -1
            } else {
                i32::try_from(u32::from(pixels) * 25_400 / mm).unwrap_or(i32::MAX)
            }
        };
        Ok(match attribute {
            DisplayAttribute::Width => i32::from(width),
            DisplayAttribute::Height => i32::from(height),
            DisplayAttribute::VsyncPeriod => Duration::from_refresh_hz(config.mode.refresh_hz())
                .map_or(-1, |p| i32::try_from(p.as_nanos()).unwrap_or(i32::MAX)),
            DisplayAttribute::DpiX => dpi(width, mm_width),
            DisplayAttribute::DpiY => dpi(height, mm_height),
            DisplayAttribute::ConfigGroup => i32::try_from(config.group_id).unwrap_or(i32::MAX),
        })
    }

    pub(crate) fn vsync_period(&self) -> Duration {
        self.vsync.period()
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    pub(crate) fn name(&self) -> String {
        format!("display-{}", self.connector.connector.0)
    }

    /// Port number and EDID blob.
    pub(crate) fn identification_data(
        &self,
        resources: &ResourceManager,
    ) -> Result<(u8, Vec<u8>), ScanoutError> {
        let edid = resources
            .connector(self.connector)
            .and_then(Connector::edid)
            .ok_or(ScanoutError::Unsupported(Feature::Identification))?;
        Ok((self.connector.connector.0.to_le_bytes()[0], edid.to_vec()))
    }

    pub(crate) fn connection_type(
        &self,
        resources: &ResourceManager,
    ) -> Result<ConnectionType, ScanoutError> {
        match resources.connector(self.connector).map(Connector::class) {
            Some(ConnectorClass::Internal) => Ok(ConnectionType::Internal),
            Some(ConnectorClass::External) => Ok(ConnectionType::External),
            _ => Err(ScanoutError::Unsupported(Feature::ConnectionType)),
        }
    }

    // -----------------------------------------------------------------------
    // Color
    // -----------------------------------------------------------------------

    pub(crate) fn set_color_mode(&mut self, mode: ColorMode) -> Result<(), ScanoutError> {
        if !mode.is_known() {
            return Err(ScanoutError::BadParameter);
        }
        if mode != ColorMode::NATIVE {
            return Err(ScanoutError::Unsupported(Feature::ColorMode));
        }
        self.color_mode = mode;
        Ok(())
    }

    pub(crate) fn set_color_transform(
        &mut self,
        matrix: Option<&[f32; 16]>,
        hint: ColorTransformHint,
    ) -> Result<(), ScanoutError> {
        if !hint.is_known() {
            return Err(ScanoutError::BadParameter);
        }
        if hint == ColorTransformHint::ARBITRARY_MATRIX {
            let Some(matrix) = matrix else {
                return Err(ScanoutError::BadParameter);
            };
            self.color_matrix = *matrix;
        } else {
            self.color_matrix = IDENTITY_MATRIX;
        }
        self.color_transform_hint = hint;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn color_transform(&self) -> (ColorTransformHint, [f32; 16]) {
        (self.color_transform_hint, self.color_matrix)
    }

    pub(crate) fn get_client_target_support(
        &self,
        resources: &ResourceManager,
        width: u32,
        height: u32,
        dataspace: Dataspace,
    ) -> Result<(), ScanoutError> {
        let device = resources
            .device(self.connector.device)
            .ok_or(ScanoutError::TopologyMismatch)?;
        let (min_w, min_h) = device.model.min_size();
        let (max_w, max_h) = device.model.max_size();
        if !(min_w..=max_w).contains(&width) || !(min_h..=max_h).contains(&height) {
            return Err(ScanoutError::Unsupported(Feature::ClientTargetSize));
        }
        if dataspace != Dataspace::UNKNOWN {
            return Err(ScanoutError::Unsupported(Feature::Dataspace));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Power and vsync
    // -----------------------------------------------------------------------

    pub(crate) fn set_power_mode(
        &mut self,
        ctx: &mut DisplayCtx<'_>,
        mode: PowerMode,
    ) -> Result<(), ScanoutError> {
        match mode {
            PowerMode::Doze | PowerMode::DozeSuspend => {
                return Err(ScanoutError::Unsupported(Feature::Doze));
            }
            PowerMode::Off => self.power_off(ctx)?,
            PowerMode::On => self.power_on(ctx)?,
        }
        self.power_mode = mode;
        Ok(())
    }

    fn power_off(&mut self, ctx: &mut DisplayCtx<'_>) -> Result<(), ScanoutError> {
        let pipeline = self.pipeline.as_ref().ok_or(ScanoutError::TopologyMismatch)?;
        let entry = ctx
            .resources
            .device(pipeline.device())
            .ok_or(ScanoutError::TopologyMismatch)?;
        let args = CommitArgs {
            active: Some(false),
            clear: true,
            ..CommitArgs::default()
        };
        let request = build_request(&entry.model, pipeline, &args)?;
        let result = entry.kms.atomic_commit(&request, args.flags());
        ctx.tracer.commit(&CommitEvent {
            display: self.id,
            frame_index: self.frame_index,
            test_only: false,
            modeset: true,
            success: result.is_ok(),
            at: now(),
        });
        if let Err(err) = result {
            warn!("display {}: power off rejected: {err}", self.id);
            return Err(ScanoutError::ResourceExhausted(Resource::Commit));
        }

        let kms = entry.kms.clone();
        release_framebuffers(&*kms, &std::mem::take(&mut self.on_screen));
        if let Some(blob) = self.mode_blob.take() {
            destroy_blob(&*kms, blob);
        }
        self.active_composition = false;
        self.last_fence = None;
        // The next frame has to activate the pipeline again.
        self.staged_mode = self.configs.active().map(|c| c.mode.clone());
        Ok(())
    }

    fn power_on(&self, ctx: &DisplayCtx<'_>) -> Result<(), ScanoutError> {
        if self.active_composition {
            return Ok(());
        }
        let Some(entry) = ctx.resources.device(self.connector.device) else {
            return Err(ScanoutError::TopologyMismatch);
        };
        let Some(dpms) = entry
            .model
            .connector(self.connector.connector)
            .and_then(|c| c.props.dpms)
        else {
            return Ok(());
        };
        entry
            .kms
            .set_property(
                PropertyTarget::Connector(self.connector.connector),
                dpms,
                DPMS_ON,
            )
            .map_err(|err| {
                warn!("display {}: DPMS on failed: {err}", self.id);
                ScanoutError::ResourceExhausted(Resource::Commit)
            })
    }

    pub(crate) fn set_vsync_enabled(&self, enabled: bool) {
        self.vsync.set_enabled(enabled);
    }

    // -----------------------------------------------------------------------
    // Flattening
    // -----------------------------------------------------------------------

    /// Applies an external flattening decision.
    pub(crate) fn set_flattening(&self, request: FlatteningRequest, tracer: &mut Tracer<'_>) {
        let (counting, state) = {
            let mut state = self.flattening.lock();
            (state.apply(request), *state)
        };
        self.flattening_worker.set_enabled(counting);
        tracer.flattening(&FlatteningEvent {
            display: self.id,
            state,
            at: now(),
        });
    }

    /// Built-in flattening policy, run at the start of validation. Returns
    /// `true` when this frame should be composed entirely by the client.
    ///
    /// A frame with at most one layer needs no flattening. Otherwise, once
    /// the countdown has requested a refresh, the next frame is flattened;
    /// any other frame restarts the countdown.
    fn flattening_policy(&self, tracer: &mut Tracer<'_>) -> bool {
        let current = *self.flattening.lock();
        let request = match current {
            FlatteningState::Disabled => return false,
            _ if self.layers.len() <= 1 => FlatteningRequest::NotRequired,
            FlatteningState::ClientRefreshRequested => FlatteningRequest::Flattened,
            _ => FlatteningRequest::Arm(self.options.flattening_countdown),
        };
        self.set_flattening(request, tracer);
        request == FlatteningRequest::Flattened
    }

    // -----------------------------------------------------------------------
    // Dump
    // -----------------------------------------------------------------------

    pub(crate) fn dump(&mut self) -> String {
        let delta = self.stats.minus(&self.prev_stats);
        let mut out = String::new();
        // Writing to a String cannot fail.
        _ = write!(
            out,
            "- Display on: {}\n  Flattening state: {}\nStatistics since system boot:\n{}\n\nStatistics since last dumpsys request:\n{}\n\n",
            self.name(),
            *self.flattening.lock(),
            self.stats,
            delta
        );
        self.prev_stats = self.stats;
        out
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn import(
    kms: &dyn KmsDevice,
    describer: &dyn BufferDescriber,
    layer: &Layer,
) -> Result<FramebufferId, ScanoutError> {
    let buffer = layer
        .buffer()
        .ok_or(ScanoutError::ResourceExhausted(Resource::Import))?;
    describer
        .describe(buffer)
        .and_then(|info| kms.add_framebuffer(&info))
        .map_err(|err| {
            warn!("import of {buffer:?} failed: {err}");
            ScanoutError::ResourceExhausted(Resource::Import)
        })
}

fn release_framebuffers(kms: &dyn KmsDevice, framebuffers: &[FramebufferId]) {
    for fb in framebuffers {
        if let Err(err) = kms.remove_framebuffer(*fb) {
            warn!("releasing {fb:?}: {err}");
        }
    }
}

fn destroy_blob(kms: &dyn KmsDevice, blob: BlobId) {
    if let Err(err) = kms.destroy_blob(blob) {
        warn!("destroying {blob:?}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, Output};

    fn fixture() -> Fixture {
        Fixture::new(&[Output::edp(1, true)])
    }

    #[test]
    fn empty_present_is_benign() {
        let mut fx = fixture();
        let display = fx.display(DisplayId::PRIMARY);
        let result = fx.with(display, |d, ctx| d.present(ctx));
        assert!(matches!(result, Ok(None)), "nothing to present");
        assert_eq!(fx.kms.commit_count(), 0, "no commit issued");
        let stats = fx.with(display, |d, _| d.stats());
        assert_eq!(stats.total_frames, 1, "frame counted");
        assert_eq!(stats.failed_kms_present, 0, "not a failure");
    }

    #[test]
    fn staged_mode_applied_once() {
        let mut fx = fixture();
        let display = fx.display(DisplayId::PRIMARY);
        fx.add_device_layer(display, 0, 1);

        fx.with(display, |d, ctx| d.validate(ctx)).unwrap();
        let test = fx.kms.last_commit().unwrap();
        assert!(test.1.test_only, "validation tests");
        assert!(test.1.allow_modeset, "test carries the staged mode");

        fx.with(display, |d, ctx| d.present(ctx)).unwrap();
        let first = fx.kms.last_commit().unwrap();
        assert!(!first.1.test_only, "real commit");
        assert!(first.1.allow_modeset, "first frame sets the mode");

        fx.with(display, |d, ctx| d.validate(ctx)).unwrap();
        fx.with(display, |d, ctx| d.present(ctx)).unwrap();
        let second = fx.kms.last_commit().unwrap();
        assert!(!second.1.allow_modeset, "mode already applied");
        assert_eq!(fx.kms.live_blobs(), 1, "one mode blob in use");
    }

    #[test]
    fn framebuffers_released_after_next_frame() {
        let mut fx = fixture();
        let display = fx.display(DisplayId::PRIMARY);
        fx.add_device_layer(display, 0, 1);

        fx.with(display, |d, ctx| d.validate(ctx)).unwrap();
        assert_eq!(fx.kms.live_framebuffers(), 0, "test frame released");
        fx.with(display, |d, ctx| d.present(ctx)).unwrap();
        let first = fx.kms.live_framebuffer_ids();
        assert_eq!(first.len(), 1, "frame on screen");

        fx.with(display, |d, ctx| d.present(ctx)).unwrap();
        let second = fx.kms.live_framebuffer_ids();
        assert_eq!(second.len(), 1, "only the newest frame is alive");
        assert_ne!(first, second, "previous frame released");
    }

    #[test]
    fn failed_test_commit_falls_back_to_client() {
        let mut fx = fixture();
        let display = fx.display(DisplayId::PRIMARY);
        let layer = fx.add_device_layer(display, 0, 1);
        fx.kms.fail_test_commits(true);

        let outcome = fx.with(display, |d, ctx| d.validate(ctx)).unwrap();
        assert_eq!(outcome.changed_types, 1, "device layer demoted");
        let changed = fx.with(display, |d, _| d.get_changed_composition_types());
        assert_eq!(changed, [(layer, CompositionType::Client)], "layer is client");
        let stats = fx.with(display, |d, _| d.stats());
        assert_eq!(stats.failed_kms_validate, 1, "counted");
    }

    #[test]
    fn import_failure_releases_partial_imports() {
        let mut fx = fixture();
        let display = fx.display(DisplayId::PRIMARY);
        fx.add_device_layer(display, 0, 1);
        fx.add_device_layer(display, 1, 0);
        // Handle 0 cannot be described; force both layers onto planes.
        fx.with(display, |d, _| {
            let ids: Vec<LayerId> = d.layers.iter().map(|(id, _)| id).collect();
            for id in ids {
                d.layers.set_validated_type(id, CompositionType::Device).unwrap();
            }
        });
        let result = fx.with(display, |d, ctx| d.present(ctx));
        assert_eq!(
            result.err(),
            Some(ScanoutError::ResourceExhausted(Resource::Import)),
            "second layer fails"
        );
        assert_eq!(fx.kms.live_framebuffers(), 0, "first import released");
        let stats = fx.with(display, |d, _| d.stats());
        assert_eq!(stats.failed_kms_present, 1, "present failure counted");
    }

    #[test]
    fn release_fences_duplicate_present_fence() {
        let mut fx = fixture();
        let display = fx.display(DisplayId::PRIMARY);
        fx.add_device_layer(display, 0, 1);
        fx.add_device_layer(display, 1, 2);
        fx.with(display, |d, ctx| d.validate(ctx)).unwrap();
        let fence = fx.with(display, |d, ctx| d.present(ctx)).unwrap();
        assert!(fence.is_some(), "present fence returned");
        let fences = fx.with(display, |d, _| d.get_release_fences());
        assert_eq!(fences.len(), 2, "one per layer");
    }

    #[test]
    fn power_off_then_on() {
        let mut fx = fixture();
        let display = fx.display(DisplayId::PRIMARY);
        fx.add_device_layer(display, 0, 1);
        fx.with(display, |d, ctx| d.validate(ctx)).unwrap();
        fx.with(display, |d, ctx| d.present(ctx)).unwrap();

        fx.with(display, |d, ctx| d.set_power_mode(ctx, PowerMode::Off))
            .unwrap();
        assert_eq!(fx.kms.live_framebuffers(), 0, "screen cleared");
        assert_eq!(fx.kms.live_blobs(), 0, "mode blob destroyed");
        let off = fx.kms.last_commit().unwrap();
        assert!(off.1.allow_modeset, "deactivation is a modeset");

        fx.with(display, |d, ctx| d.set_power_mode(ctx, PowerMode::On))
            .unwrap();
        assert_eq!(fx.kms.property_writes().len(), 1, "DPMS on written");

        assert_eq!(
            fx.with(display, |d, ctx| d.set_power_mode(ctx, PowerMode::Doze)),
            Err(ScanoutError::Unsupported(Feature::Doze)),
            "doze is a stub"
        );

        fx.with(display, |d, ctx| d.validate(ctx)).unwrap();
        fx.with(display, |d, ctx| d.present(ctx)).unwrap();
        assert!(
            fx.kms.last_commit().unwrap().1.allow_modeset,
            "next frame reactivates"
        );
    }

    #[test]
    fn config_attributes() {
        let mut fx = fixture();
        let display = fx.display(DisplayId::PRIMARY);
        let (configs, active) = fx.with(display, |d, ctx| {
            (d.get_display_configs(ctx.resources), d.get_active_config())
        });
        assert_eq!(configs.len(), 2, "two modes");
        let active = active.unwrap();
        assert_eq!(active, configs[0], "preferred mode active");

        let attr = |fx: &mut Fixture, a: DisplayAttribute| {
            fx.with(display, |d, ctx| d.get_display_attribute(ctx.resources, active, a))
        };
        assert_eq!(attr(&mut fx, DisplayAttribute::Width), Ok(1920), "width");
        assert_eq!(attr(&mut fx, DisplayAttribute::Height), Ok(1080), "height");
        assert_eq!(
            attr(&mut fx, DisplayAttribute::DpiX),
            Ok(1920 * 25_400 / 340),
            "dpi from physical size"
        );
        assert_eq!(attr(&mut fx, DisplayAttribute::ConfigGroup), Ok(1), "group");
        assert_eq!(
            fx.with(display, |d, _| d.set_active_config(999)),
            Err(ScanoutError::BadHandle(HandleKind::Config)),
            "unknown config"
        );

        let again = fx.with(display, |d, ctx| d.get_display_configs(ctx.resources));
        assert_eq!(again, configs, "ids stable while modes are unchanged");
    }

    #[test]
    fn switching_config_commits_its_mode_once() {
        let mut fx = fixture();
        let display = fx.display(DisplayId::PRIMARY);
        fx.add_device_layer(display, 0, 1);
        fx.with(display, |d, ctx| d.validate(ctx)).unwrap();
        fx.with(display, |d, ctx| d.present(ctx)).unwrap();
        assert_eq!(fx.kms.modeset_commits(), 1, "initial mode set");
        assert_eq!(
            fx.with(display, |d, _| d.pipeline().map(DisplayPipeline::plane_capacity)),
            Some(2),
            "primary plus one overlay"
        );

        let configs = fx.with(display, |d, ctx| d.get_display_configs(ctx.resources));
        let smaller = configs[1];
        fx.with(display, |d, _| d.set_active_config(smaller)).unwrap();
        assert_eq!(
            fx.with(display, |d, _| d.get_active_config()),
            Ok(smaller),
            "new config active"
        );

        fx.with(display, |d, ctx| d.validate(ctx)).unwrap();
        fx.with(display, |d, ctx| d.present(ctx)).unwrap();
        assert_eq!(fx.kms.modeset_commits(), 2, "switch committed");
        assert_eq!(
            fx.kms.last_uploaded_mode().map(|m| m.size()),
            Some((1280, 720)),
            "the selected mode was uploaded"
        );
        assert_eq!(fx.kms.live_blobs(), 1, "previous mode blob destroyed");

        fx.with(display, |d, ctx| d.validate(ctx)).unwrap();
        fx.with(display, |d, ctx| d.present(ctx)).unwrap();
        assert_eq!(fx.kms.modeset_commits(), 2, "not committed again");
        assert!(
            !fx.kms.last_commit().unwrap().1.allow_modeset,
            "plain page flip"
        );
        assert_eq!(
            fx.with(display, |d, _| d.get_active_config()),
            Ok(smaller),
            "config stays active"
        );
    }

    #[test]
    fn identity_and_color() {
        let mut fx = fixture();
        let display = fx.display(DisplayId::PRIMARY);
        fx.with(display, |d, ctx| {
            assert_eq!(d.name(), "display-1", "named after the connector");
            assert_eq!(
                d.connection_type(ctx.resources),
                Ok(ConnectionType::Internal),
                "eDP is internal"
            );
            assert_eq!(
                d.identification_data(ctx.resources),
                Err(ScanoutError::Unsupported(Feature::Identification)),
                "no EDID"
            );
            assert_eq!(d.set_color_mode(ColorMode::NATIVE), Ok(()), "native");
            assert_eq!(
                d.set_color_mode(ColorMode(7)),
                Err(ScanoutError::Unsupported(Feature::ColorMode)),
                "known but unsupported"
            );
            assert_eq!(
                d.set_color_mode(ColorMode(12)),
                Err(ScanoutError::BadParameter),
                "out of range"
            );
            assert_eq!(
                d.set_color_transform(None, ColorTransformHint::ARBITRARY_MATRIX),
                Err(ScanoutError::BadParameter),
                "arbitrary needs a matrix"
            );
            assert_eq!(
                d.set_color_transform(None, ColorTransformHint(7)),
                Err(ScanoutError::BadParameter),
                "hint out of range"
            );
            let mut m = IDENTITY_MATRIX;
            m[0] = 0.5;
            d.set_color_transform(Some(&m), ColorTransformHint::ARBITRARY_MATRIX)
                .unwrap();
            assert_eq!(d.color_transform(), (ColorTransformHint::ARBITRARY_MATRIX, m), "matrix stored");
        });
    }

    #[test]
    fn client_target_support() {
        let mut fx = fixture();
        let display = fx.display(DisplayId::PRIMARY);
        fx.with(display, |d, ctx| {
            assert_eq!(
                d.get_client_target_support(ctx.resources, 1920, 1080, Dataspace::UNKNOWN),
                Ok(()),
                "fits"
            );
            assert_eq!(
                d.get_client_target_support(ctx.resources, 10_000, 1080, Dataspace::UNKNOWN),
                Err(ScanoutError::Unsupported(Feature::ClientTargetSize)),
                "too wide"
            );
            assert_eq!(
                d.get_client_target_support(ctx.resources, 1920, 1080, Dataspace(5)),
                Err(ScanoutError::Unsupported(Feature::Dataspace)),
                "dataspace must be unknown"
            );
        });
    }

    #[test]
    fn flattening_arms_on_multi_layer_frames() {
        let mut fx = fixture();
        let display = fx.display(DisplayId::PRIMARY);
        fx.add_device_layer(display, 0, 1);
        fx.with(display, |d, ctx| d.validate(ctx)).unwrap();
        assert_eq!(
            fx.with(display, |d, _| d.flattening_state()),
            FlatteningState::NotRequired,
            "single layer"
        );

        fx.add_device_layer(display, 1, 2);
        fx.with(display, |d, ctx| d.validate(ctx)).unwrap();
        assert!(
            fx.with(display, |d, _| d.flattening_state()).is_counting(),
            "countdown armed"
        );

        fx.with(display, |d, ctx| {
            *d.flattening.lock() = FlatteningState::ClientRefreshRequested;
            d.validate(ctx)
        })
        .unwrap();
        assert_eq!(
            fx.with(display, |d, _| d.flattening_state()),
            FlatteningState::Flattened,
            "refresh turned into a flattened frame"
        );
        assert_eq!(fx.with(display, |d, _| d.stats()).frames_flattened, 1, "counted");
    }

    #[test]
    fn dump_reports_deltas() {
        let mut fx = fixture();
        let display = fx.display(DisplayId::PRIMARY);
        let first = fx.with(display, |d, _| d.dump());
        assert!(first.starts_with("- Display on: display-1"), "{first}");
        assert!(first.contains("No stats yet"), "{first}");
    }

    #[test]
    fn unbound_display_operations() {
        let mut fx = Fixture::new(&[Output::edp(1, true), Output::hdmi(2, false)]);
        let display = fx.display(DisplayId::PRIMARY.next());
        let result = fx.with(display, |d, ctx| d.validate(ctx));
        assert_eq!(result, Err(ScanoutError::TopologyMismatch), "not bound");
        let result = fx.with(display, |d, ctx| d.present(ctx).map(|_| ()));
        assert_eq!(result, Err(ScanoutError::TopologyMismatch), "not bound");
    }
}
