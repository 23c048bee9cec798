// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The composer entry point.
//!
//! [`Hwc`] owns the master lock. Every consumer operation takes it for the
//! duration of the call, looks the display up and forwards. Consumer
//! callbacks are never invoked with the master lock held: hotplug
//! notifications are sent after unlocking, vsync and refresh come from
//! worker threads that never take it.

use std::collections::BTreeMap;
use std::fmt;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use kurbo::Rect;
use parking_lot::{Mutex, MutexGuard};
use scanout_core::backend::{GenericAssigner, ValidateOutcome};
use scanout_core::buffer::BufferHandle;
use scanout_core::error::{Feature, HandleKind, ScanoutError};
use scanout_core::flatten::FlatteningRequest;
use scanout_core::hw::Connector;
use scanout_core::layer::{BlendMode, CompositionType, Dataspace, LayerId};
use scanout_core::output::DisplayId;
use scanout_core::time::Duration;
use scanout_core::trace::{HotplugEvent, TraceSink, Tracer};
use tracing::{debug, info, warn};

use crate::callbacks::{Callbacks, HotplugCallback, RefreshCallback, VsyncCallback};
use crate::config::HwcConfig;
use crate::display::{
    ColorMode, ColorTransformHint, ConnectionType, DisplayAttribute, DisplayCtx, DisplayOptions,
    HwcDisplay, PowerMode, RenderIntent,
};
use crate::error::InitError;
use crate::hotplug::{HotplugListener, HotplugSource};
use crate::resources::ResourceManager;
use crate::time::now;
use crate::transport::{BufferDescriber, DeviceOpener};

/// HDR support of a display. Always empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HdrCapabilities {
    /// Supported HDR types.
    pub types: Vec<i32>,
    /// Peak luminance in nits.
    pub max_luminance: f32,
    /// Frame-average luminance in nits.
    pub max_average_luminance: f32,
    /// Minimum luminance in nits.
    pub min_luminance: f32,
}

struct HwcState {
    resources: ResourceManager,
    displays: BTreeMap<DisplayId, HwcDisplay>,
    trace: Option<Box<dyn TraceSink + Send>>,
}

impl HwcState {
    /// Splits the state into the display table and a context for display
    /// methods.
    fn split<'a>(
        &'a mut self,
        describer: &'a dyn BufferDescriber,
    ) -> (&'a mut BTreeMap<DisplayId, HwcDisplay>, DisplayCtx<'a>) {
        let tracer = Tracer::maybe(self.trace.as_deref_mut().map(|s| s as &mut dyn TraceSink));
        (
            &mut self.displays,
            DisplayCtx {
                resources: &mut self.resources,
                describer,
                tracer,
            },
        )
    }
}

struct Shared {
    state: Mutex<HwcState>,
    callbacks: Arc<Callbacks>,
    describer: Arc<dyn BufferDescriber>,
}

impl Shared {
    fn handle_hotplug(&self) {
        let mut guard = self.state.lock();
        let mut notifications = Vec::new();
        {
            let (displays, mut ctx) = guard.split(&*self.describer);

            let mut changed = Vec::new();
            for disp in displays.values() {
                let id = disp.id();
                match ctx.resources.refresh_connector(disp.connector()) {
                    Ok(true) => changed.push(id),
                    Ok(false) => {}
                    Err(err) => warn!("display {id}: connector probe failed: {err}"),
                }
            }

            // Disconnects first so a reconnect elsewhere can reuse the hardware.
            for disp in displays.values_mut() {
                if changed.contains(&disp.id())
                    && !is_connected(ctx.resources, disp)
                    && disp.is_bound()
                {
                    disp.unbind(ctx.resources);
                    notifications.push((disp.id(), false));
                }
            }
            for disp in displays.values_mut() {
                if disp.is_bound() || !is_connected(ctx.resources, disp) {
                    continue;
                }
                if disp.bind(&mut ctx) {
                    notifications.push((disp.id(), true));
                }
            }

            for &(id, connected) in &notifications {
                info!(
                    "display {id}: {}",
                    if connected { "connected" } else { "disconnected" }
                );
                ctx.tracer.hotplug(&HotplugEvent {
                    display: id,
                    connected,
                    at: now(),
                });
            }
        }

        for (id, connected) in notifications {
            MutexGuard::unlocked(&mut guard, || {
                if let Some(hotplug) = self.callbacks.hotplug() {
                    hotplug(id, connected);
                }
            });
        }
    }
}

fn is_connected(resources: &ResourceManager, display: &HwcDisplay) -> bool {
    resources
        .connector(display.connector())
        .is_some_and(Connector::is_connected)
}

/// The display composer.
///
/// Created once per process with [`Hwc::new`]. All methods may be called
/// from any thread.
pub struct Hwc {
    shared: Arc<Shared>,
    listener: Option<HotplugListener>,
}

impl fmt::Debug for Hwc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Hwc");
        // Never hold the master lock and the callback lock together here.
        s.field("callbacks", &self.shared.callbacks);
        let state = self.shared.state.lock();
        s.field("resources", &state.resources)
            .field("displays", &state.displays)
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl Hwc {
    /// Opens the configured devices, numbers the displays and binds a
    /// pipeline for every connected one.
    ///
    /// # Errors
    ///
    /// - [`InitError::NoUsableDevice`] if no node qualifies.
    /// - [`InitError::NoPrimaryDisplay`] if no connector can be primary.
    /// - [`InitError::Spawn`] if a worker thread cannot be started.
    pub fn new(
        config: &HwcConfig,
        opener: &dyn DeviceOpener,
        describer: Arc<dyn BufferDescriber>,
    ) -> Result<Self, InitError> {
        let resources = ResourceManager::init(config, opener)?;
        let callbacks = Arc::new(Callbacks::default());
        let options = DisplayOptions {
            flattening_countdown: config.flattening_countdown,
        };

        let mut displays = BTreeMap::new();
        for assignment in resources.assignments() {
            let display = HwcDisplay::new(
                assignment.display,
                assignment.connector,
                options,
                Box::new(GenericAssigner {
                    scale_with_gpu: config.scale_with_gpu,
                }),
                &callbacks,
            )
            .map_err(InitError::Spawn)?;
            displays.insert(assignment.display, display);
        }

        let mut state = HwcState {
            resources,
            displays,
            trace: None,
        };
        {
            let (displays, mut ctx) = state.split(&*describer);
            for display in displays.values_mut() {
                if is_connected(ctx.resources, display) {
                    display.bind(&mut ctx);
                }
            }
        }
        info!(
            "{} displays, {} bound",
            state.displays.len(),
            state.displays.values().filter(|d| d.is_bound()).count()
        );

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                callbacks,
                describer,
            }),
            listener: None,
        })
    }

    /// Starts a thread that handles every event of `source` as a hotplug.
    /// Replaces a previously started listener.
    ///
    /// # Errors
    ///
    /// [`InitError::Spawn`] if the thread cannot be started.
    pub fn start_hotplug(&mut self, source: Box<dyn HotplugSource>) -> Result<(), InitError> {
        self.listener = None;
        let shared = self.shared.clone();
        let listener = HotplugListener::spawn(source, move || shared.handle_hotplug())
            .map_err(InitError::Spawn)?;
        self.listener = Some(listener);
        Ok(())
    }

    /// Re-probes every connector, rebinds or tears down the displays whose
    /// connection changed, and notifies the hotplug callback.
    pub fn handle_hotplug(&self) {
        self.shared.handle_hotplug();
    }

    /// Installs a sink for structured trace events.
    pub fn set_trace_sink(&self, sink: Option<Box<dyn TraceSink + Send>>) {
        self.shared.state.lock().trace = sink;
    }

    /// All display numbers, primary first.
    #[must_use]
    pub fn display_ids(&self) -> Vec<DisplayId> {
        self.shared.state.lock().displays.keys().copied().collect()
    }

    fn with_display<R>(
        &self,
        display: DisplayId,
        f: impl FnOnce(&mut HwcDisplay, &mut DisplayCtx<'_>) -> Result<R, ScanoutError>,
    ) -> Result<R, ScanoutError> {
        let mut guard = self.shared.state.lock();
        let (displays, mut ctx) = guard.split(&*self.shared.describer);
        let display = displays
            .get_mut(&display)
            .ok_or(ScanoutError::BadHandle(HandleKind::Display))?;
        f(display, &mut ctx)
    }

    // -----------------------------------------------------------------------
    // Callbacks
    // -----------------------------------------------------------------------

    /// Registers the hotplug handler and immediately reports every display
    /// that currently has a pipeline as connected.
    pub fn register_hotplug_callback(&self, callback: Option<HotplugCallback>) {
        debug!("hotplug callback {}", if callback.is_some() { "set" } else { "cleared" });
        self.shared.callbacks.set_hotplug(callback.clone());
        let Some(callback) = callback else {
            return;
        };
        let bound: Vec<DisplayId> = {
            let state = self.shared.state.lock();
            state
                .displays
                .values()
                .filter(|d| d.is_bound())
                .map(HwcDisplay::id)
                .collect()
        };
        for display in bound {
            callback(display, true);
        }
    }

    /// Registers the vsync handler.
    pub fn register_vsync_callback(&self, callback: Option<VsyncCallback>) {
        debug!("vsync callback {}", if callback.is_some() { "set" } else { "cleared" });
        self.shared.callbacks.set_vsync(callback);
    }

    /// Registers the refresh handler.
    pub fn register_refresh_callback(&self, callback: Option<RefreshCallback>) {
        debug!("refresh callback {}", if callback.is_some() { "set" } else { "cleared" });
        self.shared.callbacks.set_refresh(callback);
    }

    // -----------------------------------------------------------------------
    // Layers
    // -----------------------------------------------------------------------

    /// Creates a layer. Handles are never reused.
    pub fn create_layer(&self, display: DisplayId) -> Result<LayerId, ScanoutError> {
        self.with_display(display, |d, _| Ok(d.create_layer()))
    }

    /// Destroys a layer.
    pub fn destroy_layer(&self, display: DisplayId, layer: LayerId) -> Result<(), ScanoutError> {
        self.with_display(display, |d, _| d.destroy_layer(layer))
    }

    /// Sets the buffer a layer shows.
    pub fn set_layer_buffer(
        &self,
        display: DisplayId,
        layer: LayerId,
        buffer: Option<BufferHandle>,
    ) -> Result<(), ScanoutError> {
        self.with_display(display, |d, _| d.layers_mut().set_buffer(layer, buffer))
    }

    /// Sets the part of the buffer a layer shows, in buffer pixels.
    pub fn set_layer_source_crop(
        &self,
        display: DisplayId,
        layer: LayerId,
        crop: Rect,
    ) -> Result<(), ScanoutError> {
        self.with_display(display, |d, _| d.layers_mut().set_source_crop(layer, crop))
    }

    /// Sets where a layer lands on screen.
    pub fn set_layer_display_frame(
        &self,
        display: DisplayId,
        layer: LayerId,
        frame: Rect,
    ) -> Result<(), ScanoutError> {
        self.with_display(display, |d, _| d.layers_mut().set_display_frame(layer, frame))
    }

    /// Sets a layer's blend mode.
    pub fn set_layer_blend_mode(
        &self,
        display: DisplayId,
        layer: LayerId,
        blend: BlendMode,
    ) -> Result<(), ScanoutError> {
        self.with_display(display, |d, _| d.layers_mut().set_blend_mode(layer, blend))
    }

    /// Sets a layer's plane alpha in `0.0..=1.0`.
    pub fn set_layer_plane_alpha(
        &self,
        display: DisplayId,
        layer: LayerId,
        alpha: f32,
    ) -> Result<(), ScanoutError> {
        self.with_display(display, |d, _| d.layers_mut().set_alpha(layer, alpha))
    }

    /// Sets a layer's stacking position. Larger is closer to the viewer.
    pub fn set_layer_z_order(
        &self,
        display: DisplayId,
        layer: LayerId,
        z_order: u32,
    ) -> Result<(), ScanoutError> {
        self.with_display(display, |d, _| d.layers_mut().set_z_order(layer, z_order))
    }

    /// Sets a layer's dataspace.
    pub fn set_layer_dataspace(
        &self,
        display: DisplayId,
        layer: LayerId,
        dataspace: Dataspace,
    ) -> Result<(), ScanoutError> {
        self.with_display(display, |d, _| d.layers_mut().set_dataspace(layer, dataspace))
    }

    /// Sets the composition type the consumer asks for.
    pub fn set_layer_composition_type(
        &self,
        display: DisplayId,
        layer: LayerId,
        ty: CompositionType,
    ) -> Result<(), ScanoutError> {
        self.with_display(display, |d, _| d.layers_mut().set_requested_type(layer, ty))
    }

    /// Sets the buffer the consumer rendered client layers into.
    pub fn set_client_target(
        &self,
        display: DisplayId,
        buffer: Option<BufferHandle>,
        dataspace: Dataspace,
    ) -> Result<(), ScanoutError> {
        self.with_display(display, |d, ctx| {
            d.set_client_target(ctx.describer, buffer, dataspace)
        })
    }

    // -----------------------------------------------------------------------
    // Frame
    // -----------------------------------------------------------------------

    /// Decides device or client composition for every layer.
    pub fn validate_display(&self, display: DisplayId) -> Result<ValidateOutcome, ScanoutError> {
        self.with_display(display, HwcDisplay::validate)
    }

    /// Layers whose validated type differs from the requested one.
    pub fn get_changed_composition_types(
        &self,
        display: DisplayId,
    ) -> Result<Vec<(LayerId, CompositionType)>, ScanoutError> {
        self.with_display(display, |d, _| Ok(d.get_changed_composition_types()))
    }

    /// Adopts the validated types.
    pub fn accept_display_changes(&self, display: DisplayId) -> Result<(), ScanoutError> {
        self.with_display(display, |d, _| {
            d.accept_display_changes();
            Ok(())
        })
    }

    /// Commits the current frame. Returns a fence that signals when it is on
    /// screen, or `None` when there was nothing to show.
    pub fn present_display(&self, display: DisplayId) -> Result<Option<OwnedFd>, ScanoutError> {
        self.with_display(display, HwcDisplay::present)
    }

    /// Per-layer fences signalling when the previous frame's buffers are
    /// free.
    pub fn get_release_fences(
        &self,
        display: DisplayId,
    ) -> Result<Vec<(LayerId, OwnedFd)>, ScanoutError> {
        self.with_display(display, |d, _| Ok(d.get_release_fences()))
    }

    // -----------------------------------------------------------------------
    // Configs
    // -----------------------------------------------------------------------

    /// Ids of the display's configs.
    pub fn get_display_configs(&self, display: DisplayId) -> Result<Vec<u32>, ScanoutError> {
        self.with_display(display, |d, ctx| Ok(d.get_display_configs(ctx.resources)))
    }

    /// The active config.
    pub fn get_active_config(&self, display: DisplayId) -> Result<u32, ScanoutError> {
        self.with_display(display, |d, _| d.get_active_config())
    }

    /// Switches to `config` with the next presented frame.
    pub fn set_active_config(&self, display: DisplayId, config: u32) -> Result<(), ScanoutError> {
        self.with_display(display, |d, _| d.set_active_config(config))
    }

    /// One attribute of a config.
    pub fn get_display_attribute(
        &self,
        display: DisplayId,
        config: u32,
        attribute: DisplayAttribute,
    ) -> Result<i32, ScanoutError> {
        self.with_display(display, |d, ctx| {
            d.get_display_attribute(ctx.resources, config, attribute)
        })
    }

    /// Current vsync period.
    pub fn get_display_vsync_period(&self, display: DisplayId) -> Result<Duration, ScanoutError> {
        self.with_display(display, |d, _| Ok(d.vsync_period()))
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// `display-<connector id>`.
    pub fn get_display_name(&self, display: DisplayId) -> Result<String, ScanoutError> {
        self.with_display(display, |d, _| Ok(d.name()))
    }

    /// Port number and EDID.
    pub fn get_display_identification_data(
        &self,
        display: DisplayId,
    ) -> Result<(u8, Vec<u8>), ScanoutError> {
        self.with_display(display, |d, ctx| d.identification_data(ctx.resources))
    }

    /// Internal panel or external port.
    pub fn get_display_connection_type(
        &self,
        display: DisplayId,
    ) -> Result<ConnectionType, ScanoutError> {
        self.with_display(display, |d, ctx| d.connection_type(ctx.resources))
    }

    // -----------------------------------------------------------------------
    // Color
    // -----------------------------------------------------------------------

    /// Supported color modes.
    pub fn get_color_modes(&self, display: DisplayId) -> Result<Vec<ColorMode>, ScanoutError> {
        self.with_display(display, |_, _| Ok(vec![ColorMode::NATIVE]))
    }

    /// Selects a color mode.
    pub fn set_color_mode(&self, display: DisplayId, mode: ColorMode) -> Result<(), ScanoutError> {
        self.with_display(display, |d, _| d.set_color_mode(mode))
    }

    /// Sets the color transform. [`ColorTransformHint::ARBITRARY_MATRIX`]
    /// requires `matrix`.
    pub fn set_color_transform(
        &self,
        display: DisplayId,
        matrix: Option<&[f32; 16]>,
        hint: ColorTransformHint,
    ) -> Result<(), ScanoutError> {
        self.with_display(display, |d, _| d.set_color_transform(matrix, hint))
    }

    /// Render intents of a color mode.
    pub fn get_render_intents(
        &self,
        display: DisplayId,
        mode: ColorMode,
    ) -> Result<Vec<RenderIntent>, ScanoutError> {
        self.with_display(display, |_, _| {
            if mode == ColorMode::NATIVE {
                Ok(vec![RenderIntent::COLORIMETRIC])
            } else {
                Err(ScanoutError::BadParameter)
            }
        })
    }

    /// Checks whether a client target of this size and dataspace can be
    /// scanned out. The pixel format is not checked.
    pub fn get_client_target_support(
        &self,
        display: DisplayId,
        width: u32,
        height: u32,
        _format: u32,
        dataspace: Dataspace,
    ) -> Result<(), ScanoutError> {
        self.with_display(display, |d, ctx| {
            d.get_client_target_support(ctx.resources, width, height, dataspace)
        })
    }

    // -----------------------------------------------------------------------
    // Power, vsync, flattening
    // -----------------------------------------------------------------------

    /// Changes the power state.
    pub fn set_power_mode(&self, display: DisplayId, mode: PowerMode) -> Result<(), ScanoutError> {
        self.with_display(display, |d, ctx| d.set_power_mode(ctx, mode))
    }

    /// Starts or stops vsync delivery.
    pub fn set_vsync_enabled(&self, display: DisplayId, enabled: bool) -> Result<(), ScanoutError> {
        self.with_display(display, |d, _| {
            d.set_vsync_enabled(enabled);
            Ok(())
        })
    }

    /// Applies a flattening decision made outside the composer.
    pub fn set_flattening(
        &self,
        display: DisplayId,
        request: FlatteningRequest,
    ) -> Result<(), ScanoutError> {
        self.with_display(display, |d, ctx| {
            d.set_flattening(request, &mut ctx.tracer);
            Ok(())
        })
    }

    /// Human-readable state of every display.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut state = self.shared.state.lock();
        state.displays.values_mut().map(HwcDisplay::dump).collect()
    }

    // -----------------------------------------------------------------------
    // Unsupported
    // -----------------------------------------------------------------------

    /// Virtual displays are not supported.
    pub fn create_virtual_display(&self, width: u32, height: u32) -> Result<DisplayId, ScanoutError> {
        _ = (width, height);
        Err(ScanoutError::Unsupported(Feature::VirtualDisplay))
    }

    /// Virtual displays are not supported.
    pub fn destroy_virtual_display(&self, display: DisplayId) -> Result<(), ScanoutError> {
        _ = display;
        Err(ScanoutError::Unsupported(Feature::VirtualDisplay))
    }

    /// Always zero.
    #[must_use]
    pub fn get_max_virtual_display_count(&self) -> u32 {
        0
    }

    /// Writeback output buffers are not supported.
    pub fn set_output_buffer(
        &self,
        display: DisplayId,
        buffer: BufferHandle,
    ) -> Result<(), ScanoutError> {
        _ = buffer;
        self.with_display(display, |_, _| {
            Err(ScanoutError::Unsupported(Feature::VirtualDisplay))
        })
    }

    /// Always `false`.
    pub fn get_doze_support(&self, display: DisplayId) -> Result<bool, ScanoutError> {
        self.with_display(display, |_, _| Ok(false))
    }

    /// Always empty.
    pub fn get_hdr_capabilities(&self, display: DisplayId) -> Result<HdrCapabilities, ScanoutError> {
        self.with_display(display, |_, _| Ok(HdrCapabilities::default()))
    }
}
