//! FFI bindings for mobile platforms (iOS/Android).
//!
//! Two independent surfaces:
//! - `fog_*`: the sampler. The host supplies its location service and the
//!   transport to the renderer as callback interfaces; every call runs on a
//!   process-wide tokio runtime and blocks until handled, so calls from one
//!   host thread are processed in order.
//! - `overlay_*`: a native renderer. Holds a [`RevealOverlay`] with a
//!   Web-Mercator projection fed from the host map's camera.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fogcore::{
    FogError, FrameOutcome, GeoPoint, GestureEvent, MercatorProjection, RendererMessage,
    RevealOverlay, Viewport, ViewportEvent, encode_message,
};
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;

use crate::bridge::Transport;
use crate::init_logging;
use crate::sampler::{Sampler, SamplerConfig, SamplerStatus};
use crate::sampling::{
    BackgroundLocation, LocationAccuracy, LocationService, PermissionStatus, PositionFix,
    UpdateOptions,
};
use crate::store::SqliteStore;

// ============================================================================
// Callback Interfaces
// ============================================================================

/// Carries encoded messages to the renderer (e.g. a WebView's postMessage).
#[uniffi::export(callback_interface)]
pub trait RendererTransport: Send + Sync {
    /// Returns false if the message could not be delivered.
    fn post_message(&self, payload: String) -> bool;
}

/// The platform location service.
///
/// Foreground fixes are pushed back with [`fog_on_position`] between
/// `start_watch` and `stop_watch`; background batches with
/// [`fog_on_background_locations`].
#[uniffi::export(callback_interface)]
pub trait LocationHost: Send + Sync {
    fn request_foreground_permission(&self) -> bool;
    fn request_background_permission(&self) -> bool;
    fn start_watch(&self, options: FfiUpdateOptions) -> bool;
    fn stop_watch(&self);
    fn has_started_background_updates(&self) -> bool;
    fn start_background_updates(&self, options: FfiUpdateOptions) -> bool;
    fn stop_background_updates(&self) -> bool;
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPositionFix {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: Option<f64>,
    /// Milliseconds since epoch
    pub ts: i64,
}

impl From<FfiPositionFix> for PositionFix {
    fn from(f: FfiPositionFix) -> Self {
        PositionFix {
            lat: f.lat,
            lng: f.lng,
            accuracy: f.accuracy,
            ts: f.ts,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBackgroundLocation {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub ts: Option<i64>,
}

impl From<FfiBackgroundLocation> for BackgroundLocation {
    fn from(l: FfiBackgroundLocation) -> Self {
        BackgroundLocation {
            lat: l.lat,
            lng: l.lng,
            ts: l.ts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiLocationAccuracy {
    Lowest,
    Low,
    Balanced,
    High,
    Highest,
}

impl From<LocationAccuracy> for FfiLocationAccuracy {
    fn from(a: LocationAccuracy) -> Self {
        match a {
            LocationAccuracy::Lowest => FfiLocationAccuracy::Lowest,
            LocationAccuracy::Low => FfiLocationAccuracy::Low,
            LocationAccuracy::Balanced => FfiLocationAccuracy::Balanced,
            LocationAccuracy::High => FfiLocationAccuracy::High,
            LocationAccuracy::Highest => FfiLocationAccuracy::Highest,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUpdateOptions {
    pub accuracy: FfiLocationAccuracy,
    pub time_interval_ms: u64,
    pub distance_interval_m: f64,
    pub shows_background_indicator: bool,
    pub pauses_automatically: bool,
    pub notification_title: String,
    pub notification_body: String,
}

impl From<&UpdateOptions> for FfiUpdateOptions {
    fn from(o: &UpdateOptions) -> Self {
        Self {
            accuracy: o.accuracy.into(),
            time_interval_ms: o.time_interval_ms,
            distance_interval_m: o.distance_interval_m,
            shows_background_indicator: o.shows_background_indicator,
            pauses_automatically: o.pauses_automatically,
            notification_title: o.notification_title.clone(),
            notification_body: o.notification_body.clone(),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSamplerStatus {
    pub recording: bool,
    pub renderer_ready: bool,
    pub foreground_attached: bool,
    pub replaying: bool,
    pub history_len: u32,
    pub watermark: i64,
}

impl From<SamplerStatus> for FfiSamplerStatus {
    fn from(s: SamplerStatus) -> Self {
        Self {
            recording: s.recording,
            renderer_ready: s.renderer_ready,
            foreground_attached: s.foreground_attached,
            replaying: s.replaying,
            history_len: u32::try_from(s.history_len).unwrap_or(u32::MAX),
            watermark: s.watermark,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiViewport {
    pub center_lat: f64,
    pub center_lng: f64,
    pub zoom: f64,
    /// Logical pixels
    pub width: f64,
    pub height: f64,
}

impl From<FfiViewport> for Viewport {
    fn from(v: FfiViewport) -> Self {
        Viewport::new(GeoPoint::new(v.center_lat, v.center_lng), v.zoom, v.width, v.height)
    }
}

#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiViewportEvent {
    CenterChanged,
    ZoomChanged,
    BoundsChanged,
    Drag,
    Idle,
    Resize,
}

impl From<FfiViewportEvent> for ViewportEvent {
    fn from(e: FfiViewportEvent) -> Self {
        match e {
            FfiViewportEvent::CenterChanged => ViewportEvent::CenterChanged,
            FfiViewportEvent::ZoomChanged => ViewportEvent::ZoomChanged,
            FfiViewportEvent::BoundsChanged => ViewportEvent::BoundsChanged,
            FfiViewportEvent::Drag => ViewportEvent::Drag,
            FfiViewportEvent::Idle => ViewportEvent::Idle,
            FfiViewportEvent::Resize => ViewportEvent::Resize,
        }
    }
}

#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiGesture {
    Start,
    Move,
    End,
}

impl From<FfiGesture> for GestureEvent {
    fn from(g: FfiGesture) -> Self {
        match g {
            FfiGesture::Start => GestureEvent::Start,
            FfiGesture::Move => GestureEvent::Move,
            FfiGesture::End => GestureEvent::End,
        }
    }
}

/// A drawn fog frame, RGBA8 in device pixels.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFrame {
    pub width: u32,
    pub height: u32,
    pub cluster_count: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOverlayStatus {
    pub receiving: bool,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub reveal_count: u32,
    pub recording: bool,
    pub record_pending: bool,
}

// ============================================================================
// Host adapters
// ============================================================================

struct HostTransport {
    host: Box<dyn RendererTransport>,
}

impl Transport for HostTransport {
    fn post(&self, payload: &str) -> fogcore::Result<()> {
        if self.host.post_message(payload.to_string()) {
            Ok(())
        } else {
            Err(FogError::Transport {
                message: "host refused message".to_string(),
            })
        }
    }
}

struct HostLocation {
    host: Box<dyn LocationHost>,
    fixes: Mutex<Option<mpsc::UnboundedSender<PositionFix>>>,
}

impl HostLocation {
    fn new(host: Box<dyn LocationHost>) -> Self {
        Self {
            host,
            fixes: Mutex::new(None),
        }
    }

    /// Forward a fix to the active watcher. False when nobody is watching.
    fn push_fix(&self, fix: PositionFix) -> bool {
        let Ok(guard) = self.fixes.lock() else {
            return false;
        };
        guard.as_ref().is_some_and(|tx| tx.send(fix).is_ok())
    }
}

fn permission(granted: bool) -> PermissionStatus {
    if granted {
        PermissionStatus::Granted
    } else {
        PermissionStatus::Denied
    }
}

#[async_trait]
impl LocationService for HostLocation {
    async fn request_foreground_permission(&self) -> PermissionStatus {
        permission(self.host.request_foreground_permission())
    }

    async fn request_background_permission(&self) -> PermissionStatus {
        permission(self.host.request_background_permission())
    }

    async fn watch_position(&self, options: &UpdateOptions) -> fogcore::Result<mpsc::UnboundedReceiver<PositionFix>> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut slot) = self.fixes.lock() {
            *slot = Some(tx);
        }
        if !self.host.start_watch(options.into()) {
            if let Ok(mut slot) = self.fixes.lock() {
                *slot = None;
            }
            return Err(FogError::Location {
                message: "host could not start watching".to_string(),
            });
        }
        Ok(rx)
    }

    async fn clear_watch(&self) {
        if let Ok(mut slot) = self.fixes.lock() {
            *slot = None;
        }
        self.host.stop_watch();
    }

    async fn has_started_background_updates(&self) -> bool {
        self.host.has_started_background_updates()
    }

    async fn start_background_updates(&self, options: &UpdateOptions) -> fogcore::Result<()> {
        if self.host.start_background_updates(options.into()) {
            Ok(())
        } else {
            Err(FogError::Location {
                message: "host could not start background updates".to_string(),
            })
        }
    }

    async fn stop_background_updates(&self) -> fogcore::Result<()> {
        if self.host.stop_background_updates() {
            Ok(())
        } else {
            Err(FogError::Location {
                message: "host could not stop background updates".to_string(),
            })
        }
    }
}

// ============================================================================
// Global state
// ============================================================================

static RUNTIME: Lazy<Option<Runtime>> = Lazy::new(|| {
    match Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("fogrs")
        .enable_time()
        .build()
    {
        Ok(rt) => Some(rt),
        Err(e) => {
            error!("[FFI] Failed to start runtime: {}", e);
            None
        }
    }
});

struct SamplerInstance {
    sampler: Arc<Sampler>,
    location: Arc<HostLocation>,
}

/// Global sampler instance.
static SAMPLER: Lazy<Mutex<Option<SamplerInstance>>> = Lazy::new(|| Mutex::new(None));

fn current_sampler() -> Option<(Arc<Sampler>, Arc<HostLocation>)> {
    let guard = SAMPLER.lock().ok()?;
    guard
        .as_ref()
        .map(|i| (Arc::clone(&i.sampler), Arc::clone(&i.location)))
}

/// Run `f` against the sampler on the runtime, blocking until it finishes.
fn run_on_sampler<F, Fut, R>(name: &str, f: F) -> Option<R>
where
    F: FnOnce(Arc<Sampler>) -> Fut,
    Fut: std::future::Future<Output = R>,
{
    init_logging();
    let Some(rt) = RUNTIME.as_ref() else {
        warn!("[FFI] {}: runtime unavailable", name);
        return None;
    };
    let Some((sampler, _)) = current_sampler() else {
        debug!("[FFI] {}: sampler not initialized", name);
        return None;
    };
    Some(rt.block_on(f(sampler)))
}

struct OverlayInstance {
    overlay: RevealOverlay,
    projection: Arc<MercatorProjection>,
}

static OVERLAY: Lazy<Mutex<Option<OverlayInstance>>> = Lazy::new(|| Mutex::new(None));

fn with_overlay<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut OverlayInstance) -> R,
{
    let mut guard = OVERLAY.lock().ok()?;
    guard.as_mut().map(f)
}

// ============================================================================
// Sampler exports
// ============================================================================

/// Initialize the sampler with a database path. Call once at app start;
/// restores the recording flag and resumes background capture.
#[uniffi::export]
pub fn fog_init(db_path: String, location: Box<dyn LocationHost>, transport: Box<dyn RendererTransport>) -> bool {
    init_logging();
    info!("[FFI] fog_init with db: {}", db_path);

    let Some(rt) = RUNTIME.as_ref() else {
        return false;
    };
    let store = match SqliteStore::open(&db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("[FFI] Failed to open store: {}", e);
            return false;
        }
    };

    let location = Arc::new(HostLocation::new(location));
    let sampler = Arc::new(Sampler::new(
        store,
        location.clone(),
        Arc::new(HostTransport { host: transport }),
        SamplerConfig::default(),
    ));
    rt.block_on(sampler.restore());

    let previous = match SAMPLER.lock() {
        Ok(mut guard) => guard.replace(SamplerInstance { sampler, location }),
        Err(_) => return false,
    };
    if let Some(previous) = previous {
        rt.block_on(previous.sampler.on_renderer_disconnected());
    }
    true
}

#[uniffi::export]
pub fn fog_is_initialized() -> bool {
    current_sampler().is_some()
}

/// A message from the renderer.
#[uniffi::export]
pub fn fog_handle_renderer_message(payload: String) {
    run_on_sampler("handle_renderer_message", |s| async move {
        s.handle_renderer_payload(payload.as_bytes()).await
    });
}

/// The renderer finished loading (fallback readiness signal).
#[uniffi::export]
pub fn fog_on_renderer_loaded() {
    run_on_sampler("on_renderer_loaded", |s| async move { s.on_renderer_loaded().await });
}

#[uniffi::export]
pub fn fog_on_renderer_disconnected() {
    run_on_sampler("on_renderer_disconnected", |s| async move {
        s.on_renderer_disconnected().await
    });
}

/// A foreground fix from the platform watcher.
#[uniffi::export]
pub fn fog_on_position(fix: FfiPositionFix) -> bool {
    init_logging();
    let Some((_, location)) = current_sampler() else {
        return false;
    };
    let delivered = location.push_fix(fix.into());
    if !delivered {
        debug!("[FFI] Position fix with no active watcher");
    }
    delivered
}

/// A batch from the background location task. Returns the number admitted.
#[uniffi::export]
pub fn fog_on_background_locations(locations: Vec<FfiBackgroundLocation>) -> u32 {
    let locations: Vec<BackgroundLocation> = locations.into_iter().map(Into::into).collect();
    run_on_sampler("on_background_locations", |s| async move {
        u32::try_from(s.on_background_batch(&locations).await).unwrap_or(u32::MAX)
    })
    .unwrap_or(0)
}

#[uniffi::export]
pub fn fog_clear_history() {
    run_on_sampler("clear_history", |s| async move { s.clear_history().await });
}

#[uniffi::export]
pub fn fog_resync_renderer() {
    run_on_sampler("resync_renderer", |s| async move { s.resync_renderer().await });
}

#[uniffi::export]
pub fn fog_status() -> Option<FfiSamplerStatus> {
    run_on_sampler("status", |s| async move { s.status().await.into() })
}

/// Default location options, for hosts that configure their own watcher.
#[uniffi::export]
pub fn fog_default_update_options() -> FfiUpdateOptions {
    (&UpdateOptions::default()).into()
}

/// Disconnect and drop the sampler.
#[uniffi::export]
pub fn fog_shutdown() {
    init_logging();
    let instance = SAMPLER.lock().ok().and_then(|mut guard| guard.take());
    if let (Some(instance), Some(rt)) = (instance, RUNTIME.as_ref()) {
        rt.block_on(instance.sampler.on_renderer_disconnected());
        info!("[FFI] Sampler shut down");
    }
}

// ============================================================================
// Overlay exports
// ============================================================================

/// Create the native overlay. Returns the `renderer-ready` payload to send
/// to the sampler once the host is ready to receive messages.
#[uniffi::export]
pub fn overlay_init(device_pixel_ratio: f64) -> String {
    init_logging();
    let projection = Arc::new(MercatorProjection::new());
    let mut overlay = RevealOverlay::default();
    overlay.set_device_pixel_ratio(device_pixel_ratio);
    overlay.register_projection(projection.clone());

    if let Ok(mut guard) = OVERLAY.lock() {
        *guard = Some(OverlayInstance {
            overlay,
            projection,
        });
    }
    info!("[FFI] Overlay initialized (dpr {})", device_pixel_ratio);
    encode_message(&RendererMessage::RendererReady).unwrap_or_default()
}

/// A sampler message. Returns true when a frame should be scheduled.
#[uniffi::export]
pub fn overlay_handle_message(payload: String) -> bool {
    with_overlay(|o| o.overlay.handle_payload(payload.as_bytes())).unwrap_or(false)
}

/// The map camera moved. Returns true when a frame should be scheduled.
#[uniffi::export]
pub fn overlay_set_viewport(viewport: FfiViewport, event: FfiViewportEvent) -> bool {
    with_overlay(|o| {
        o.projection.set_viewport(viewport.into());
        o.overlay.on_viewport_changed(event.into())
    })
    .unwrap_or(false)
}

#[uniffi::export]
pub fn overlay_on_gesture(gesture: FfiGesture) -> bool {
    with_overlay(|o| o.overlay.on_gesture(gesture.into())).unwrap_or(false)
}

#[uniffi::export]
pub fn overlay_set_device_pixel_ratio(ratio: f64) -> bool {
    with_overlay(|o| o.overlay.set_device_pixel_ratio(ratio)).unwrap_or(false)
}

/// Flip the record toggle. Returns the payload to send to the sampler.
#[uniffi::export]
pub fn overlay_toggle_record() -> Option<String> {
    let message = with_overlay(|o| o.overlay.request_record_toggle())?;
    match encode_message(&message) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!("[FFI] Failed to encode record toggle: {}", e);
            None
        }
    }
}

/// Reveal the current map center. Returns true when a frame should be
/// scheduled.
#[uniffi::export]
pub fn overlay_add_reveal_at_center() -> bool {
    with_overlay(|o| match o.overlay.add_reveal_at_center() {
        Ok(schedule) => schedule,
        Err(e) => {
            debug!("[FFI] Reveal at center skipped: {}", e);
            false
        }
    })
    .unwrap_or(false)
}

/// Frame callback. Returns the new frame, or None when nothing was drawn.
#[uniffi::export]
pub fn overlay_render_frame() -> Option<FfiFrame> {
    with_overlay(|o| match o.overlay.render_frame() {
        FrameOutcome::Drawn { clusters, .. } => {
            let surface = o.overlay.mask().surface();
            Some(FfiFrame {
                width: surface.width(),
                height: surface.height(),
                cluster_count: u32::try_from(clusters).unwrap_or(u32::MAX),
                rgba: surface.as_raw().clone(),
            })
        }
        FrameOutcome::Idle | FrameOutcome::Skipped => None,
    })
    .flatten()
}

/// The last drawn frame as PNG.
#[uniffi::export]
pub fn overlay_snapshot_png() -> Option<Vec<u8>> {
    with_overlay(|o| o.overlay.mask().encode_png())?
        .map_err(|e| warn!("[FFI] Snapshot failed: {}", e))
        .ok()
}

#[uniffi::export]
pub fn overlay_status() -> Option<FfiOverlayStatus> {
    with_overlay(|o| {
        let status = o.overlay.status();
        FfiOverlayStatus {
            receiving: status.receiving,
            lat: status.position.map(|p| p.latitude),
            lng: status.position.map(|p| p.longitude),
            reveal_count: u32::try_from(status.reveal_count).unwrap_or(u32::MAX),
            recording: status.recording,
            record_pending: status.record_pending,
        }
    })
}

#[uniffi::export]
pub fn overlay_destroy() {
    if let Ok(mut guard) = OVERLAY.lock() {
        if let Some(instance) = guard.as_mut() {
            instance.overlay.unregister_projection();
        }
        *guard = None;
    }
}
