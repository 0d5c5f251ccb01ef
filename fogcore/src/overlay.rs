//! Renderer-side overlay state.
//!
//! `RevealOverlay` owns everything the rendering side needs: the point set
//! built from sampler messages, the live position, locally added reveals, the
//! optimistic record toggle, the interaction state, and the frame pipeline
//! (scheduler -> clusterer -> mask).
//!
//! Every mutating call returns `true` when the host must schedule one frame
//! callback, which then calls [`RevealOverlay::render_frame`].

use std::sync::Arc;

use log::{debug, info};

use crate::cluster::{ClusterConfig, ProjectionProvider, RevealClusterer, Viewport};
use crate::mask::{MaskConfig, MaskRenderer};
use crate::protocol::{decode_sampler_message, RendererMessage, SamplerMessage};
use crate::scheduler::{DirtyReason, FrameScheduler};
use crate::{GeoPoint, OptionExt, Result, TrackPoint};

/// Map widget change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportEvent {
    CenterChanged,
    ZoomChanged,
    BoundsChanged,
    Drag,
    Idle,
    Resize,
}

/// Touch/pointer gesture phases on the map container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureEvent {
    Start,
    Move,
    End,
}

/// Two-phase record toggle: the renderer shows its own guess until the
/// sampler's `record-status` arrives, and the confirmation always wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordToggle {
    Confirmed(bool),
    Requested { local_guess: bool, confirmed: bool },
}

impl RecordToggle {
    /// State shown to the user.
    pub fn displayed(&self) -> bool {
        match *self {
            RecordToggle::Confirmed(active) => active,
            RecordToggle::Requested { local_guess, .. } => local_guess,
        }
    }

    /// Last state confirmed by the sampler.
    pub fn confirmed(&self) -> bool {
        match *self {
            RecordToggle::Confirmed(active) => active,
            RecordToggle::Requested { confirmed, .. } => confirmed,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RecordToggle::Requested { .. })
    }
}

impl Default for RecordToggle {
    fn default() -> Self {
        RecordToggle::Confirmed(false)
    }
}

/// The last `live-position` received.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivePosition {
    pub position: GeoPoint,
    pub accuracy: Option<f64>,
    pub ts: i64,
}

/// Summary for a status badge.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStatus {
    /// A live position has been received
    pub receiving: bool,
    pub position: Option<GeoPoint>,
    /// Persisted + local reveal points (live position excluded)
    pub reveal_count: usize,
    /// Record toggle as displayed
    pub recording: bool,
    /// Waiting for the sampler to confirm a toggle
    pub record_pending: bool,
}

/// Result of a frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Nothing was dirty
    Idle,
    /// Projection not available yet; the next trigger retries
    Skipped,
    Drawn { clusters: usize, reallocated: bool },
}

pub struct RevealOverlay {
    history: Vec<TrackPoint>,
    live: Option<LivePosition>,
    manual: Vec<GeoPoint>,
    record: RecordToggle,
    interacting: bool,
    device_pixel_ratio: f64,
    projection: Option<Arc<dyn ProjectionProvider>>,
    clusterer: RevealClusterer,
    mask: MaskRenderer,
    scheduler: FrameScheduler,
}

impl Default for RevealOverlay {
    fn default() -> Self {
        Self::new(ClusterConfig::default(), MaskConfig::default())
    }
}

impl RevealOverlay {
    pub fn new(cluster_config: ClusterConfig, mask_config: MaskConfig) -> Self {
        Self {
            history: Vec::new(),
            live: None,
            manual: Vec::new(),
            record: RecordToggle::default(),
            interacting: false,
            device_pixel_ratio: 1.0,
            projection: None,
            clusterer: RevealClusterer::new(cluster_config),
            mask: MaskRenderer::new(mask_config),
            scheduler: FrameScheduler::new(),
        }
    }

    // ========================================================================
    // Host map wiring
    // ========================================================================

    /// Register the map widget's projection capability.
    pub fn register_projection(&mut self, provider: Arc<dyn ProjectionProvider>) -> bool {
        self.projection = Some(provider);
        self.scheduler.request(DirtyReason::ViewportChanged)
    }

    /// Drop the projection (map widget unmounted). Frames skip until a new one
    /// is registered.
    pub fn unregister_projection(&mut self) {
        self.projection = None;
    }

    /// Center, zoom, bounds, drag, idle or resize notification.
    pub fn on_viewport_changed(&mut self, _event: ViewportEvent) -> bool {
        self.scheduler.request(DirtyReason::ViewportChanged)
    }

    pub fn set_device_pixel_ratio(&mut self, ratio: f64) -> bool {
        if !(ratio > 0.0) || !ratio.is_finite() || ratio == self.device_pixel_ratio {
            return false;
        }
        self.device_pixel_ratio = ratio;
        self.scheduler.request(DirtyReason::SurfaceChanged)
    }

    /// Gesture start/end flip the interaction state (coarser clustering while
    /// moving); every phase schedules a redraw.
    pub fn on_gesture(&mut self, event: GestureEvent) -> bool {
        match event {
            GestureEvent::Start => self.interacting = true,
            GestureEvent::Move => {}
            GestureEvent::End => self.interacting = false,
        }
        self.scheduler.request(DirtyReason::InteractionChanged)
    }

    pub fn is_interacting(&self) -> bool {
        self.interacting
    }

    // ========================================================================
    // Sampler messages
    // ========================================================================

    /// Decode and apply a payload from the transport. Malformed payloads are
    /// dropped.
    pub fn handle_payload(&mut self, payload: &[u8]) -> bool {
        match decode_sampler_message(payload) {
            Ok(message) => self.apply_message(message),
            Err(e) => {
                debug!("[RevealOverlay] Dropping malformed message: {}", e);
                false
            }
        }
    }

    pub fn apply_message(&mut self, message: SamplerMessage) -> bool {
        match message {
            SamplerMessage::LivePosition {
                lat,
                lng,
                accuracy,
                ts,
            } => {
                let position = GeoPoint::new(lat, lng);
                if !position.is_valid() {
                    return false;
                }
                self.live = Some(LivePosition {
                    position,
                    accuracy,
                    ts,
                });
                self.scheduler.request(DirtyReason::PointsChanged)
            }
            SamplerMessage::PointsAdd { points } => {
                let before = self.history.len();
                self.history
                    .extend(points.into_iter().filter(TrackPoint::is_valid));
                if self.history.len() == before {
                    return false;
                }
                self.scheduler.request(DirtyReason::PointsChanged)
            }
            SamplerMessage::PointsSync { points } => {
                info!("[RevealOverlay] Point set replaced ({} points)", points.len());
                self.history = points.into_iter().filter(TrackPoint::is_valid).collect();
                self.scheduler.request(DirtyReason::PointsChanged)
            }
            SamplerMessage::PointsClear => {
                info!("[RevealOverlay] Point set cleared");
                self.history.clear();
                self.scheduler.request(DirtyReason::PointsChanged)
            }
            SamplerMessage::RecordStatus { active } => {
                self.record = RecordToggle::Confirmed(active);
                false
            }
        }
    }

    // ========================================================================
    // User actions
    // ========================================================================

    /// Flip the record toggle optimistically and return the request to send.
    pub fn request_record_toggle(&mut self) -> RendererMessage {
        let target = !self.record.displayed();
        self.record = RecordToggle::Requested {
            local_guess: target,
            confirmed: self.record.confirmed(),
        };
        if target {
            RendererMessage::RecordStart
        } else {
            RendererMessage::RecordStop
        }
    }

    pub fn record_toggle(&self) -> RecordToggle {
        self.record
    }

    /// Add a local reveal at the current map center. Not persisted.
    pub fn add_reveal_at_center(&mut self) -> Result<bool> {
        let (_, viewport) = self.current_viewport()?;
        self.manual.push(viewport.center);
        Ok(self.scheduler.request(DirtyReason::PointsChanged))
    }

    // ========================================================================
    // Frames
    // ========================================================================

    /// Everything to reveal: persisted history, live position, local reveals.
    pub fn reveal_points(&self) -> Vec<GeoPoint> {
        let mut points = Vec::with_capacity(self.history.len() + self.manual.len() + 1);
        if let Some(live) = &self.live {
            points.push(live.position);
        }
        points.extend(self.history.iter().map(TrackPoint::position));
        points.extend(self.manual.iter().copied());
        points
    }

    pub fn history(&self) -> &[TrackPoint] {
        &self.history
    }

    pub fn live_position(&self) -> Option<LivePosition> {
        self.live
    }

    fn current_viewport(&self) -> Result<(Arc<dyn ProjectionProvider>, Viewport)> {
        let provider = self.projection.clone().ok_or_projection_unavailable()?;
        let viewport = provider
            .viewport()
            .filter(Viewport::is_usable)
            .ok_or_projection_unavailable()?;
        Ok((provider, viewport))
    }

    /// Frame callback: draw if anything is dirty.
    pub fn render_frame(&mut self) -> FrameOutcome {
        if !self.scheduler.begin_frame() {
            return FrameOutcome::Idle;
        }

        let (provider, viewport) = match self.current_viewport() {
            Ok(v) => v,
            Err(e) => {
                debug!("[RevealOverlay] Skipping frame: {}", e);
                return FrameOutcome::Skipped;
            }
        };

        let reallocated =
            self.mask
                .ensure_surface(viewport.width, viewport.height, self.device_pixel_ratio);
        let points = self.reveal_points();
        let clusters = self
            .clusterer
            .cluster(&*provider, &viewport, &points, self.interacting);
        self.mask.draw(&clusters);

        FrameOutcome::Drawn {
            clusters: clusters.len(),
            reallocated,
        }
    }

    /// The most recently drawn frame.
    pub fn mask(&self) -> &MaskRenderer {
        &self.mask
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn status(&self) -> OverlayStatus {
        OverlayStatus {
            receiving: self.live.is_some(),
            position: self.live.map(|l| l.position),
            reveal_count: self.history.len() + self.manual.len(),
            recording: self.record.displayed(),
            record_pending: self.record.is_pending(),
        }
    }
}
