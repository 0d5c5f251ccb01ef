//! # Position sampling
//!
//! Two producers feed the same [`DedupStore`]:
//!
//! - **Foreground watcher**: attached while a renderer is connected. Every
//!   fix is forwarded as `live-position`; when recording, admitted points
//!   are pushed as `points-add` and the watermark advances.
//! - **Background capture**: batches delivered by the OS while the app may
//!   not be in front. Only consulted when the persisted flag is on, and
//!   never talks to the renderer; admitted points wait for replay.
//!
//! Within one producer points are admitted in sample order. Nothing orders
//! the two producers against each other.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use fogcore::{FogError, Result, SamplerMessage, TrackPoint};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::SyncBridge;
use crate::explore::ExploreFlag;
use crate::track::{DedupStore, ReplayCursor};

// ============================================================================
// Location service interface
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        self == PermissionStatus::Granted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationAccuracy {
    Lowest,
    Low,
    Balanced,
    High,
    Highest,
}

/// Options handed to the location service for both producers.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOptions {
    /// Default: Balanced
    pub accuracy: LocationAccuracy,
    /// Minimum time between updates. Default: 4000 ms
    pub time_interval_ms: u64,
    /// Minimum movement between updates. Default: 5 m
    pub distance_interval_m: f64,
    /// Show the OS background-location indicator. Default: true
    pub shows_background_indicator: bool,
    /// Let the OS pause updates when stationary. Default: false
    pub pauses_automatically: bool,
    /// Foreground-service notification (Android)
    pub notification_title: String,
    pub notification_body: String,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            accuracy: LocationAccuracy::Balanced,
            time_interval_ms: 4000,
            distance_interval_m: 5.0,
            shows_background_indicator: true,
            pauses_automatically: false,
            notification_title: "Exploring".to_string(),
            notification_body: "Recording your location".to_string(),
        }
    }
}

/// A foreground fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: Option<f64>,
    /// Capture time, ms since epoch
    pub ts: i64,
}

impl PositionFix {
    pub fn track_point(&self) -> TrackPoint {
        TrackPoint::new(self.lat, self.lng, self.ts)
    }
}

/// A location from a background batch. Platforms may omit any field.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BackgroundLocation {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub ts: Option<i64>,
}

impl BackgroundLocation {
    /// Skip locations without both coordinates; stamp missing times with
    /// `now_ms`.
    pub fn to_track_point(&self, now_ms: i64) -> Option<TrackPoint> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(TrackPoint::new(lat, lng, self.ts.unwrap_or(now_ms))),
            _ => None,
        }
    }
}

/// The OS location service.
///
/// The foreground subscription is a channel: the service pushes fixes into
/// the returned receiver until [`LocationService::clear_watch`].
#[async_trait]
pub trait LocationService: Send + Sync {
    async fn request_foreground_permission(&self) -> PermissionStatus;
    async fn request_background_permission(&self) -> PermissionStatus;

    async fn watch_position(&self, options: &UpdateOptions) -> Result<mpsc::UnboundedReceiver<PositionFix>>;
    async fn clear_watch(&self);

    async fn has_started_background_updates(&self) -> bool;
    async fn start_background_updates(&self, options: &UpdateOptions) -> Result<()>;
    async fn stop_background_updates(&self) -> Result<()>;
}

// ============================================================================
// SamplingSession
// ============================================================================

pub struct SamplingSession {
    location: Arc<dyn LocationService>,
    history: Arc<DedupStore>,
    cursor: Arc<ReplayCursor>,
    explore: Arc<ExploreFlag>,
    bridge: Arc<SyncBridge>,
    options: UpdateOptions,
    min_meters: f64,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl SamplingSession {
    pub fn new(
        location: Arc<dyn LocationService>,
        history: Arc<DedupStore>,
        cursor: Arc<ReplayCursor>,
        explore: Arc<ExploreFlag>,
        bridge: Arc<SyncBridge>,
        options: UpdateOptions,
        min_meters: f64,
    ) -> Self {
        Self {
            location,
            history,
            cursor,
            explore,
            bridge,
            options,
            min_meters,
            watcher: Mutex::new(None),
        }
    }

    /// Start background capture.
    ///
    /// Foreground permission is required. Background permission is
    /// requested but optional. Starting an already-started capture is a
    /// no-op.
    pub async fn start_recording(&self) -> Result<()> {
        if !self.location.request_foreground_permission().await.is_granted() {
            info!("[SamplingSession] Foreground permission denied, not recording");
            return Err(FogError::PermissionDenied {
                scope: "foreground".to_string(),
            });
        }
        if !self.location.request_background_permission().await.is_granted() {
            info!("[SamplingSession] Background permission denied, foreground only");
        }

        if self.location.has_started_background_updates().await {
            debug!("[SamplingSession] Background capture already running");
            return Ok(());
        }
        if let Err(e) = self.location.start_background_updates(&self.options).await {
            // Foreground recording still works
            warn!("[SamplingSession] Failed to start background capture: {}", e);
        } else {
            info!("[SamplingSession] Background capture started");
        }
        Ok(())
    }

    /// Stop background capture if it is running.
    pub async fn stop_recording(&self) {
        if !self.location.has_started_background_updates().await {
            return;
        }
        match self.location.stop_background_updates().await {
            Ok(()) => info!("[SamplingSession] Background capture stopped"),
            Err(e) => warn!("[SamplingSession] Failed to stop background capture: {}", e),
        }
    }

    /// Subscribe to foreground fixes. No-op if already attached.
    pub async fn attach_foreground(self: &Arc<Self>) -> Result<()> {
        if self.is_foreground_attached() {
            return Ok(());
        }
        if !self.location.request_foreground_permission().await.is_granted() {
            info!("[SamplingSession] Foreground permission denied, no live position");
            return Err(FogError::PermissionDenied {
                scope: "foreground".to_string(),
            });
        }

        let mut fixes = self.location.watch_position(&self.options).await?;
        let session = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(fix) = fixes.recv().await {
                session.on_foreground_fix(fix).await;
            }
            debug!("[SamplingSession] Foreground stream ended");
        });

        match self.watcher.lock() {
            Ok(mut slot) => {
                if let Some(previous) = slot.replace(handle) {
                    previous.abort();
                }
            }
            Err(_) => handle.abort(),
        }
        info!("[SamplingSession] Foreground watcher attached");
        Ok(())
    }

    /// Stop the foreground watcher and release the subscription.
    pub async fn detach_foreground(&self) {
        let handle = self.watcher.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            handle.abort();
            self.location.clear_watch().await;
            info!("[SamplingSession] Foreground watcher detached");
        }
    }

    pub fn is_foreground_attached(&self) -> bool {
        self.watcher
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Handle one foreground fix.
    pub async fn on_foreground_fix(&self, fix: PositionFix) {
        self.bridge.send(SamplerMessage::LivePosition {
            lat: fix.lat,
            lng: fix.lng,
            accuracy: fix.accuracy,
            ts: fix.ts,
        });

        if !self.explore.is_active() {
            return;
        }
        if let Some(point) = self.history.add_if_far_enough(fix.track_point(), self.min_meters).await {
            self.bridge.send(SamplerMessage::PointsAdd {
                points: vec![point],
            });
            self.cursor.advance_watermark(point.ts).await;
        }
    }

    /// Handle a background batch. Returns the number of admitted points.
    pub async fn on_background_batch(&self, locations: &[BackgroundLocation]) -> usize {
        if locations.is_empty() || !self.explore.load().await {
            return 0;
        }

        let now_ms = Utc::now().timestamp_millis();
        let mut admitted = 0;
        for location in locations {
            let Some(point) = location.to_track_point(now_ms) else {
                debug!("[SamplingSession] Skipping location without coordinates");
                continue;
            };
            if self.history.add_if_far_enough(point, self.min_meters).await.is_some() {
                admitted += 1;
            }
        }
        debug!(
            "[SamplingSession] Background batch: {} of {} admitted",
            admitted,
            locations.len()
        );
        admitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_location_fallbacks() {
        let full = BackgroundLocation {
            lat: Some(37.5),
            lng: Some(127.0),
            ts: Some(10),
        };
        assert_eq!(full.to_track_point(99), Some(TrackPoint::new(37.5, 127.0, 10)));

        let no_time = BackgroundLocation {
            ts: None,
            ..full
        };
        assert_eq!(no_time.to_track_point(99).map(|p| p.ts), Some(99));

        let no_lng = BackgroundLocation {
            lng: None,
            ..full
        };
        assert_eq!(no_lng.to_track_point(99), None);
    }

    #[test]
    fn test_default_update_options() {
        let options = UpdateOptions::default();
        assert_eq!(options.accuracy, LocationAccuracy::Balanced);
        assert_eq!(options.time_interval_ms, 4000);
        assert_eq!(options.distance_interval_m, 5.0);
        assert!(!options.pauses_automatically);
    }
}
