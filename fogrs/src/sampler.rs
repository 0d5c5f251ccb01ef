//! # Sampler
//!
//! Wires the history, cursor, flag, bridge and sampling session to one
//! renderer connection and handles renderer -> sampler messages.
//!
//! Connection lifecycle:
//! 1. `restore()` at app start: reload the flag and restart background
//!    capture if recording was on.
//! 2. First readiness (`renderer-ready` or the host's load-end fallback):
//!    flush the queue, report `record-status`, sync the delivered history,
//!    replay the backlog, attach the foreground watcher. Duplicate
//!    readiness only re-reports `record-status`.
//! 3. Disconnect: cancel replay, detach the watcher, buffer again.

use std::sync::Arc;
use std::time::Duration;

use fogcore::{RendererMessage, SamplerMessage, decode_renderer_message};
use log::{debug, info, warn};

use crate::bridge::{SyncBridge, Transport};
use crate::explore::ExploreFlag;
use crate::sampling::{BackgroundLocation, LocationService, PositionFix, SamplingSession, UpdateOptions};
use crate::store::KeyValueStore;
use crate::track::{DEFAULT_MIN_METERS, DedupStore, ReplayCursor, StorageKeys};

/// Sampler configuration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Minimum distance between admitted points in meters.
    /// Default: 20.0
    pub min_distance_m: f64,

    /// Delay before each replayed point.
    /// Default: 300 ms
    pub replay_interval: Duration,

    /// Location service options for both producers.
    pub update_options: UpdateOptions,

    pub keys: StorageKeys,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            min_distance_m: DEFAULT_MIN_METERS,
            replay_interval: Duration::from_millis(300),
            update_options: UpdateOptions::default(),
            keys: StorageKeys::default(),
        }
    }
}

/// Snapshot of the sampler for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerStatus {
    pub recording: bool,
    pub renderer_ready: bool,
    pub foreground_attached: bool,
    pub replaying: bool,
    pub history_len: usize,
    pub watermark: i64,
}

pub struct Sampler {
    config: SamplerConfig,
    history: Arc<DedupStore>,
    cursor: Arc<ReplayCursor>,
    explore: Arc<ExploreFlag>,
    bridge: Arc<SyncBridge>,
    session: Arc<SamplingSession>,
}

impl Sampler {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        location: Arc<dyn LocationService>,
        transport: Arc<dyn Transport>,
        config: SamplerConfig,
    ) -> Self {
        let keys = &config.keys;
        let history = Arc::new(DedupStore::new(store.clone(), keys.history.clone()));
        let cursor = Arc::new(ReplayCursor::new(
            store.clone(),
            keys.watermark.clone(),
            history.clone(),
        ));
        let explore = Arc::new(ExploreFlag::new(store, keys.explore.clone()));
        let bridge = Arc::new(SyncBridge::new(transport, cursor.clone(), config.replay_interval));
        let session = Arc::new(SamplingSession::new(
            location,
            history.clone(),
            cursor.clone(),
            explore.clone(),
            bridge.clone(),
            config.update_options.clone(),
            config.min_distance_m,
        ));

        Self {
            config,
            history,
            cursor,
            explore,
            bridge,
            session,
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<DedupStore> {
        &self.history
    }

    pub fn cursor(&self) -> &Arc<ReplayCursor> {
        &self.cursor
    }

    pub fn bridge(&self) -> &Arc<SyncBridge> {
        &self.bridge
    }

    pub fn session(&self) -> &Arc<SamplingSession> {
        &self.session
    }

    /// App start: reload the recording flag and resume background capture.
    pub async fn restore(&self) -> bool {
        let active = self.explore.load().await;
        info!("[Sampler] Restored recording flag: {}", active);
        if active {
            if let Err(e) = self.session.start_recording().await {
                warn!("[Sampler] Could not resume recording: {}", e);
            }
        }
        active
    }

    /// Decode and handle one renderer message. Malformed payloads are
    /// dropped.
    pub async fn handle_renderer_payload(&self, payload: &[u8]) {
        match decode_renderer_message(payload) {
            Ok(message) => self.handle_renderer_message(message).await,
            Err(e) => debug!("[Sampler] Dropping malformed renderer message: {}", e),
        }
    }

    pub async fn handle_renderer_message(&self, message: RendererMessage) {
        match message {
            RendererMessage::RendererReady => self.on_ready().await,
            RendererMessage::RecordStart => self.set_recording(true).await,
            RendererMessage::RecordStop => self.set_recording(false).await,
        }
    }

    /// Host-side fallback for renderers that never send `renderer-ready`.
    pub async fn on_renderer_loaded(&self) {
        self.on_ready().await;
    }

    async fn on_ready(&self) {
        let first = self.bridge.mark_ready();
        self.bridge.send(SamplerMessage::RecordStatus {
            active: self.explore.is_active(),
        });
        if !first {
            return;
        }

        // Backlog is snapshotted before live fixes can move the watermark
        self.bridge.sync_delivered().await;
        self.bridge.start_replay().await;
        if let Err(e) = self.session.attach_foreground().await {
            warn!("[Sampler] No foreground updates: {}", e);
        }
    }

    async fn set_recording(&self, requested: bool) {
        if requested {
            match self.session.start_recording().await {
                Ok(()) => self.explore.set_active(true).await,
                Err(e) => warn!("[Sampler] Recording not started: {}", e),
            }
        } else {
            self.explore.set_active(false).await;
            self.bridge.cancel_replay();
            self.session.stop_recording().await;
        }
        self.bridge.send(SamplerMessage::RecordStatus {
            active: self.explore.is_active(),
        });
    }

    /// Renderer torn down: cancel replay, stop the watcher, buffer again.
    pub async fn on_renderer_disconnected(&self) {
        self.bridge.reset();
        self.session.detach_foreground().await;
        info!("[Sampler] Renderer disconnected");
    }

    /// Foreground fix delivered outside the watcher channel.
    pub async fn on_position(&self, fix: PositionFix) {
        self.session.on_foreground_fix(fix).await;
    }

    pub async fn on_background_batch(&self, locations: &[BackgroundLocation]) -> usize {
        self.session.on_background_batch(locations).await
    }

    /// Erase the history and tell the renderer.
    pub async fn clear_history(&self) {
        self.bridge.cancel_replay();
        self.history.clear_all().await;
        self.bridge.send(SamplerMessage::PointsClear);
    }

    /// Replace the renderer's point set with the full history.
    pub async fn resync_renderer(&self) {
        self.bridge.cancel_replay();
        let points = self.history.get_all().await;
        let newest = points.iter().map(|p| p.ts).max();
        self.bridge.send(SamplerMessage::PointsSync { points });
        if let Some(ts) = newest {
            self.cursor.advance_watermark(ts).await;
        }
    }

    pub async fn status(&self) -> SamplerStatus {
        SamplerStatus {
            recording: self.explore.is_active(),
            renderer_ready: self.bridge.is_ready(),
            foreground_attached: self.session.is_foreground_attached(),
            replaying: self.bridge.is_replaying(),
            history_len: self.history.len().await,
            watermark: self.cursor.watermark().await,
        }
    }
}
