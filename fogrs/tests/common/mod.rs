//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use fogrs::{
    LocationService, PermissionStatus, PositionFix, RevealOverlay, SamplerMessage, TrackPoint,
    Transport, UpdateOptions, decode_sampler_message,
};
use tokio::sync::mpsc;

pub const A: TrackPoint = TrackPoint { lat: 37.5665, lng: 126.9780, ts: 100 };
pub const B: TrackPoint = TrackPoint { lat: 37.5666, lng: 126.9780, ts: 200 };
pub const C: TrackPoint = TrackPoint { lat: 37.5680, lng: 126.9780, ts: 300 };
pub const D: TrackPoint = TrackPoint { lat: 37.5700, lng: 126.9780, ts: 400 };

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn fix(point: TrackPoint) -> PositionFix {
    PositionFix {
        lat: point.lat,
        lng: point.lng,
        accuracy: Some(5.0),
        ts: point.ts,
    }
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn messages(&self) -> Vec<SamplerMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|p| decode_sampler_message(p.as_bytes()).unwrap())
            .collect()
    }

    /// Points from every `points-add`, in delivery order.
    pub fn points_added(&self) -> Vec<TrackPoint> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                SamplerMessage::PointsAdd { points } => Some(points),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Points from every `points-sync`, in delivery order.
    pub fn points_synced(&self) -> Vec<TrackPoint> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                SamplerMessage::PointsSync { points } => Some(points),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// A fresh overlay fed every message sent so far.
    pub fn overlay(&self) -> RevealOverlay {
        let mut overlay = RevealOverlay::default();
        for payload in self.sent.lock().unwrap().iter() {
            overlay.handle_payload(payload.as_bytes());
        }
        overlay
    }

    pub fn record_statuses(&self) -> Vec<bool> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                SamplerMessage::RecordStatus { active } => Some(active),
                _ => None,
            })
            .collect()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.messages().iter().map(SamplerMessage::kind).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Transport for RecordingTransport {
    fn post(&self, payload: &str) -> fogrs::Result<()> {
        self.sent.lock().unwrap().push(payload.to_string());
        Ok(())
    }
}

// ============================================================================
// Location service
// ============================================================================

pub struct FakeLocation {
    foreground: AtomicBool,
    background: AtomicBool,
    background_started: AtomicBool,
    start_calls: AtomicUsize,
    watcher: Mutex<Option<mpsc::UnboundedSender<PositionFix>>>,
}

impl FakeLocation {
    pub fn new(foreground: bool, background: bool) -> Self {
        Self {
            foreground: AtomicBool::new(foreground),
            background: AtomicBool::new(background),
            background_started: AtomicBool::new(false),
            start_calls: AtomicUsize::new(0),
            watcher: Mutex::new(None),
        }
    }

    pub fn granted() -> Self {
        Self::new(true, true)
    }

    pub fn denied() -> Self {
        Self::new(false, false)
    }

    /// Deliver a foreground fix. False when nobody is watching.
    pub fn push(&self, fix: PositionFix) -> bool {
        self.watcher
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| tx.send(fix).is_ok())
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().unwrap().is_some()
    }

    pub fn is_background_started(&self) -> bool {
        self.background_started.load(Ordering::SeqCst)
    }

    pub fn background_start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }
}

fn status(granted: &AtomicBool) -> PermissionStatus {
    if granted.load(Ordering::SeqCst) {
        PermissionStatus::Granted
    } else {
        PermissionStatus::Denied
    }
}

#[async_trait]
impl LocationService for FakeLocation {
    async fn request_foreground_permission(&self) -> PermissionStatus {
        status(&self.foreground)
    }

    async fn request_background_permission(&self) -> PermissionStatus {
        status(&self.background)
    }

    async fn watch_position(
        &self,
        _options: &UpdateOptions,
    ) -> fogrs::Result<mpsc::UnboundedReceiver<PositionFix>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.watcher.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn clear_watch(&self) {
        *self.watcher.lock().unwrap() = None;
    }

    async fn has_started_background_updates(&self) -> bool {
        self.is_background_started()
    }

    async fn start_background_updates(&self, _options: &UpdateOptions) -> fogrs::Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.background_started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_background_updates(&self) -> fogrs::Result<()> {
        self.background_started.store(false, Ordering::SeqCst);
        Ok(())
    }
}
