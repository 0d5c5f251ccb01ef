//! Sampler connection scenarios against in-memory fakes.
//!
//! Time is paused: replay pacing and watcher delivery advance
//! deterministically.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use fogrs::{
    BackgroundLocation, ChannelTransport, KeyValueStore, MemoryStore, RevealOverlay, Sampler,
    SamplerConfig, StorageKeys, TrackPoint,
};

const READY: &[u8] = br#"{"type":"renderer-ready"}"#;
const RECORD_START: &[u8] = br#"{"type":"record-start"}"#;
const RECORD_STOP: &[u8] = br#"{"type":"record-stop"}"#;

struct Harness {
    store: Arc<MemoryStore>,
    location: Arc<FakeLocation>,
    transport: Arc<RecordingTransport>,
    sampler: Sampler,
}

impl Harness {
    fn new(location: FakeLocation) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), location)
    }

    fn with_store(store: Arc<MemoryStore>, location: FakeLocation) -> Self {
        init_logging();
        let location = Arc::new(location);
        let transport = Arc::new(RecordingTransport::default());
        let sampler = Sampler::new(
            store.clone(),
            location.clone(),
            transport.clone(),
            SamplerConfig::default(),
        );
        Self {
            store,
            location,
            transport,
            sampler,
        }
    }
}

/// Store with a history, a watermark and a recording flag already persisted.
async fn seeded_store(history: &[TrackPoint], watermark: Option<i64>, recording: bool) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let keys = StorageKeys::default();
    store
        .set(&keys.history, &serde_json::to_string(history).unwrap())
        .await
        .unwrap();
    if let Some(ts) = watermark {
        store.set(&keys.watermark, &ts.to_string()).await.unwrap();
    }
    store
        .set(&keys.explore, if recording { "1" } else { "0" })
        .await
        .unwrap();
    store
}

/// Let spawned tasks run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ============================================================================
// Readiness
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_ready_reports_status_and_replays_backlog() {
    let store = seeded_store(&[A, C, D], Some(100), true).await;
    let h = Harness::with_store(store, FakeLocation::granted());

    assert!(h.sampler.restore().await);
    assert!(h.location.is_background_started());
    assert!(h.transport.messages().is_empty());

    h.sampler.handle_renderer_payload(READY).await;
    h.sampler.handle_renderer_payload(READY).await;
    h.sampler.bridge().wait_replay().await;

    // One status per readiness signal; delivered points synced, backlog
    // replayed once
    assert_eq!(h.transport.record_statuses(), vec![true, true]);
    assert_eq!(h.transport.points_synced(), vec![A]);
    assert_eq!(h.transport.points_added(), vec![C, D]);
    assert_eq!(h.transport.overlay().history(), &[A, C, D]);
    assert_eq!(h.sampler.cursor().watermark().await, 400);
    assert!(h.location.is_watching());
}

#[tokio::test(start_paused = true)]
async fn test_loaded_fallback_then_explicit_ready() {
    let h = Harness::new(FakeLocation::granted());
    h.sampler.on_renderer_loaded().await;
    h.sampler.handle_renderer_payload(READY).await;

    assert_eq!(h.transport.kinds(), vec!["record-status", "record-status"]);
    let status = h.sampler.status().await;
    assert!(status.renderer_ready);
    assert!(status.foreground_attached);
    assert!(!status.recording);
}

#[tokio::test(start_paused = true)]
async fn test_messages_before_ready_are_flushed_in_order() {
    let h = Harness::new(FakeLocation::granted());
    h.sampler.clear_history().await;
    h.sampler.resync_renderer().await;
    assert!(h.transport.messages().is_empty());

    h.sampler.handle_renderer_payload(READY).await;
    assert_eq!(
        h.transport.kinds(),
        vec!["points-clear", "points-sync", "record-status"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_malformed_renderer_message_ignored() {
    let h = Harness::new(FakeLocation::granted());
    h.sampler.handle_renderer_payload(b"{not json").await;
    h.sampler.handle_renderer_payload(br#"{"type":"explode"}"#).await;
    assert!(h.transport.messages().is_empty());
    assert!(!h.sampler.bridge().is_ready());
}

// ============================================================================
// Recording toggle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_record_start_and_stop() {
    let h = Harness::new(FakeLocation::granted());
    h.sampler.handle_renderer_payload(READY).await;
    h.transport.clear();

    h.sampler.handle_renderer_payload(RECORD_START).await;
    assert_eq!(h.transport.record_statuses(), vec![true]);
    assert!(h.location.is_background_started());
    let keys = StorageKeys::default();
    assert_eq!(h.store.get(&keys.explore).await.unwrap().as_deref(), Some("1"));

    // Already started: no second start
    h.sampler.handle_renderer_payload(RECORD_START).await;
    assert_eq!(h.location.background_start_calls(), 1);

    h.sampler.handle_renderer_payload(RECORD_STOP).await;
    assert_eq!(h.transport.record_statuses(), vec![true, true, false]);
    assert!(!h.location.is_background_started());
    assert_eq!(h.store.get(&keys.explore).await.unwrap().as_deref(), Some("0"));
}

#[tokio::test(start_paused = true)]
async fn test_record_start_without_permission_reports_inactive() {
    let h = Harness::new(FakeLocation::denied());
    h.sampler.handle_renderer_payload(READY).await;
    h.sampler.handle_renderer_payload(RECORD_START).await;

    assert_eq!(h.transport.record_statuses(), vec![false, false]);
    assert!(!h.location.is_background_started());
    assert!(!h.location.is_watching());
}

#[tokio::test(start_paused = true)]
async fn test_background_permission_optional() {
    let h = Harness::new(FakeLocation::new(true, false));
    h.sampler.handle_renderer_payload(RECORD_START).await;
    assert!(h.sampler.status().await.recording);
}

// ============================================================================
// Producers
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_foreground_fixes() {
    let h = Harness::new(FakeLocation::granted());
    h.sampler.handle_renderer_payload(READY).await;

    // Not recording: live position only
    assert!(h.location.push(fix(A)));
    settle().await;
    assert!(h.transport.points_added().is_empty());

    h.sampler.handle_renderer_payload(RECORD_START).await;
    h.transport.clear();

    h.location.push(fix(A));
    h.location.push(fix(B));
    h.location.push(fix(C));
    settle().await;

    assert_eq!(
        h.transport.kinds(),
        vec![
            "live-position",
            "points-add",
            "live-position",
            "live-position",
            "points-add"
        ]
    );
    assert_eq!(h.transport.points_added(), vec![A, C]);
    assert_eq!(h.sampler.cursor().watermark().await, 300);
}

#[tokio::test(start_paused = true)]
async fn test_background_batch_accumulates_for_replay() {
    let h = Harness::new(FakeLocation::granted());

    // Flag off: batch ignored
    let batch = [
        BackgroundLocation { lat: Some(A.lat), lng: Some(A.lng), ts: Some(A.ts) },
        BackgroundLocation { lat: Some(B.lat), lng: Some(B.lng), ts: Some(B.ts) },
        BackgroundLocation { lat: None, lng: Some(127.0), ts: Some(250) },
        BackgroundLocation { lat: Some(C.lat), lng: Some(C.lng), ts: Some(C.ts) },
    ];
    assert_eq!(h.sampler.on_background_batch(&batch).await, 0);

    h.sampler.handle_renderer_payload(RECORD_START).await;
    assert_eq!(h.sampler.on_background_batch(&batch).await, 2);
    assert!(h.transport.points_added().is_empty());

    h.sampler.handle_renderer_payload(READY).await;
    h.sampler.bridge().wait_replay().await;
    assert_eq!(h.transport.points_added(), vec![A, C]);
}

#[tokio::test(start_paused = true)]
async fn test_background_batch_stamps_missing_time() {
    let h = Harness::new(FakeLocation::granted());
    h.sampler.handle_renderer_payload(RECORD_START).await;

    let before = chrono::Utc::now().timestamp_millis();
    let batch = [BackgroundLocation { lat: Some(A.lat), lng: Some(A.lng), ts: None }];
    assert_eq!(h.sampler.on_background_batch(&batch).await, 1);

    let stored = h.sampler.history().get_all().await;
    assert!(stored[0].ts >= before);
}

// ============================================================================
// Disconnect
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_replay_and_watcher() {
    let store = seeded_store(&[A, C, D], None, false).await;
    let h = Harness::with_store(store, FakeLocation::granted());

    h.sampler.handle_renderer_payload(READY).await;
    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(h.transport.points_added(), vec![A]);

    h.sampler.on_renderer_disconnected().await;
    assert!(!h.location.is_watching());
    assert!(!h.sampler.bridge().is_ready());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.transport.points_added(), vec![A]);

    // Reconnect: a fresh renderer gets the delivered point as a sync and
    // only the undelivered points replay
    h.transport.clear();
    h.sampler.handle_renderer_payload(READY).await;
    h.sampler.bridge().wait_replay().await;
    assert_eq!(h.transport.points_synced(), vec![A]);
    assert_eq!(h.transport.points_added(), vec![C, D]);
    assert_eq!(h.transport.overlay().history(), &[A, C, D]);
    assert!(h.location.is_watching());
}

#[tokio::test(start_paused = true)]
async fn test_record_stop_cancels_replay() {
    let store = seeded_store(&[A, C, D], None, true).await;
    let h = Harness::with_store(store, FakeLocation::granted());
    h.sampler.restore().await;

    h.sampler.handle_renderer_payload(READY).await;
    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(h.transport.points_added(), vec![A]);

    h.sampler.handle_renderer_payload(RECORD_STOP).await;
    assert!(!h.sampler.bridge().is_replaying());
    assert!(!h.location.is_background_started());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.transport.points_added(), vec![A]);
    assert_eq!(h.sampler.cursor().watermark().await, A.ts);
}

// ============================================================================
// Persistence failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unsaved_recording_flag_stays_on() {
    let h = Harness::new(FakeLocation::granted());
    h.store.set_writes_failing(true);
    h.sampler.handle_renderer_payload(READY).await;

    h.sampler.handle_renderer_payload(RECORD_START).await;
    assert!(h.sampler.status().await.recording);

    let batch = [BackgroundLocation { lat: Some(A.lat), lng: Some(A.lng), ts: Some(A.ts) }];
    assert_eq!(h.sampler.on_background_batch(&batch).await, 1);
    assert!(h.sampler.status().await.recording);

    h.sampler.on_position(fix(C)).await;
    assert_eq!(h.sampler.history().get_all().await, vec![A, C]);
    assert_eq!(h.transport.points_added(), vec![C]);
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_renderer_overlay_receives_history() {
    init_logging();
    let store = seeded_store(&[A, C], None, true).await;
    let location = Arc::new(FakeLocation::granted());
    let (transport, mut rx) = ChannelTransport::new();
    let sampler = Sampler::new(store, location.clone(), Arc::new(transport), SamplerConfig::default());
    sampler.restore().await;

    let mut overlay = RevealOverlay::default();
    sampler.handle_renderer_payload(READY).await;
    sampler.bridge().wait_replay().await;
    location.push(fix(D));
    settle().await;

    while let Ok(payload) = rx.try_recv() {
        overlay.handle_payload(payload.as_bytes());
    }
    assert_eq!(overlay.history(), &[A, C, D]);
    let status = overlay.status();
    assert!(status.recording);
    assert!(status.receiving);
    assert_eq!(overlay.live_position().map(|l| l.ts), Some(D.ts));

    // Clear propagates
    sampler.clear_history().await;
    while let Ok(payload) = rx.try_recv() {
        overlay.handle_payload(payload.as_bytes());
    }
    assert!(overlay.history().is_empty());
    assert_eq!(overlay.status().reveal_count, 0);
}
