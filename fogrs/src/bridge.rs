//! # Sampler -> renderer bridge
//!
//! Moves messages across the transport with two guarantees:
//!
//! 1. **Flush once.** Messages sent before the renderer is ready are queued
//!    in FIFO order and flushed exactly once on the first readiness signal.
//!    Later signals do not re-flush.
//! 2. **Sync.** A new renderer starts empty, so everything already
//!    delivered (up to the watermark) is sent once as a single `points-sync`.
//! 3. **Replay.** After readiness, every history point newer than the
//!    watermark is delivered as its own `points-add`, one per replay
//!    interval, advancing the watermark after each. Replay runs as a task
//!    that is aborted on cancel; undelivered points stay in the backlog.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fogcore::{FogError, Result, SamplerMessage, encode_message};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::track::ReplayCursor;

/// Opaque message channel to the renderer.
pub trait Transport: Send + Sync {
    /// Deliver one encoded message.
    fn post(&self, payload: &str) -> Result<()>;
}

/// Transport for a renderer running in the same process: payloads land in
/// an unbounded channel.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn post(&self, payload: &str) -> Result<()> {
        self.tx
            .send(payload.to_string())
            .map_err(|_| FogError::Transport {
                message: "renderer channel closed".to_string(),
            })
    }
}

#[derive(Default)]
struct ConnectionState {
    ready: bool,
    queue: VecDeque<SamplerMessage>,
}

pub struct SyncBridge {
    transport: Arc<dyn Transport>,
    cursor: Arc<ReplayCursor>,
    replay_interval: Duration,
    state: Mutex<ConnectionState>,
    replay: Mutex<Option<JoinHandle<()>>>,
}

impl SyncBridge {
    pub fn new(transport: Arc<dyn Transport>, cursor: Arc<ReplayCursor>, replay_interval: Duration) -> Self {
        Self {
            transport,
            cursor,
            replay_interval,
            state: Mutex::new(ConnectionState::default()),
            replay: Mutex::new(None),
        }
    }

    fn post(&self, message: &SamplerMessage) {
        let payload = match encode_message(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("[SyncBridge] Failed to encode {}: {}", message.kind(), e);
                return;
            }
        };
        if let Err(e) = self.transport.post(&payload) {
            warn!("[SyncBridge] Dropping {}: {}", message.kind(), e);
        }
    }

    /// Send now if the renderer is ready, otherwise queue.
    pub fn send(&self, message: SamplerMessage) {
        let Ok(mut state) = self.state.lock() else {
            warn!("[SyncBridge] State lock poisoned, dropping {}", message.kind());
            return;
        };
        if !state.ready {
            debug!("[SyncBridge] Queueing {} ({} queued)", message.kind(), state.queue.len() + 1);
            state.queue.push_back(message);
            return;
        }
        // Posting under the lock keeps sends ordered behind a concurrent flush
        self.post(&message);
    }

    /// Record readiness. The first call flushes the queue and returns true;
    /// repeated calls are no-ops.
    pub fn mark_ready(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.ready {
            debug!("[SyncBridge] Duplicate readiness signal");
            return false;
        }
        state.ready = true;
        let queued: Vec<SamplerMessage> = state.queue.drain(..).collect();
        info!("[SyncBridge] Renderer ready, flushing {} messages", queued.len());
        for message in &queued {
            self.post(message);
        }
        true
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().map(|s| s.ready).unwrap_or(false)
    }

    pub fn queued_len(&self) -> usize {
        self.state.lock().map(|s| s.queue.len()).unwrap_or(0)
    }

    /// Send the already-delivered history as one `points-sync`. Returns the
    /// number of points sent.
    pub async fn sync_delivered(&self) -> usize {
        let watermark = self.cursor.watermark().await;
        let delivered = self.cursor.delivered_until(watermark).await;
        if delivered.is_empty() {
            return 0;
        }
        let count = delivered.len();
        info!("[SyncBridge] Syncing {} delivered points up to {}", count, watermark);
        self.send(SamplerMessage::PointsSync { points: delivered });
        count
    }

    /// Start paced delivery of everything newer than the watermark,
    /// replacing any replay in flight. Returns the backlog size.
    pub async fn start_replay(self: &Arc<Self>) -> usize {
        let watermark = self.cursor.watermark().await;
        let pending = self.cursor.pending_since(watermark).await;
        if pending.is_empty() {
            debug!("[SyncBridge] Nothing to replay since {}", watermark);
            return 0;
        }

        let count = pending.len();
        info!("[SyncBridge] Replaying {} points since {}", count, watermark);

        let bridge = Arc::clone(self);
        let handle = tokio::spawn(async move {
            for point in pending {
                tokio::time::sleep(bridge.replay_interval).await;
                bridge.send(SamplerMessage::PointsAdd {
                    points: vec![point],
                });
                bridge.cursor.advance_watermark(point.ts).await;
            }
            debug!("[SyncBridge] Replay finished");
        });

        match self.replay.lock() {
            Ok(mut slot) => {
                if let Some(previous) = slot.replace(handle) {
                    previous.abort();
                }
            }
            Err(_) => handle.abort(),
        }
        count
    }

    /// Drop any scheduled replay deliveries. Returns whether one was running.
    pub fn cancel_replay(&self) -> bool {
        let handle = self.replay.lock().ok().and_then(|mut slot| slot.take());
        match handle {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                info!("[SyncBridge] Replay cancelled");
                true
            }
            _ => false,
        }
    }

    pub fn is_replaying(&self) -> bool {
        self.replay
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Wait for the current replay to finish or be cancelled.
    pub async fn wait_replay(&self) {
        let handle = self.replay.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!("[SyncBridge] Replay ended early: {}", e);
            }
        }
    }

    /// Renderer went away: cancel replay and buffer again until the next
    /// readiness signal.
    pub fn reset(&self) {
        self.cancel_replay();
        if let Ok(mut state) = self.state.lock() {
            state.ready = false;
        }
        info!("[SyncBridge] Connection reset");
    }
}
