//! # Visit history
//!
//! [`DedupStore`] owns the ordered history of admitted points and is the only
//! code that loads, appends to, or persists it. [`ReplayCursor`] tracks the
//! newest point delivered to the renderer and answers the replay backlog.
//!
//! ## Storage format
//!
//! | key                    | value                               |
//! |------------------------|-------------------------------------|
//! | `keys.history`         | JSON array of `{lat, lng, ts}`      |
//! | `keys.watermark`       | decimal integer (ms since epoch)    |
//!
//! Store failures are logged and swallowed; the in-memory copy stays
//! authoritative for the rest of the process and the next successful write
//! reconciles the stored copy.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use fogcore::TrackPoint;
use fogcore::geo_utils::should_admit;
use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::store::KeyValueStore;

/// Default minimum travel distance between admitted points.
pub const DEFAULT_MIN_METERS: f64 = 20.0;

/// Storage keys for the sampler's persisted values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    /// Admitted-point history blob
    pub history: String,
    /// Last delivered timestamp
    pub watermark: String,
    /// Recording flag
    pub explore: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            history: "fog:trackPoints:v1".to_string(),
            watermark: "fog:lastSentTs:v1".to_string(),
            explore: "fog:exploreActive:v1".to_string(),
        }
    }
}

// ============================================================================
// DedupStore
// ============================================================================

/// Distance-gated, persisted history of visited points.
///
/// The history is loaded lazily on first access and cached for the process
/// lifetime. Each admission runs load, gate and persist under one lock, so
/// concurrent producers never interleave inside a write.
pub struct DedupStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    /// `None` until the first load
    history: Mutex<Option<Vec<TrackPoint>>>,
}

impl DedupStore {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            history: Mutex::new(None),
        }
    }

    async fn load(&self) -> Vec<TrackPoint> {
        let raw = match self.store.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("[DedupStore] Failed to load history: {}", e);
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<TrackPoint>>(&raw) {
            Ok(points) => {
                let loaded: Vec<TrackPoint> =
                    points.into_iter().filter(TrackPoint::is_valid).collect();
                info!("[DedupStore] Loaded {} points", loaded.len());
                loaded
            }
            Err(e) => {
                warn!("[DedupStore] Discarding unreadable history: {}", e);
                Vec::new()
            }
        }
    }

    async fn persist(&self, history: &[TrackPoint]) {
        let blob = match serde_json::to_string(history) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("[DedupStore] Failed to serialize history: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(&self.key, &blob).await {
            warn!("[DedupStore] Failed to persist {} points: {}", history.len(), e);
        }
    }

    /// Admit `point` if it is at least `min_meters` from the last admitted
    /// point (the first point is always admitted). Returns the admitted point.
    pub async fn add_if_far_enough(&self, point: TrackPoint, min_meters: f64) -> Option<TrackPoint> {
        if !point.is_valid() {
            debug!("[DedupStore] Ignoring invalid point {:?}", point);
            return None;
        }

        let mut guard = self.history.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        let history = guard.get_or_insert_with(Vec::new);

        if !should_admit(history.last(), &point, min_meters) {
            return None;
        }

        history.push(point);
        self.persist(history).await;
        debug!("[DedupStore] Admitted point ts={} ({} total)", point.ts, history.len());
        Some(point)
    }

    /// Full history in admission order.
    pub async fn get_all(&self) -> Vec<TrackPoint> {
        let mut guard = self.history.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        guard.clone().unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.get_all().await.len()
    }

    /// Empty the history and delete the stored copy.
    pub async fn clear_all(&self) {
        let mut guard = self.history.lock().await;
        *guard = Some(Vec::new());
        if let Err(e) = self.store.remove(&self.key).await {
            warn!("[DedupStore] Failed to remove stored history: {}", e);
        }
        info!("[DedupStore] History cleared");
    }
}

// ============================================================================
// ReplayCursor
// ============================================================================

/// Monotonic delivery watermark plus backlog queries.
///
/// The watermark is cached in memory so it never moves backwards, even when
/// a store read fails after a successful advance.
pub struct ReplayCursor {
    store: Arc<dyn KeyValueStore>,
    key: String,
    history: Arc<DedupStore>,
    cached: AtomicI64,
    advance_lock: Mutex<()>,
}

impl ReplayCursor {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>, history: Arc<DedupStore>) -> Self {
        Self {
            store,
            key: key.into(),
            history,
            cached: AtomicI64::new(0),
            advance_lock: Mutex::new(()),
        }
    }

    /// Timestamp of the newest delivered point, 0 if never set.
    pub async fn watermark(&self) -> i64 {
        let stored = match self.store.get(&self.key).await {
            Ok(Some(raw)) => raw.trim().parse::<i64>().unwrap_or_else(|e| {
                warn!("[ReplayCursor] Ignoring unreadable watermark {:?}: {}", raw, e);
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                warn!("[ReplayCursor] Failed to read watermark: {}", e);
                0
            }
        };
        self.cached.fetch_max(stored, Ordering::SeqCst).max(stored)
    }

    /// Ratchet the watermark forward. Values not greater than the current
    /// watermark are no-ops. Returns whether the watermark moved.
    pub async fn advance_watermark(&self, ts: i64) -> bool {
        let _guard = self.advance_lock.lock().await;
        let current = self.watermark().await;
        if ts <= current {
            return false;
        }
        self.cached.fetch_max(ts, Ordering::SeqCst);
        if let Err(e) = self.store.set(&self.key, &ts.to_string()).await {
            warn!("[ReplayCursor] Failed to persist watermark {}: {}", ts, e);
        }
        true
    }

    /// History points with `ts > min_ts`, in history order.
    pub async fn pending_since(&self, min_ts: i64) -> Vec<TrackPoint> {
        self.history
            .get_all()
            .await
            .into_iter()
            .filter(|p| p.ts > min_ts)
            .collect()
    }

    /// History points with `ts <= max_ts`, in history order.
    pub async fn delivered_until(&self, max_ts: i64) -> Vec<TrackPoint> {
        self.history
            .get_all()
            .await
            .into_iter()
            .filter(|p| p.ts <= max_ts)
            .collect()
    }
}
