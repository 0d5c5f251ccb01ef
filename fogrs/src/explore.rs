//! Persisted "recording active" flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use crate::store::KeyValueStore;

const ACTIVE: &str = "1";
const INACTIVE: &str = "0";

/// Process-wide recording flag, persisted as `"1"`/`"0"`.
///
/// [`ExploreFlag::is_active`] reads the in-memory copy. [`ExploreFlag::load`]
/// re-reads the persisted value, which is what background capture consults
/// since it may run in a context that never saw the last toggle.
///
/// A toggle whose write failed stays authoritative for the session: `load`
/// retries the write instead of reading the stale stored value.
pub struct ExploreFlag {
    store: Arc<dyn KeyValueStore>,
    key: String,
    active: AtomicBool,
    unsaved: AtomicBool,
}

impl ExploreFlag {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            active: AtomicBool::new(false),
            unsaved: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Refresh from the store. On a failed read or an empty slot the cached
    /// value stands. An unsaved toggle is written again instead of read.
    pub async fn load(&self) -> bool {
        if self.unsaved.load(Ordering::SeqCst) {
            let active = self.is_active();
            self.persist(active).await;
            return active;
        }
        match self.store.get(&self.key).await {
            Ok(Some(value)) => {
                let active = value == ACTIVE;
                self.active.store(active, Ordering::SeqCst);
                active
            }
            Ok(None) => self.is_active(),
            Err(e) => {
                warn!("[ExploreFlag] Failed to read flag: {}", e);
                self.is_active()
            }
        }
    }

    pub async fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
        self.persist(active).await;
        info!("[ExploreFlag] Recording {}", if active { "on" } else { "off" });
    }

    async fn persist(&self, active: bool) {
        let value = if active { ACTIVE } else { INACTIVE };
        match self.store.set(&self.key, value).await {
            Ok(()) => self.unsaved.store(false, Ordering::SeqCst),
            Err(e) => {
                warn!("[ExploreFlag] Failed to persist flag: {}", e);
                self.unsaved.store(true, Ordering::SeqCst);
            }
        }
    }
}
