//! # Key/value store
//!
//! The sampler persists three values: the history blob, the delivery
//! watermark and the explore flag. Each is a whole string value; a write
//! replaces the previous value atomically and partial writes are never
//! visible.
//!
//! Two implementations:
//! - [`SqliteStore`]: a single `kv` table, used on device
//! - [`MemoryStore`]: process-local map, used by tests and diskless hosts

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};

/// Opaque async get/set/remove over string values.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

// ============================================================================
// SQLite
// ============================================================================

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        r#"
        CREATE TABLE kv (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL,
            updated_at INTEGER DEFAULT (strftime('%s', 'now'))
        );
        "#,
    )])
}

/// SQLite-backed store. Calls run on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and bring the schema up to
    /// date.
    pub fn open(db_path: &str) -> StoreResult<Self> {
        info!("[SqliteStore] Opening {}", db_path);
        Self::from_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> StoreResult<Self> {
        migrations().to_latest(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&Connection) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&guard)
        })
        .await?
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
                    row.get::<_, String>(0)
                })
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?, ?, strftime('%s', 'now'))",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?", params![key])?;
            Ok(())
        })
        .await
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local store.
///
/// Writes can be switched off with [`MemoryStore::set_writes_failing`] to
/// exercise the persistence-failure path.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
    failing_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_writes_failing(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.failing_writes.load(Ordering::SeqCst) {
            debug!("[MemoryStore] Rejecting write");
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check_writable()?;
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.check_writable()?;
        self.values.write().await.remove(key);
        Ok(())
    }
}
