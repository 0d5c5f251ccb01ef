//! Storage errors.
//!
//! Store failures never reach the host. Components log them and keep their
//! in-memory state; see [`fogcore::FogError::Persistence`] for the variant
//! used when a store error has to cross into the shared error type.

use fogcore::FogError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Schema migration failed: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Blocking store task panicked or was cancelled
    #[error("Store task failed: {0}")]
    Task(String),

    #[error("Store lock poisoned")]
    Poisoned,

    /// Injected by `MemoryStore` when writes are switched off
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Task(err.to_string())
    }
}

impl From<StoreError> for FogError {
    fn from(err: StoreError) -> Self {
        FogError::Persistence {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_maps_to_persistence() {
        let err: FogError = StoreError::Poisoned.into();
        assert!(matches!(err, FogError::Persistence { .. }));
        assert!(err.to_string().contains("poisoned"));
    }
}
