//! Fogrs - sampler side of the exploration reveal map
//!
//! This crate provides:
//! - Distance-gated, persisted visit history with a delivery watermark
//! - Foreground and background position sampling
//! - The queue/flush/replay bridge to the renderer
//! - SQLite key/value persistence
//! - UniFFI bindings for iOS/Android (sampler and overlay)

// Re-export the core types
pub use fogcore::*;

pub mod error;
pub use error::{StoreError, StoreResult};

// Key/value persistence
pub mod store;
pub use store::{KeyValueStore, MemoryStore, SqliteStore};

// History and watermark
pub mod track;
pub use track::{DEFAULT_MIN_METERS, DedupStore, ReplayCursor, StorageKeys};

pub mod explore;
pub use explore::ExploreFlag;

// Renderer connection
pub mod bridge;
pub use bridge::{ChannelTransport, SyncBridge, Transport};

// Position producers
pub mod sampling;
pub use sampling::{
    BackgroundLocation, LocationAccuracy, LocationService, PermissionStatus, PositionFix,
    SamplingSession, UpdateOptions,
};

pub mod sampler;
pub use sampler::{Sampler, SamplerConfig, SamplerStatus};

// FFI bindings for mobile platforms
pub mod ffi;

uniffi::setup_scaffolding!();

/// Initialize logging for Android
#[cfg(target_os = "android")]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("fogrs"),
    );
}

/// Initialize logging for iOS
#[cfg(target_os = "ios")]
pub(crate) fn init_logging() {
    use std::sync::Once;

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = oslog::OsLogger::new("fogrs")
            .level_filter(log::LevelFilter::Debug)
            .init();
    });
}

#[cfg(not(any(target_os = "android", target_os = "ios")))]
pub(crate) fn init_logging() {
    // Hosts and tests install their own logger
}
