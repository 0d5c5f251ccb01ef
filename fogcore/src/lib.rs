//! # Fogcore
//!
//! Algorithms behind the exploration reveal map: an opaque fog layer drawn over
//! the visible map with soft circular cutouts at every visited point.
//!
//! This library provides:
//! - Track point types and the haversine admission distance
//! - The sampler/renderer wire protocol
//! - Viewport clustering of reveal points into a bounded set of cutouts
//! - Fog mask rasterization with radial fade cutouts
//! - Frame coalescing and the renderer-side overlay state
//!
//! ## Features
//!
//! - **`parallel`** - Rasterize mask rows in parallel with rayon (default)
//! - **`synthetic`** - Deterministic point sets for tests and benchmarks
//!
//! ## Quick Start
//!
//! ```rust
//! use fogcore::{ClusterConfig, GeoPoint, MercatorViewport, RevealClusterer, Viewport};
//!
//! let viewport = Viewport::new(GeoPoint::new(37.5665, 126.9780), 15.0, 390.0, 844.0);
//! let projection = MercatorViewport::new(viewport);
//! let visited = vec![GeoPoint::new(37.5665, 126.9780), GeoPoint::new(37.5670, 126.9785)];
//!
//! let clusterer = RevealClusterer::new(ClusterConfig::default());
//! let clusters = clusterer.cluster(&projection, &viewport, &visited, false);
//! assert!(!clusters.is_empty());
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{FogError, OptionExt, Result};

// Geographic utilities (haversine, meters-per-pixel)
pub mod geo_utils;
pub use geo_utils::{haversine_distance, meters_per_pixel, meters_to_pixels};

// Sampler <-> renderer messages
pub mod protocol;
pub use protocol::{
    RendererMessage, SamplerMessage, decode_renderer_message, decode_sampler_message,
    encode_message,
};

// Web Mercator projection for hosts without their own projection
pub mod mercator;
pub use mercator::{MercatorProjection, MercatorViewport};

// Viewport clustering
pub mod cluster;
pub use cluster::{
    ClusterConfig, PixelPoint, ProjectionProvider, RevealCluster, RevealClusterer, Viewport,
};

// Fog mask rasterization
pub mod mask;
pub use mask::{MaskConfig, MaskRenderer};

// Dirty-flag frame coalescing
pub mod scheduler;
pub use scheduler::{DirtyReason, FrameScheduler};

// Renderer-side state: point set, record toggle, draw triggers
pub mod overlay;
pub use overlay::{
    FrameOutcome, GestureEvent, OverlayStatus, RecordToggle, RevealOverlay, ViewportEvent,
};

// Synthetic point sets
#[cfg(any(test, feature = "synthetic"))]
pub mod synthetic;

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate with latitude and longitude in degrees.
///
/// # Example
/// ```
/// use fogcore::GeoPoint;
/// let point = GeoPoint::new(37.5665, 126.9780); // Seoul
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new geographic point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A captured position admitted (or offered) to the visit history.
///
/// `ts` is the capture time in milliseconds since the Unix epoch and is the
/// ordering key for replay. The serialized form is `{lat, lng, ts}`, which is
/// both the persisted history format and the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lng: f64,
    pub ts: i64,
}

impl TrackPoint {
    pub fn new(lat: f64, lng: f64, ts: i64) -> Self {
        Self { lat, lng, ts }
    }

    /// The coordinate part of this point.
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    pub fn is_valid(&self) -> bool {
        self.position().is_valid()
    }
}

impl From<TrackPoint> for GeoPoint {
    fn from(point: TrackPoint) -> Self {
        point.position()
    }
}
