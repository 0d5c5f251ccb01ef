//! Web Mercator projection for container-pixel coordinates.
//!
//! Hosts whose map widget exposes its own geocoordinate -> pixel callback
//! register that as a [`ProjectionProvider`]. Hosts without one (and the
//! tests) use the projections here, computed from center, zoom and size.

use std::f64::consts::PI;
use std::sync::RwLock;

use crate::cluster::{PixelPoint, ProjectionProvider, Viewport};
use crate::GeoPoint;

/// Tile size in pixels of the world grid the zoom level refers to
pub const TILE_SIZE: f64 = 256.0;

/// Latitude limit of the square Web Mercator world
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

// ============================================================================
// Web Mercator Math
// ============================================================================

/// Convert longitude to world X in tile units at a (fractional) zoom
#[inline]
pub fn lon_to_world_x(lon: f64, zoom: f64) -> f64 {
    let n = 2.0_f64.powf(zoom);
    (lon + 180.0) / 360.0 * n
}

/// Convert latitude to world Y in tile units at a (fractional) zoom
#[inline]
pub fn lat_to_world_y(lat: f64, zoom: f64) -> f64 {
    let n = 2.0_f64.powf(zoom);
    let lat_rad = lat.to_radians();
    (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n
}

/// Convert world X in tile units back to longitude
#[inline]
pub fn world_x_to_lon(x: f64, zoom: f64) -> f64 {
    let n = 2.0_f64.powf(zoom);
    x / n * 360.0 - 180.0
}

/// Convert world Y in tile units back to latitude
#[inline]
pub fn world_y_to_lat(y: f64, zoom: f64) -> f64 {
    let n = 2.0_f64.powf(zoom);
    let lat_rad = (PI * (1.0 - 2.0 * y / n)).sinh().atan();
    lat_rad.to_degrees()
}

// ============================================================================
// Projections
// ============================================================================

/// An immutable viewport snapshot projected with Web Mercator.
#[derive(Debug, Clone, Copy)]
pub struct MercatorViewport {
    viewport: Viewport,
}

impl MercatorViewport {
    pub fn new(viewport: Viewport) -> Self {
        Self { viewport }
    }

    /// Geocoordinate at a container pixel (inverse of `project`).
    pub fn unproject(&self, pixel: PixelPoint) -> GeoPoint {
        let vp = &self.viewport;
        let cx = lon_to_world_x(vp.center.longitude, vp.zoom);
        let cy = lat_to_world_y(vp.center.latitude, vp.zoom);
        let wx = cx + (pixel.x - vp.width / 2.0) / TILE_SIZE;
        let wy = cy + (pixel.y - vp.height / 2.0) / TILE_SIZE;
        GeoPoint::new(world_y_to_lat(wy, vp.zoom), world_x_to_lon(wx, vp.zoom))
    }
}

impl ProjectionProvider for MercatorViewport {
    fn viewport(&self) -> Option<Viewport> {
        Some(self.viewport)
    }

    fn project(&self, point: &GeoPoint) -> Option<PixelPoint> {
        if !point.is_valid() || point.latitude.abs() > MAX_LATITUDE {
            return None;
        }
        let vp = &self.viewport;
        let world_tiles = 2.0_f64.powf(vp.zoom);

        let mut dx = lon_to_world_x(point.longitude, vp.zoom) - lon_to_world_x(vp.center.longitude, vp.zoom);
        // Nearest copy of the world across the antimeridian
        if dx > world_tiles / 2.0 {
            dx -= world_tiles;
        } else if dx < -world_tiles / 2.0 {
            dx += world_tiles;
        }
        let dy = lat_to_world_y(point.latitude, vp.zoom) - lat_to_world_y(vp.center.latitude, vp.zoom);

        Some(PixelPoint::new(
            vp.width / 2.0 + dx * TILE_SIZE,
            vp.height / 2.0 + dy * TILE_SIZE,
        ))
    }
}

/// A shared, host-updated Web Mercator projection.
///
/// Starts uninitialized; `viewport()` returns `None` until the host reports
/// its first center/zoom/size.
#[derive(Debug, Default)]
pub struct MercatorProjection {
    current: RwLock<Option<MercatorViewport>>,
}

impl MercatorProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current transform. Returns false if the viewport is unusable.
    pub fn set_viewport(&self, viewport: Viewport) -> bool {
        if !viewport.is_usable() {
            log::debug!("[MercatorProjection] Ignoring unusable viewport {:?}", viewport);
            return false;
        }
        match self.current.write() {
            Ok(mut guard) => {
                *guard = Some(MercatorViewport::new(viewport));
                true
            }
            Err(_) => false,
        }
    }

    /// Forget the transform (map widget unmounted).
    pub fn clear(&self) {
        if let Ok(mut guard) = self.current.write() {
            *guard = None;
        }
    }

    fn snapshot(&self) -> Option<MercatorViewport> {
        self.current.read().ok().and_then(|guard| *guard)
    }
}

impl ProjectionProvider for MercatorProjection {
    fn viewport(&self) -> Option<Viewport> {
        self.snapshot().map(|m| m.viewport)
    }

    fn project(&self, point: &GeoPoint) -> Option<PixelPoint> {
        self.snapshot()?.project(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seoul(zoom: f64) -> Viewport {
        Viewport::new(GeoPoint::new(37.5665, 126.9780), zoom, 400.0, 800.0)
    }

    #[test]
    fn test_world_roundtrip_known_values() {
        // Tile 0/0/0 covers the world
        assert!((world_x_to_lon(0.0, 0.0) + 180.0).abs() < 1e-9);
        assert!((world_x_to_lon(1.0, 0.0) - 180.0).abs() < 1e-9);
        assert!((world_y_to_lat(0.0, 0.0) - MAX_LATITUDE).abs() < 1e-6);

        // London at zoom 10
        let tx = lon_to_world_x(-0.1278, 10.0);
        let ty = lat_to_world_y(51.5074, 10.0);
        assert!(tx > 0.0 && tx < 1024.0);
        assert!(ty > 0.0 && ty < 1024.0);
    }

    #[test]
    fn test_center_projects_to_middle() {
        let proj = MercatorViewport::new(seoul(15.0));
        let p = proj.project(&GeoPoint::new(37.5665, 126.9780)).unwrap();
        assert!((p.x - 200.0).abs() < 1e-6);
        assert!((p.y - 400.0).abs() < 1e-6);
    }

    #[test]
    fn test_north_is_up_east_is_right() {
        let proj = MercatorViewport::new(seoul(15.0));
        let north = proj.project(&GeoPoint::new(37.5700, 126.9780)).unwrap();
        let east = proj.project(&GeoPoint::new(37.5665, 126.9820)).unwrap();
        assert!(north.y < 400.0);
        assert!(east.x > 200.0);
    }

    #[test]
    fn test_unproject_inverts_project() {
        let proj = MercatorViewport::new(seoul(14.5));
        let point = GeoPoint::new(37.5701, 126.9712);
        let pixel = proj.project(&point).unwrap();
        let back = proj.unproject(pixel);
        assert!((back.latitude - point.latitude).abs() < 1e-9);
        assert!((back.longitude - point.longitude).abs() < 1e-9);
    }

    #[test]
    fn test_antimeridian_wraps_to_nearest_copy() {
        let vp = Viewport::new(GeoPoint::new(0.0, 179.99), 12.0, 400.0, 400.0);
        let proj = MercatorViewport::new(vp);
        let p = proj.project(&GeoPoint::new(0.0, -179.99)).unwrap();
        // 0.02 degrees east of center, not a world away
        assert!(p.x > 200.0 && p.x < 400.0, "got {}", p.x);
    }

    #[test]
    fn test_shared_projection_uninitialized() {
        let shared = MercatorProjection::new();
        assert!(shared.viewport().is_none());
        assert!(shared.project(&GeoPoint::new(0.0, 0.0)).is_none());

        assert!(shared.set_viewport(seoul(15.0)));
        assert!(shared.viewport().is_some());
        assert!(!shared.set_viewport(Viewport::new(GeoPoint::new(0.0, 0.0), 15.0, 0.0, 100.0)));

        shared.clear();
        assert!(shared.viewport().is_none());
    }
}
