//! # Reveal Clustering
//!
//! Projects reveal points into container pixels and merges nearby points into
//! weighted cluster centers so the number of drawn cutouts stays bounded no
//! matter how many places have been visited.
//!
//! ## Algorithm
//!
//! 1. Project every point; drop those whose reveal circle lies entirely
//!    outside the viewport rectangle.
//! 2. Bin survivors into a uniform grid (cell size from zoom and interaction
//!    state), accumulating a pixel-space centroid and member count per cell.
//! 3. While the populated cell count exceeds the cap, re-bin the cell
//!    centroids (weighted by member count) into a grid with cells
//!    `rebin_factor` times larger. Nothing is truncated.
//! 4. Emit one cluster per cell with a radius grown by `sqrt(members)`.

use std::collections::BTreeMap;

use log::{trace, warn};

use crate::geo_utils::meters_to_pixels;
use crate::GeoPoint;

// ============================================================================
// Types
// ============================================================================

/// A position in container pixels (logical, not device pixels).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The host map's current transform, read once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Map center
    pub center: GeoPoint,
    /// Zoom level (fractional during pinch)
    pub zoom: f64,
    /// Container width in logical pixels
    pub width: f64,
    /// Container height in logical pixels
    pub height: f64,
}

impl Viewport {
    pub fn new(center: GeoPoint, zoom: f64, width: f64, height: f64) -> Self {
        Self {
            center,
            zoom,
            width,
            height,
        }
    }

    /// Whether this transform can be drawn into (non-empty, finite).
    pub fn is_usable(&self) -> bool {
        self.center.is_valid()
            && self.zoom.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width >= 1.0
            && self.height >= 1.0
    }
}

/// Capability handed to the renderer by the host map widget.
///
/// `viewport()` returns `None` until the map is initialized; `project()`
/// returns `None` for coordinates the projection cannot place.
pub trait ProjectionProvider: Send + Sync {
    fn viewport(&self) -> Option<Viewport>;
    fn project(&self, point: &GeoPoint) -> Option<PixelPoint>;
}

/// One drawn cutout, produced fresh every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevealCluster {
    pub pixel_x: f64,
    pub pixel_y: f64,
    pub member_count: u32,
    /// Radius where the fog is fully opaque again
    pub outer_radius_px: f64,
    /// Radius inside which the fog is fully cleared
    pub inner_radius_px: f64,
}

/// Configuration for reveal clustering.
///
/// The grid and cap values are tuning constants, not contracts.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Ground radius revealed around a single point.
    /// Default: 50.0 meters
    pub reveal_radius_m: f64,

    /// Grid cell size at `reference_zoom`.
    /// Default: 64 px
    pub base_cell_px: f64,

    /// Zoom at which the cell size equals `base_cell_px`.
    /// Default: 12
    pub reference_zoom: f64,

    /// Cell size change per zoom level (smaller cells when zoomed in).
    /// Default: 8 px
    pub cell_step_px: f64,

    /// Cell size clamp.
    /// Default: 24 - 96 px
    pub min_cell_px: f64,
    pub max_cell_px: f64,

    /// Cell size multiplier while the user pans or zooms.
    /// Default: 1.5
    pub interacting_cell_scale: f64,

    /// Maximum clusters per frame when idle.
    /// Default: 400
    pub max_clusters_idle: usize,

    /// Maximum clusters per frame while interacting.
    /// Default: 250
    pub max_clusters_interacting: usize,

    /// Cell growth per re-binning pass.
    /// Default: 2.0
    pub rebin_factor: f64,

    /// Outer radius cap as a multiple of the single-point radius.
    /// Default: 2.5
    pub max_radius_scale: f64,

    /// Smallest outer radius drawn, so distant reveals stay visible.
    /// Default: 6 px
    pub min_outer_radius_px: f64,

    /// Width of the soft edge when idle / while interacting.
    /// Default: 24 / 12 px
    pub soften_idle_px: f64,
    pub soften_interacting_px: f64,

    /// Inner radius floor as a fraction of the outer radius.
    /// Default: 0.45
    pub inner_radius_floor: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            reveal_radius_m: 50.0,
            base_cell_px: 64.0,
            reference_zoom: 12.0,
            cell_step_px: 8.0,
            min_cell_px: 24.0,
            max_cell_px: 96.0,
            interacting_cell_scale: 1.5,
            max_clusters_idle: 400,
            max_clusters_interacting: 250,
            rebin_factor: 2.0,
            max_radius_scale: 2.5,
            min_outer_radius_px: 6.0,
            soften_idle_px: 24.0,
            soften_interacting_px: 12.0,
            inner_radius_floor: 0.45,
        }
    }
}

impl ClusterConfig {
    /// Clamp values that would stall or break the aggregation passes.
    pub fn validated(mut self) -> Self {
        if self.max_clusters_idle == 0 || self.max_clusters_interacting == 0 {
            warn!("[ClusterConfig] Cluster cap of 0 raised to 1");
            self.max_clusters_idle = self.max_clusters_idle.max(1);
            self.max_clusters_interacting = self.max_clusters_interacting.max(1);
        }
        if !(self.rebin_factor >= 2.0) {
            warn!(
                "[ClusterConfig] Re-bin factor {} raised to 2.0",
                self.rebin_factor
            );
            self.rebin_factor = 2.0;
        }
        if !(self.min_cell_px >= 1.0) {
            self.min_cell_px = 1.0;
        }
        if !(self.max_cell_px >= self.min_cell_px) {
            self.max_cell_px = self.min_cell_px;
        }
        if !(self.interacting_cell_scale > 0.0) {
            self.interacting_cell_scale = 1.0;
        }
        self.inner_radius_floor = self.inner_radius_floor.clamp(0.0, 1.0);
        self
    }

    /// Grid cell size for a zoom level: coarser zoomed out, finer zoomed in,
    /// coarser again while interacting.
    pub fn cell_size(&self, zoom: f64, interacting: bool) -> f64 {
        let base = (self.base_cell_px - (zoom - self.reference_zoom) * self.cell_step_px)
            .clamp(self.min_cell_px, self.max_cell_px);
        if interacting {
            base * self.interacting_cell_scale
        } else {
            base
        }
    }

    /// Cluster cap for the interaction state.
    pub fn max_clusters(&self, interacting: bool) -> usize {
        if interacting {
            self.max_clusters_interacting
        } else {
            self.max_clusters_idle
        }
    }

    fn soften(&self, interacting: bool) -> f64 {
        if interacting {
            self.soften_interacting_px
        } else {
            self.soften_idle_px
        }
    }
}

// ============================================================================
// Clustering
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct CellAccum {
    sum_x: f64,
    sum_y: f64,
    count: u32,
}

impl CellAccum {
    fn add(&mut self, x: f64, y: f64, count: u32) {
        self.sum_x += x * count as f64;
        self.sum_y += y * count as f64;
        self.count += count;
    }

    fn centroid(&self) -> (f64, f64) {
        let n = self.count.max(1) as f64;
        (self.sum_x / n, self.sum_y / n)
    }
}

type Grid = BTreeMap<(i64, i64), CellAccum>;

/// Viewport clusterer for reveal points.
#[derive(Debug, Clone)]
pub struct RevealClusterer {
    config: ClusterConfig,
}

impl Default for RevealClusterer {
    fn default() -> Self {
        Self::new(ClusterConfig::default())
    }
}

impl RevealClusterer {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config: config.validated(),
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Single-point reveal radius in logical pixels for this viewport.
    ///
    /// Uses the center latitude for every point in the frame.
    pub fn base_radius_px(&self, viewport: &Viewport) -> f64 {
        meters_to_pixels(
            self.config.reveal_radius_m,
            viewport.center.latitude,
            viewport.zoom,
        )
    }

    /// Cluster `points` for one frame.
    pub fn cluster(
        &self,
        projection: &dyn ProjectionProvider,
        viewport: &Viewport,
        points: &[GeoPoint],
        interacting: bool,
    ) -> Vec<RevealCluster> {
        let base_radius = self.base_radius_px(viewport);
        if !(base_radius > 0.0) || !base_radius.is_finite() || points.is_empty() {
            return Vec::new();
        }

        let mut cell = self.config.cell_size(viewport.zoom, interacting);
        let cap = self.config.max_clusters(interacting);

        // Grid origin at (-r, -r) so every surviving coordinate bins to a
        // non-negative cell and repeated doubling converges to one cell.
        let origin = -base_radius;
        let mut grid = Grid::new();
        let mut visible = 0usize;

        for point in points {
            let Some(pixel) = projection.project(point) else {
                continue;
            };
            if !pixel.x.is_finite() || !pixel.y.is_finite() {
                continue;
            }
            if pixel.x + base_radius < 0.0
                || pixel.x - base_radius > viewport.width
                || pixel.y + base_radius < 0.0
                || pixel.y - base_radius > viewport.height
            {
                continue;
            }
            visible += 1;
            grid.entry(cell_key(pixel.x, pixel.y, origin, cell))
                .or_default()
                .add(pixel.x, pixel.y, 1);
        }

        let mut passes = 0;
        while grid.len() > cap {
            cell *= self.config.rebin_factor;
            grid = rebin(&grid, origin, cell);
            passes += 1;
        }

        trace!(
            "[RevealClusterer] {} points, {} visible, {} clusters ({} re-bin passes, cell {:.1}px)",
            points.len(),
            visible,
            grid.len(),
            passes,
            cell
        );

        let soften = self.config.soften(interacting);
        let max_outer = base_radius * self.config.max_radius_scale;

        grid.values()
            .map(|acc| {
                let (x, y) = acc.centroid();
                let grown = base_radius * (acc.count as f64).sqrt();
                let outer = grown.min(max_outer).max(self.config.min_outer_radius_px);
                let inner = (outer - soften).max(outer * self.config.inner_radius_floor);
                RevealCluster {
                    pixel_x: x,
                    pixel_y: y,
                    member_count: acc.count,
                    outer_radius_px: outer,
                    inner_radius_px: inner,
                }
            })
            .collect()
    }
}

#[inline]
fn cell_key(x: f64, y: f64, origin: f64, cell: f64) -> (i64, i64) {
    (
        ((x - origin) / cell).floor() as i64,
        ((y - origin) / cell).floor() as i64,
    )
}

/// Second-level aggregation: bin cell centroids into a coarser grid,
/// weighting each centroid by its member count.
fn rebin(grid: &Grid, origin: f64, cell: f64) -> Grid {
    let mut coarser = Grid::new();
    for acc in grid.values() {
        let (cx, cy) = acc.centroid();
        coarser
            .entry(cell_key(cx, cy, origin, cell))
            .or_default()
            .add(cx, cy, acc.count);
    }
    coarser
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mercator::MercatorViewport;
    use crate::synthetic::jittered_grid;
    use proptest::prelude::*;

    fn seoul_viewport(zoom: f64) -> Viewport {
        Viewport::new(GeoPoint::new(37.5665, 126.9780), zoom, 400.0, 800.0)
    }

    #[test]
    fn test_cell_size_by_zoom() {
        let config = ClusterConfig::default();
        assert_eq!(config.cell_size(12.0, false), 64.0);
        assert_eq!(config.cell_size(15.0, false), 40.0);
        assert_eq!(config.cell_size(20.0, false), 24.0);
        assert_eq!(config.cell_size(6.0, false), 96.0);
        assert_eq!(config.cell_size(12.0, true), 96.0);
    }

    #[test]
    fn test_single_point_cluster() {
        let vp = seoul_viewport(15.0);
        let proj = MercatorViewport::new(vp);
        let clusterer = RevealClusterer::default();

        let clusters = clusterer.cluster(&proj, &vp, &[vp.center], false);
        assert_eq!(clusters.len(), 1);

        let c = clusters[0];
        let base = clusterer.base_radius_px(&vp);
        assert_eq!(c.member_count, 1);
        assert!((c.pixel_x - 200.0).abs() < 1e-6);
        assert!((c.pixel_y - 400.0).abs() < 1e-6);
        assert!((c.outer_radius_px - base.max(6.0)).abs() < 1e-9);
        // Outer ~13 px: the 45% floor wins over (outer - 24)
        assert!((c.inner_radius_px - c.outer_radius_px * 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_offscreen_points_discarded() {
        let vp = seoul_viewport(15.0);
        let proj = MercatorViewport::new(vp);
        let far = GeoPoint::new(35.1796, 129.0756); // Busan
        let clusters = RevealClusterer::default().cluster(&proj, &vp, &[far], false);
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_partially_visible_point_kept() {
        let vp = seoul_viewport(15.0);
        let proj = MercatorViewport::new(vp);
        let clusterer = RevealClusterer::default();
        let radius = clusterer.base_radius_px(&vp);

        // Just past the left edge, but its circle still overlaps the viewport
        let edge = proj.unproject(PixelPoint::new(-radius * 0.5, 400.0));
        assert_eq!(clusterer.cluster(&proj, &vp, &[edge], false).len(), 1);

        let gone = proj.unproject(PixelPoint::new(-radius * 1.5, 400.0));
        assert!(clusterer.cluster(&proj, &vp, &[gone], false).is_empty());
    }

    #[test]
    fn test_nearby_points_merge_and_grow() {
        let vp = seoul_viewport(15.0);
        let proj = MercatorViewport::new(vp);
        let clusterer = RevealClusterer::default();
        let base = clusterer.base_radius_px(&vp);

        let cell_center = proj.unproject(PixelPoint::new(210.0, 410.0));
        let points = vec![cell_center; 4];
        let clusters = clusterer.cluster(&proj, &vp, &points, false);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_count, 4);
        assert!((clusters[0].outer_radius_px - base * 2.0).abs() < 1e-6);

        // Growth is capped at 2.5x the single-point radius
        let many = vec![cell_center; 100];
        let clusters = clusterer.cluster(&proj, &vp, &many, false);
        assert!((clusters[0].outer_radius_px - base * 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_interaction_softens_less() {
        let vp = seoul_viewport(18.0);
        let proj = MercatorViewport::new(vp);
        let clusterer = RevealClusterer::default();

        let idle = clusterer.cluster(&proj, &vp, &[vp.center], false)[0];
        let moving = clusterer.cluster(&proj, &vp, &[vp.center], true)[0];
        // Zoomed in enough that outer - soften beats the 45% floor
        assert!(idle.outer_radius_px > 60.0);
        assert!((idle.inner_radius_px - (idle.outer_radius_px - 24.0)).abs() < 1e-9);
        assert!((moving.inner_radius_px - (moving.outer_radius_px - 12.0)).abs() < 1e-9);
    }

    #[test]
    fn test_rebin_keeps_every_member() {
        let vp = Viewport::new(GeoPoint::new(37.579617, 126.977041), 16.0, 1200.0, 1200.0);
        let proj = MercatorViewport::new(vp);
        let config = ClusterConfig {
            max_clusters_idle: 20,
            ..ClusterConfig::default()
        };
        let clusterer = RevealClusterer::new(config);

        let points = jittered_grid(GeoPoint::new(37.579617, 126.977041), 20, 25);
        let visible = points
            .iter()
            .filter_map(|p| proj.project(p))
            .filter(|p| p.x >= 0.0 && p.x <= 1200.0 && p.y >= 0.0 && p.y <= 1200.0)
            .count();

        let clusters = clusterer.cluster(&proj, &vp, &points, false);
        assert!(clusters.len() <= 20);
        let members: u32 = clusters.iter().map(|c| c.member_count).sum();
        assert!(members as usize >= visible);
    }

    #[test]
    fn test_degenerate_inputs() {
        let vp = seoul_viewport(15.0);
        let proj = MercatorViewport::new(vp);
        let clusterer = RevealClusterer::default();
        assert!(clusterer.cluster(&proj, &vp, &[], false).is_empty());

        let bad = GeoPoint::new(f64::NAN, 0.0);
        assert!(clusterer.cluster(&proj, &vp, &[bad], false).is_empty());
    }

    #[test]
    fn test_validated_config() {
        let config = ClusterConfig {
            max_clusters_idle: 0,
            rebin_factor: 1.0,
            ..ClusterConfig::default()
        }
        .validated();
        assert_eq!(config.max_clusters_idle, 1);
        assert_eq!(config.rebin_factor, 2.0);
    }

    proptest! {
        #[test]
        fn cluster_count_never_exceeds_cap(
            offsets in proptest::collection::vec((-0.02f64..0.02, -0.02f64..0.02), 0..600),
            cap in 1usize..50,
            zoom in 11.0f64..19.0,
            interacting in any::<bool>(),
        ) {
            let center = GeoPoint::new(37.5665, 126.9780);
            let vp = Viewport::new(center, zoom, 390.0, 844.0);
            let proj = MercatorViewport::new(vp);
            let config = ClusterConfig {
                max_clusters_idle: cap,
                max_clusters_interacting: cap,
                ..ClusterConfig::default()
            };
            let points: Vec<GeoPoint> = offsets
                .iter()
                .map(|(dlat, dlng)| GeoPoint::new(center.latitude + dlat, center.longitude + dlng))
                .collect();

            let clusters = RevealClusterer::new(config).cluster(&proj, &vp, &points, interacting);
            prop_assert!(clusters.len() <= cap);
            for c in &clusters {
                prop_assert!(c.inner_radius_px <= c.outer_radius_px);
                prop_assert!(c.member_count >= 1);
            }
        }
    }
}
