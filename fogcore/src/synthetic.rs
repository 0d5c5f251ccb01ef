//! Deterministic point sets for tests and rendering benchmarks.

use crate::{GeoPoint, TrackPoint};

/// Spacing between grid rows (~20 m)
pub const GRID_LAT_STEP: f64 = 0.000_18;
/// Spacing between grid columns (~19 m at 37.5°N)
pub const GRID_LNG_STEP: f64 = 0.000_22;
/// Amplitude of the deterministic jitter (~3 m)
pub const GRID_JITTER: f64 = 0.000_03;

/// A `rows` x `cols` grid centered on `center`, each point nudged by a
/// deterministic sin/cos jitter so clusters are not perfectly aligned.
pub fn jittered_grid(center: GeoPoint, rows: usize, cols: usize) -> Vec<GeoPoint> {
    let mut out = Vec::with_capacity(rows * cols);
    let mid_row = (rows as f64 - 1.0) / 2.0;
    let mid_col = (cols as f64 - 1.0) / 2.0;
    for r in 0..rows {
        for c in 0..cols {
            let idx = (r * cols + c) as f64;
            let lat_offset = (r as f64 - mid_row) * GRID_LAT_STEP + idx.sin() * GRID_JITTER;
            let lng_offset = (c as f64 - mid_col) * GRID_LNG_STEP + idx.cos() * GRID_JITTER;
            out.push(GeoPoint::new(
                center.latitude + lat_offset,
                center.longitude + lng_offset,
            ));
        }
    }
    out
}

/// The 25 x 20 stress grid (500 points) around Gyeongbokgung.
pub fn stress_grid() -> Vec<GeoPoint> {
    jittered_grid(GeoPoint::new(37.579_617, 126.977_041), 20, 25)
}

/// A straight walk due north: `count` samples `step_m` meters apart,
/// `interval_ms` apart in time.
pub fn walk_north(start: TrackPoint, count: usize, step_m: f64, interval_ms: i64) -> Vec<TrackPoint> {
    // One degree of latitude on the haversine sphere
    let meters_per_degree = crate::geo_utils::EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
    let step_deg = step_m / meters_per_degree;
    (0..count)
        .map(|i| {
            TrackPoint::new(
                start.lat + step_deg * i as f64,
                start.lng,
                start.ts + interval_ms * i as i64,
            )
        })
        .collect()
}
