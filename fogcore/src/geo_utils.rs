//! Geographic utilities: great-circle distance and map scale.

use std::f64::consts::PI;

use crate::{GeoPoint, TrackPoint};

/// Spherical Earth radius used for admission distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Web Mercator ground resolution at the equator, zoom 0 (meters per pixel).
pub const MERCATOR_METERS_PER_PIXEL: f64 = 156_543.033_92;

#[inline]
fn to_rad(degrees: f64) -> f64 {
    // Matches the reference formula bit for bit; to_radians() rounds differently
    (degrees * PI) / 180.0
}

/// Haversine distance between two points in meters.
///
/// `2R * asin(sqrt(sin²(Δlat/2) + cos(lat1) * cos(lat2) * sin²(Δlng/2)))`
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = to_rad(b.latitude - a.latitude);
    let d_lng = to_rad(b.longitude - a.longitude);
    let lat1 = to_rad(a.latitude);
    let lat2 = to_rad(b.latitude);

    let sin_lat = (d_lat / 2.0).sin();
    let sin_lng = (d_lng / 2.0).sin();
    let h = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Haversine distance between two track points in meters.
#[inline]
pub fn track_distance(a: &TrackPoint, b: &TrackPoint) -> f64 {
    haversine_distance(&a.position(), &b.position())
}

/// Admission gate: the first point is always kept, later points only when
/// at least `min_meters` away from the previously admitted one.
pub fn should_admit(previous: Option<&TrackPoint>, next: &TrackPoint, min_meters: f64) -> bool {
    match previous {
        None => true,
        Some(prev) => track_distance(prev, next) >= min_meters,
    }
}

/// Web Mercator meters per pixel at a latitude and (fractional) zoom.
pub fn meters_per_pixel(latitude: f64, zoom: f64) -> f64 {
    MERCATOR_METERS_PER_PIXEL * to_rad(latitude).cos() / 2.0_f64.powf(zoom)
}

/// Convert a ground distance to pixels, or 0 when the scale is degenerate.
pub fn meters_to_pixels(meters: f64, latitude: f64, zoom: f64) -> f64 {
    let mpp = meters_per_pixel(latitude, zoom);
    if mpp > 0.0 && mpp.is_finite() {
        meters / mpp
    } else {
        0.0
    }
}
