//! Fog mask rasterization.
//!
//! Paints a viewport-filling fog layer and erases every [`RevealCluster`]
//! from it with a radial fade: fully cleared inside the inner radius, full
//! fog at the outer radius, linear in between. Erasing is destination-out
//! compositing (`dst_alpha *= 1 - erase`), so overlapping cutouts union
//! instead of darkening where they meet.
//!
//! The surface is sized in device pixels (`logical size x device pixel
//! ratio`) and only reallocated when that size changes.

use std::io::Cursor;

use image::{ImageBuffer, RgbaImage};
use log::debug;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::cluster::RevealCluster;
use crate::Result;

/// Configuration for the fog layer.
#[derive(Debug, Clone)]
pub struct MaskConfig {
    /// Fog color (RGBA, straight alpha)
    pub fog_color: [u8; 4],
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            // Black at 75% opacity
            fog_color: [0, 0, 0, 191],
        }
    }
}

/// A cutout in device pixels.
#[derive(Debug, Clone, Copy)]
struct DeviceCutout {
    x: f32,
    y: f32,
    inner: f32,
    outer: f32,
}

impl DeviceCutout {
    fn from_cluster(cluster: &RevealCluster, scale: f64) -> Option<Self> {
        let outer = (cluster.outer_radius_px * scale) as f32;
        let x = (cluster.pixel_x * scale) as f32;
        let y = (cluster.pixel_y * scale) as f32;
        if !(outer > 0.0) || !outer.is_finite() || !x.is_finite() || !y.is_finite() {
            return None;
        }
        let inner = ((cluster.inner_radius_px * scale) as f32).max(0.0).min(outer);
        Some(Self { x, y, inner, outer })
    }

    /// Fraction of fog removed at distance `d` from the center.
    #[inline]
    fn erase_at(&self, d: f32) -> f32 {
        if d <= self.inner {
            1.0
        } else if d >= self.outer {
            0.0
        } else {
            (self.outer - d) / (self.outer - self.inner)
        }
    }
}

/// Frame-scoped fog renderer owning its drawing surface.
#[derive(Debug)]
pub struct MaskRenderer {
    config: MaskConfig,
    surface: RgbaImage,
    logical_width: f64,
    logical_height: f64,
    device_pixel_ratio: f64,
    reallocations: u64,
}

impl MaskRenderer {
    pub fn new(config: MaskConfig) -> Self {
        Self {
            config,
            surface: ImageBuffer::new(1, 1),
            logical_width: 0.0,
            logical_height: 0.0,
            device_pixel_ratio: 1.0,
            reallocations: 0,
        }
    }

    /// Size the surface for a logical viewport at a device pixel ratio.
    ///
    /// Returns true when the surface was reallocated.
    pub fn ensure_surface(&mut self, logical_width: f64, logical_height: f64, device_pixel_ratio: f64) -> bool {
        let dpr = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        let target_width = (logical_width * dpr).round().max(1.0) as u32;
        let target_height = (logical_height * dpr).round().max(1.0) as u32;

        self.logical_width = logical_width;
        self.logical_height = logical_height;
        self.device_pixel_ratio = dpr;

        if self.surface.width() == target_width && self.surface.height() == target_height {
            return false;
        }

        debug!(
            "[MaskRenderer] Resizing surface {}x{} -> {}x{} (dpr {})",
            self.surface.width(),
            self.surface.height(),
            target_width,
            target_height,
            dpr
        );
        self.surface = ImageBuffer::new(target_width, target_height);
        self.reallocations += 1;
        true
    }

    /// Redraw the fog layer with every cluster cut out.
    ///
    /// Cluster coordinates are logical pixels; they are scaled by the device
    /// pixel ratio here.
    pub fn draw(&mut self, clusters: &[RevealCluster]) {
        let scale = self.device_pixel_ratio;
        let cutouts: Vec<DeviceCutout> = clusters
            .iter()
            .filter_map(|c| DeviceCutout::from_cluster(c, scale))
            .collect();

        let fog = self.config.fog_color;
        let stride = self.surface.width() as usize * 4;
        let buffer: &mut [u8] = &mut self.surface;

        #[cfg(feature = "parallel")]
        buffer
            .par_chunks_exact_mut(stride)
            .enumerate()
            .for_each(|(y, row)| paint_row(row, y, fog, &cutouts));

        #[cfg(not(feature = "parallel"))]
        buffer
            .chunks_exact_mut(stride)
            .enumerate()
            .for_each(|(y, row)| paint_row(row, y, fog, &cutouts));
    }

    /// The current frame.
    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    /// Surface size in device pixels.
    pub fn device_size(&self) -> (u32, u32) {
        self.surface.dimensions()
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    pub fn logical_size(&self) -> (f64, f64) {
        (self.logical_width, self.logical_height)
    }

    /// Number of surface reallocations so far.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Encode the current frame as PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut png_data = Vec::new();
        let mut cursor = Cursor::new(&mut png_data);
        self.surface.write_to(&mut cursor, image::ImageFormat::Png)?;
        Ok(png_data)
    }
}

impl Default for MaskRenderer {
    fn default() -> Self {
        Self::new(MaskConfig::default())
    }
}

/// Fill one row with fog, then erase every cutout crossing it.
fn paint_row(row: &mut [u8], y: usize, fog: [u8; 4], cutouts: &[DeviceCutout]) {
    for px in row.chunks_exact_mut(4) {
        px.copy_from_slice(&fog);
    }
    if fog[3] == 0 {
        return;
    }

    let width = (row.len() / 4) as i64;
    let py = y as f32 + 0.5;

    for cut in cutouts {
        let dy = py - cut.y;
        if dy.abs() >= cut.outer {
            continue;
        }
        let half_span = (cut.outer * cut.outer - dy * dy).sqrt();
        let x0 = ((cut.x - half_span).floor() as i64).max(0);
        let x1 = ((cut.x + half_span).ceil() as i64).min(width - 1);

        for x in x0..=x1 {
            let dx = x as f32 + 0.5 - cut.x;
            let erase = cut.erase_at((dx * dx + dy * dy).sqrt());
            if erase <= 0.0 {
                continue;
            }
            let alpha = &mut row[x as usize * 4 + 3];
            *alpha = (*alpha as f32 * (1.0 - erase)).round() as u8;
        }
    }
}
