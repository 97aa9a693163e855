//! Spherical Web Mercator (EPSG:3857) in world pixels.
//!
//! World pixel space at zoom `z` is a square of `TILE_SIZE * 2^z` pixels with
//! the origin at the north-west corner (lat 85.05°, lng -180°). Fractional
//! zoom levels are allowed.

use std::f64::consts::PI;

use super::Vec2;
use crate::bounds::LatLng;

/// Pixel size of one map tile.
pub const TILE_SIZE: f64 = 256.0;

/// Latitude limit of the square Mercator world.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WebMercator {
    pub zoom: f64,
}

impl WebMercator {
    pub fn new(zoom: f64) -> Self {
        Self { zoom }
    }

    /// World size in pixels at this zoom.
    pub fn scale(&self) -> f64 {
        TILE_SIZE * 2f64.powf(self.zoom)
    }

    /// Project a coordinate to world pixels.
    ///
    /// Longitudes outside `[-180, 180]` project outside `[0, scale]` on the x
    /// axis, so wrapped copies land next to the primary world.
    pub fn project(&self, p: LatLng) -> Vec2 {
        let scale = self.scale();
        let lat = p.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
        let x = (p.lng + 180.0) / 360.0 * scale;
        let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) * 0.5 * scale;
        Vec2::new(x, y)
    }

    pub fn unproject(&self, px: Vec2) -> LatLng {
        let scale = self.scale();
        let lng = px.x / scale * 360.0 - 180.0;
        let n = PI * (1.0 - 2.0 * px.y / scale);
        let lat = n.sinh().atan().to_degrees();
        LatLng::new(lat, lng)
    }
}
