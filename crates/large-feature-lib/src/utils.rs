//! Web Mercator math in world-pixel space
//!
//! World pixels grow right and down from the north-west corner of the map. At zoom `z` the
//! whole world is `TILE_SIZE * 2^z` pixels wide, so doubling per zoom level is exact.

use geo::Coord;
use std::f64::consts::PI;

/// WGS84 equatorial radius
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

pub const EARTH_CIRCUMFERENCE_METERS: f64 = 2.0 * PI * EARTH_RADIUS_METERS;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Tile edge in pixels; zoom 0 renders the whole world into one tile of this size
pub const TILE_SIZE: f64 = 256.0;

/// Width (and height) of the world in pixels at `zoom`
#[inline(always)]
pub fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * zoom.exp2()
}

/// Project lon/lat degrees (`x` = longitude, `y` = latitude) to world pixels
///
/// Latitude is clamped to ±[`MAX_LATITUDE`].
#[inline(always)]
pub fn lon_lat_to_world(coordinate: Coord<f64>, zoom: f64) -> Coord<f64> {
    let size = world_size(zoom);
    let lat = coordinate.y.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let u = (coordinate.x + 180.0) / 360.0;
    let v = 0.5 - (lat.tan() + lat.cos().recip()).ln() / (2.0 * PI);
    Coord {
        x: u * size,
        y: v * size,
    }
}

/// Inverse of [`lon_lat_to_world`]
#[inline(always)]
pub fn world_to_lon_lat(point: Coord<f64>, zoom: f64) -> Coord<f64> {
    let size = world_size(zoom);
    let lon = point.x / size * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * point.y / size)).sinh().atan().to_degrees();
    Coord { x: lon, y: lat }
}

/// Ground meters covered by one world pixel at `latitude`
pub fn ground_resolution(latitude: f64, zoom: f64) -> f64 {
    let lat = latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    EARTH_CIRCUMFERENCE_METERS * lat.cos() / world_size(zoom)
}
