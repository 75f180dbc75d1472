//! Host viewport collaborator
//!
//! Layers never talk to a concrete map object. Everything they need from the host (projection
//! at an arbitrary zoom, zoom scales, world-to-pixel distances and the view-projection matrix)
//! goes through [`MapView`]. [`WebMercatorView`] is a self-contained implementation for
//! lon/lat input that the CLI and the tests drive.

use crate::utils;
use geo::Coord;
use glam::{Mat4, Vec3};

/// Depth range (in target-zoom pixels) covered by the orthographic projection
const DEPTH_RANGE: f32 = 1.0e6;

/// Coordinate transforms and zoom state supplied by the host map
pub trait MapView {
    /// Project a geographic coordinate to pixel space at the given zoom
    fn coordinate_to_point(&self, coordinate: Coord<f64>, zoom: f64) -> Coord<f64>;

    /// Scale of the current zoom (resolution relative to the maximum zoom)
    fn scale(&self) -> f64;

    /// Scale at an arbitrary zoom, same unit as [`MapView::scale`]
    fn scale_at_zoom(&self, zoom: f64) -> f64;

    /// Convert a world distance to pixels at the given zoom
    fn distance_to_pixels(&self, world_distance: f64, zoom: f64) -> f64;

    /// Zoom at which geometry is projected into buffers
    ///
    /// Must be stable across small interactive zoom changes; a new value invalidates
    /// every projected buffer.
    fn target_zoom(&self) -> f64;

    /// Matrix mapping target-zoom pixel coordinates (z = height in pixels) to clip space
    fn view_projection_matrix(&self) -> Mat4;
}

/// Web Mercator viewport over lon/lat coordinates
#[derive(Debug, Clone)]
pub struct WebMercatorView {
    /// View center as (x = longitude, y = latitude)
    center: Coord<f64>,
    /// Current (fractional) zoom level
    zoom: f64,
    /// Viewport size in pixels
    size: (f64, f64),
    /// Deepest zoom level, used as the reference for scales
    max_zoom: f64,
    /// Width of the zoom buckets used by the target zoom policy
    zoom_bucket: f64,
}

impl WebMercatorView {
    /// Create a view centered on `center` (lon, lat) with the given pixel size
    pub fn new(center: Coord<f64>, zoom: f64, size: (f64, f64)) -> Self {
        Self {
            center,
            zoom,
            size,
            max_zoom: 22.0,
            zoom_bucket: 4.0,
        }
    }

    /// Set the maximum zoom level
    pub fn with_max_zoom(mut self, max_zoom: f64) -> Self {
        self.max_zoom = max_zoom;
        self
    }

    /// Set the zoom bucket width (buffers are reused across up to `2^bucket` scale change)
    pub fn with_zoom_bucket(mut self, zoom_bucket: f64) -> Self {
        self.zoom_bucket = zoom_bucket;
        self
    }

    pub fn center(&self) -> Coord<f64> {
        self.center
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn size(&self) -> (f64, f64) {
        self.size
    }

    pub fn set_center(&mut self, center: Coord<f64>) {
        self.center = center;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(0.0, self.max_zoom);
    }

    pub fn set_size(&mut self, size: (f64, f64)) {
        self.size = size;
    }

    /// Convert a screen position (pixels from the top-left corner) to lon/lat
    pub fn screen_to_coordinate(&self, screen: Coord<f64>) -> Coord<f64> {
        let center = utils::lon_lat_to_world(self.center, self.zoom);
        utils::world_to_lon_lat(
            Coord {
                x: center.x + screen.x - self.size.0 / 2.0,
                y: center.y + screen.y - self.size.1 / 2.0,
            },
            self.zoom,
        )
    }
}

impl MapView for WebMercatorView {
    fn coordinate_to_point(&self, coordinate: Coord<f64>, zoom: f64) -> Coord<f64> {
        utils::lon_lat_to_world(coordinate, zoom)
    }

    fn scale(&self) -> f64 {
        self.scale_at_zoom(self.zoom)
    }

    fn scale_at_zoom(&self, zoom: f64) -> f64 {
        (self.max_zoom - zoom).exp2()
    }

    fn distance_to_pixels(&self, world_distance: f64, zoom: f64) -> f64 {
        // Evaluated at the view center latitude
        world_distance / utils::ground_resolution(self.center.y, zoom)
    }

    fn target_zoom(&self) -> f64 {
        if self.zoom_bucket <= 0.0 {
            return self.zoom;
        }
        ((self.zoom / self.zoom_bucket).ceil() * self.zoom_bucket).min(self.max_zoom)
    }

    fn view_projection_matrix(&self) -> Mat4 {
        let target = self.target_zoom();
        let center = self.coordinate_to_point(self.center, target);
        // Target-zoom pixels per current-zoom pixel
        let factor = (self.scale_at_zoom(target) / self.scale()) as f32;
        let (width, height) = (self.size.0 as f32, self.size.1 as f32);

        let projection =
            Mat4::orthographic_rh(0.0, width, height, 0.0, -DEPTH_RANGE, DEPTH_RANGE);
        projection
            * Mat4::from_translation(Vec3::new(width / 2.0, height / 2.0, 0.0))
            * Mat4::from_scale(Vec3::splat(factor))
            * Mat4::from_translation(Vec3::new(-center.x as f32, -center.y as f32, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn london() -> WebMercatorView {
        WebMercatorView::new(Coord { x: -0.1278, y: 51.5074 }, 10.0, (800.0, 600.0))
    }

    #[test]
    fn test_projection_origin() {
        let view = london();
        let p = view.coordinate_to_point(Coord { x: -180.0, y: 0.0 }, 0.0);
        assert!(p.x.abs() < 1e-6);
        assert!((p.y - 128.0).abs() < 1e-6);
    }

    #[test]
    fn test_projection_doubles_per_zoom() {
        let view = london();
        let c = Coord { x: 10.0, y: 20.0 };
        let p0 = view.coordinate_to_point(c, 3.0);
        let p1 = view.coordinate_to_point(c, 4.0);
        assert!((p1.x - 2.0 * p0.x).abs() < 1e-6);
        assert!((p1.y - 2.0 * p0.y).abs() < 1e-6);
    }

    #[test]
    fn test_target_zoom_bucketing() {
        let mut view = london().with_zoom_bucket(4.0);
        view.set_zoom(9.0);
        assert_eq!(view.target_zoom(), 12.0);
        view.set_zoom(11.5);
        assert_eq!(view.target_zoom(), 12.0);
        view.set_zoom(12.5);
        assert_eq!(view.target_zoom(), 16.0);

        let fixed = london().with_zoom_bucket(0.0);
        assert_eq!(fixed.target_zoom(), 10.0);
    }

    #[test]
    fn test_scale_ratio_is_bounded_by_bucket() {
        let mut view = london().with_zoom_bucket(2.0);
        for z in [0.5, 3.2, 7.9, 10.0, 13.3] {
            view.set_zoom(z);
            let ratio = view.scale() / view.scale_at_zoom(view.target_zoom());
            assert!(ratio >= 1.0 && ratio < 4.0, "ratio {ratio} at zoom {z}");
        }
    }

    #[test]
    fn test_view_projection_centers_view() {
        let view = london();
        let center = view.coordinate_to_point(view.center(), view.target_zoom());
        let clip = view
            .view_projection_matrix()
            .project_point3(Vec3::new(center.x as f32, center.y as f32, 0.0));
        assert!(clip.x.abs() < 1e-3);
        assert!(clip.y.abs() < 1e-3);
    }

    #[test]
    fn test_screen_to_coordinate_center() {
        let view = london();
        let c = view.screen_to_coordinate(Coord { x: 400.0, y: 300.0 });
        assert!((c.x - view.center().x).abs() < 1e-6);
        assert!((c.y - view.center().y).abs() < 1e-6);
    }

    #[test]
    fn test_distance_to_pixels_grows_with_zoom() {
        let view = london();
        let a = view.distance_to_pixels(10.0, 15.0);
        let b = view.distance_to_pixels(10.0, 16.0);
        assert!((b / a - 2.0).abs() < 1e-9);
    }
}
