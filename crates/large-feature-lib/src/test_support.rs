//! Shared fixtures for unit tests

use crate::{Color, Filter, MapView, MarkerType, StyleRule, Styles, Symbol};
use geo::Coord;
use glam::Mat4;
use serde_json::json;

/// View whose projection is the identity at every zoom, with a configurable zoom ratio
pub struct PixelView {
    pub scale: f64,
    pub target_scale: f64,
    pub target_zoom: f64,
}

impl PixelView {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            target_scale: 1.0,
            target_zoom: 0.0,
        }
    }

    /// Current zoom `ratio` times further out than the target zoom
    pub fn zoomed_out(ratio: f64) -> Self {
        Self {
            scale: ratio,
            ..Self::identity()
        }
    }
}

impl MapView for PixelView {
    fn coordinate_to_point(&self, coordinate: Coord<f64>, _zoom: f64) -> Coord<f64> {
        coordinate
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn scale_at_zoom(&self, _zoom: f64) -> f64 {
        self.target_scale
    }

    fn distance_to_pixels(&self, world_distance: f64, _zoom: f64) -> f64 {
        world_distance
    }

    fn target_zoom(&self) -> f64 {
        self.target_zoom
    }

    fn view_projection_matrix(&self) -> Mat4 {
        Mat4::IDENTITY
    }
}

/// One filled square marker rule per `(kind, size)`, matched on the `kind` property
pub fn square_marker_styles(kinds: &[(&str, f32)]) -> Styles {
    Styles::new(
        kinds
            .iter()
            .map(|(kind, size)| {
                let filter = Filter::from_json(&json!(["==", "kind", kind])).unwrap();
                let symbol = Symbol {
                    marker_type: Some(MarkerType::Rectangle),
                    marker_fill: Some(Color([255, 255, 255, 255])),
                    marker_width: Some(*size),
                    marker_height: Some(*size),
                    polygon_fill: Some(Color([200, 100, 50, 255])),
                    ..Default::default()
                };
                StyleRule::new(filter, symbol)
            })
            .collect(),
    )
}
