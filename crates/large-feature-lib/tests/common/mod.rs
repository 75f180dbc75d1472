//! Fixtures shared by the integration tests

#![allow(dead_code)]

use geo::Coord;
use glam::Mat4;
use large_feature_lib::{
    Color, Feature, Filter, MapView, MarkerType, Properties, StyleRule, Styles, Symbol,
};
use serde_json::json;

/// Identity projection with a configurable current/target zoom ratio
#[derive(Debug, Clone, Copy)]
pub struct PixelView {
    pub ratio: f64,
    pub target_zoom: f64,
}

impl PixelView {
    pub fn identity() -> Self {
        Self {
            ratio: 1.0,
            target_zoom: 0.0,
        }
    }
}

impl MapView for PixelView {
    fn coordinate_to_point(&self, coordinate: Coord<f64>, _zoom: f64) -> Coord<f64> {
        coordinate
    }

    fn scale(&self) -> f64 {
        self.ratio
    }

    fn scale_at_zoom(&self, _zoom: f64) -> f64 {
        1.0
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

pub fn properties(value: serde_json::Value) -> Properties {
    value.as_object().cloned().unwrap_or_default()
}

/// Rule matching `kind == kind` with a filled square marker of the given size
pub fn square_rule(kind: &str, size: f32) -> StyleRule {
    StyleRule::new(
        Filter::from_json(&json!(["==", "kind", kind])).unwrap(),
        Symbol {
            marker_type: Some(MarkerType::Rectangle),
            marker_fill: Some(Color([0, 128, 255, 255])),
            marker_width: Some(size),
            marker_height: Some(size),
            polygon_fill: Some(Color([180, 180, 180, 255])),
            ..Default::default()
        },
    )
}

pub fn square_styles(size: f32) -> Styles {
    Styles::new(vec![square_rule("a", size)])
}

pub fn point(x: f64, y: f64, kind: &str, id: usize) -> Feature {
    Feature::point(x, y, properties(json!({"kind": kind, "id": id})))
}

pub fn footprint(coords: &[(f64, f64)], kind: &str, height: f64) -> Feature {
    let ring = coords.iter().map(|&(x, y)| Coord { x, y }).collect();
    Feature::polygon(vec![ring], properties(json!({"kind": kind, "height": height})))
}
