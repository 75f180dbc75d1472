//! Identify against brute force, filter/limit semantics and the three-point scenario

mod common;

use common::{PixelView, point, properties, square_styles};
use geo::Coord;
use large_feature_lib::{
    Color, Config, Feature, Filter, IdentifyOptions, MarkerType, PointLayer, RecordingContext,
    StyleRule, Styles, Symbol, VectorMarkerRasterizer,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::collections::BTreeSet;

fn mixed_styles() -> Styles {
    let rule = |kind: usize, shape, width: f32, height: f32, dx: f32, dy: f32| {
        StyleRule::new(
            Filter::from_json(&json!(["==", "kind", kind])).unwrap(),
            Symbol {
                marker_type: Some(shape),
                marker_fill: Some(Color([255, 0, 0, 255])),
                marker_width: Some(width),
                marker_height: Some(height),
                marker_dx: dx,
                marker_dy: dy,
                ..Default::default()
            },
        )
    };
    Styles::new(vec![
        rule(0, MarkerType::Rectangle, 16.0, 16.0, 0.0, 0.0),
        rule(1, MarkerType::Ellipse, 6.0, 24.0, 3.0, -5.0),
        rule(2, MarkerType::Diamond, 30.0, 10.0, -8.0, 2.0),
        // Nothing to draw: never indexed, never hit
        StyleRule::new(
            Filter::from_json(&json!(["==", "kind", 3])).unwrap(),
            Symbol::default(),
        ),
    ])
}

fn random_features(rng: &mut StdRng, count: usize) -> Vec<Feature> {
    (0..count)
        .map(|id| {
            let x = rng.gen_range(0.0..500.0);
            let y = rng.gen_range(0.0..500.0);
            let kind = rng.gen_range(0..5usize);
            Feature::point(x, y, properties(json!({"kind": kind, "id": id})))
        })
        .collect()
}

/// Exact sprite boxes scanned linearly
fn brute_force(
    layer: &PointLayer<RecordingContext>,
    view: &PixelView,
    at: Coord<f64>,
) -> BTreeSet<usize> {
    let points = layer.points().unwrap();
    let scale = view.ratio;
    points
        .records()
        .iter()
        .filter(|r| {
            let left = r.position[0] + scale * (r.offset[0] as f64 - r.size[0] as f64 / 2.0);
            let right = r.position[0] + scale * (r.offset[0] as f64 + r.size[0] as f64 / 2.0);
            let top = r.position[1] + scale * (r.offset[1] as f64 - r.size[1] as f64 / 2.0);
            let bottom = r.position[1] + scale * (r.offset[1] as f64 + r.size[1] as f64 / 2.0);
            at.x >= left && at.x <= right && at.y >= top && at.y <= bottom
        })
        .map(|r| r.feature_index)
        .collect()
}

fn hit_ids(layer: &PointLayer<RecordingContext>, view: &PixelView, at: Coord<f64>) -> BTreeSet<usize> {
    layer
        .identify_hits(view, at, &IdentifyOptions::new())
        .into_iter()
        .map(|hit| hit.feature_index)
        .collect()
}

#[test]
fn test_identify_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut layer = PointLayer::new(
        RecordingContext::new(),
        Config::default(),
        mixed_styles(),
        VectorMarkerRasterizer,
    );
    layer.set_data(random_features(&mut rng, 2_000));

    for ratio in [1.0, 1.7, 4.0] {
        let view = PixelView {
            ratio,
            target_zoom: 0.0,
        };
        layer.draw(&view).unwrap();
        for _ in 0..300 {
            let at = Coord {
                x: rng.gen_range(-20.0..520.0),
                y: rng.gen_range(-20.0..520.0),
            };
            assert_eq!(hit_ids(&layer, &view, at), brute_force(&layer, &view, at), "at {at:?}");
        }
    }
}

#[test]
fn test_identify_on_exact_sprite_edges() {
    let mut layer = PointLayer::new(
        RecordingContext::new(),
        Config::default(),
        mixed_styles(),
        VectorMarkerRasterizer,
    );
    // Kind 2: 30x10 box offset by (-8, 2), i.e. x in [77, 107], y in [97, 107]
    layer.set_data(vec![Feature::point(100.0, 100.0, properties(json!({"kind": 2})))]);
    let view = PixelView::identity();
    layer.draw(&view).unwrap();

    for (x, y, expected) in [
        (77.0, 97.0, true),
        (107.0, 107.0, true),
        (76.9, 100.0, false),
        (100.0, 107.1, false),
        (100.0, 96.9, false),
    ] {
        let found = !layer
            .identify(&view, Coord { x, y }, &IdentifyOptions::new())
            .is_empty();
        assert_eq!(found, expected, "at ({x}, {y})");
    }
}

#[test]
fn test_three_point_round_trip() {
    let mut layer = PointLayer::new(
        RecordingContext::new(),
        Config {
            min_hit_tolerance: 0.0,
            ..Default::default()
        },
        square_styles(16.0),
        VectorMarkerRasterizer,
    );
    layer.set_data(vec![
        point(0.0, 0.0, "a", 0),
        point(10.0, 10.0, "a", 1),
        point(100.0, 100.0, "a", 2),
    ]);
    let view = PixelView::identity();
    layer.draw(&view).unwrap();

    let hits = layer.identify(&view, Coord { x: 10.0, y: 10.0 }, &IdentifyOptions::new());
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].property("id"), Some(&json!(1)));

    assert!(layer
        .identify(&view, Coord { x: 1000.0, y: 1000.0 }, &IdentifyOptions::new())
        .is_empty());
}

#[test]
fn test_limit_returns_subset_of_unlimited() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut layer = PointLayer::new(
        RecordingContext::new(),
        Config::default(),
        square_styles(40.0),
        VectorMarkerRasterizer,
    );
    let features: Vec<Feature> = (0..500)
        .map(|id| point(rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0), "a", id))
        .collect();
    layer.set_data(features);
    let view = PixelView::identity();
    layer.draw(&view).unwrap();

    let at = Coord { x: 50.0, y: 50.0 };
    let unlimited: BTreeSet<usize> = hit_ids(&layer, &view, at);
    assert!(unlimited.len() > 10);
    for k in [1, 3, 10] {
        let limited = layer.identify_hits(&view, at, &IdentifyOptions::new().with_limit(k));
        assert_eq!(limited.len(), k);
        assert!(limited.iter().all(|hit| unlimited.contains(&hit.feature_index)));
    }
    let huge = layer.identify_hits(&view, at, &IdentifyOptions::new().with_limit(10_000));
    assert_eq!(huge.len(), unlimited.len());
}

#[test]
fn test_filter_applies_after_containment() {
    let mut layer = PointLayer::new(
        RecordingContext::new(),
        Config::default(),
        square_styles(16.0),
        VectorMarkerRasterizer,
    );
    layer.set_data((0..20).map(|id| point(id as f64 * 3.0, 0.0, "a", id)).collect());
    let view = PixelView::identity();
    layer.draw(&view).unwrap();

    let at = Coord { x: 30.0, y: 0.0 };
    let unfiltered = hit_ids(&layer, &view, at);
    let odd = IdentifyOptions::new().with_filter(|p| p["id"].as_u64().is_some_and(|id| id % 2 == 1));
    let filtered: BTreeSet<usize> = layer
        .identify_hits(&view, at, &odd)
        .into_iter()
        .map(|hit| hit.feature_index)
        .collect();

    let expected: BTreeSet<usize> = unfiltered.iter().copied().filter(|id| id % 2 == 1).collect();
    assert_eq!(filtered, expected);
    // Far-away odd features never match even though the filter accepts them
    assert!(!filtered.contains(&19));
}

#[test]
fn test_identify_before_first_draw_is_empty() {
    let mut layer = PointLayer::new(
        RecordingContext::new(),
        Config::default(),
        square_styles(16.0),
        VectorMarkerRasterizer,
    );
    layer.set_data(vec![point(0.0, 0.0, "a", 0)]);
    let hits = layer.identify(&PixelView::identity(), Coord { x: 0.0, y: 0.0 }, &IdentifyOptions::new());
    assert!(hits.is_empty());
}

#[test]
fn test_identify_after_set_data_waits_for_redraw() {
    let mut layer = PointLayer::new(
        RecordingContext::new(),
        Config::default(),
        square_styles(16.0),
        VectorMarkerRasterizer,
    );
    let view = PixelView::identity();
    let origin = Coord { x: 0.0, y: 0.0 };
    layer.set_data(vec![point(0.0, 0.0, "a", 100)]);
    layer.draw(&view).unwrap();
    assert_eq!(layer.identify(&view, origin, &IdentifyOptions::new()).len(), 1);

    layer.set_data(vec![point(5000.0, 5000.0, "a", 200)]);
    assert!(layer.identify(&view, origin, &IdentifyOptions::new()).is_empty());
    assert!(layer.identify_hits(&view, origin, &IdentifyOptions::new()).is_empty());

    layer.draw(&view).unwrap();
    assert!(layer.identify(&view, origin, &IdentifyOptions::new()).is_empty());
    let far = layer.identify(&view, Coord { x: 5000.0, y: 5000.0 }, &IdentifyOptions::new());
    assert_eq!(far.len(), 1);
    assert_eq!(far[0].property("id"), Some(&json!(200)));
}
