//! Hit-Test Service
//!
//! Two-phase lookup: a coarse index query sized by the largest sprite in the data set, then an
//! exact test against each candidate's own sprite box. Filter and limit apply only to points
//! that passed the exact test, in index return order.

use crate::{Feature, Filter, MapView, ProjectedPoints, Properties};
use geo::Coord;
use std::fmt;

/// Relative slack added to the coarse box so float rounding never loses a candidate
const COARSE_SLACK: f64 = 1e-9;

type PropertyPredicate<'a> = Box<dyn Fn(&Properties) -> bool + 'a>;

/// Optional filter and result limit for an identify query
#[derive(Default)]
pub struct IdentifyOptions<'a> {
    filter: Option<PropertyPredicate<'a>>,
    limit: Option<usize>,
}

impl<'a> IdentifyOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only features whose property bag satisfies `predicate`
    pub fn with_filter(mut self, predicate: impl Fn(&Properties) -> bool + 'a) -> Self {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Keep only features matching a compiled filter expression
    pub fn with_expression(self, filter: Filter) -> Self {
        self.with_filter(move |properties| filter.evaluate(properties))
    }

    /// Stop after `limit` matches
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn accepts(&self, feature: Option<&Feature>) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };
        match feature.and_then(Feature::properties) {
            Some(properties) => filter(properties),
            None => filter(&Properties::new()),
        }
    }
}

impl fmt::Debug for IdentifyOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifyOptions")
            .field("filter", &self.filter.as_ref().map(|_| "<predicate>"))
            .field("limit", &self.limit)
            .finish()
    }
}

/// One identify match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Index of the feature in the layer's feature list
    pub feature_index: usize,
    /// Index of the projected point record
    pub record_index: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ProjectedPoints {
    /// Points whose sprite covers `coordinate` in the current view
    ///
    /// `features` is the list the points were built from; it is only consulted for filter
    /// evaluation. Returns an empty list when nothing was indexed.
    pub fn identify(
        &self,
        view: &dyn MapView,
        coordinate: Coord<f64>,
        features: &[Feature],
        options: &IdentifyOptions<'_>,
    ) -> Vec<Hit> {
        let Some(index) = self.index() else {
            return Vec::new();
        };
        if options.limit == Some(0) {
            return Vec::new();
        }

        let point = view.coordinate_to_point(coordinate, self.target_zoom());
        let point = [point.x, point.y];
        let scale = self.scale_factor(view);
        let [max_w, max_h] = self.max_sprite_size();
        let [off_x, off_y] = self.max_sprite_offset();
        let half_w = (scale * (max_w as f64 / 2.0 + off_x as f64)).max(self.min_tolerance())
            * (1.0 + COARSE_SLACK);
        let half_h = (scale * (max_h as f64 / 2.0 + off_y as f64)).max(self.min_tolerance())
            * (1.0 + COARSE_SLACK);

        let records = self.records();
        let mut hits = Vec::new();
        for record_index in index.range(
            [point[0] - half_w, point[1] - half_h],
            [point[0] + half_w, point[1] + half_h],
        ) {
            let record = &records[record_index];
            if !record.contains(point, scale) {
                continue;
            }
            if !options.accepts(features.get(record.feature_index)) {
                continue;
            }
            hits.push(Hit {
                feature_index: record.feature_index,
                record_index,
            });
            if options.limit.is_some_and(|limit| hits.len() >= limit) {
                break;
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{PixelView, square_marker_styles};
    use crate::{Atlas, Resources, VectorMarkerRasterizer};
    use serde_json::json;

    fn features(coords: &[(f64, f64)]) -> Vec<Feature> {
        coords
            .iter()
            .enumerate()
            .map(|(i, (x, y))| {
                let properties = json!({"kind": "a", "id": i}).as_object().cloned().unwrap();
                Feature::point(*x, *y, properties)
            })
            .collect()
    }

    fn build(features: &[Feature]) -> ProjectedPoints {
        let styles = square_marker_styles(&[("a", 16.0)]);
        let atlas = Atlas::build(&styles, &VectorMarkerRasterizer, &Resources::new());
        ProjectedPoints::build(features, &styles, &atlas, &PixelView::identity())
    }

    fn ids(hits: &[Hit]) -> Vec<usize> {
        let mut ids: Vec<usize> = hits.iter().map(|h| h.feature_index).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_identify_exact_hit() {
        let features = features(&[(0.0, 0.0), (10.0, 10.0), (100.0, 100.0)]);
        let points = build(&features).with_min_tolerance(0.0);
        let view = PixelView::identity();

        let hits = points.identify(&view, Coord { x: 10.0, y: 10.0 }, &features, &IdentifyOptions::new());
        assert_eq!(ids(&hits), vec![1]);

        let hits = points.identify(&view, Coord { x: 1000.0, y: 1000.0 }, &features, &IdentifyOptions::new());
        assert!(hits.is_empty());
    }

    #[test]
    fn test_identify_overlapping_sprites() {
        let features = features(&[(0.0, 0.0), (10.0, 10.0), (100.0, 100.0)]);
        let points = build(&features);
        let hits = points.identify(
            &PixelView::identity(),
            Coord { x: 5.0, y: 5.0 },
            &features,
            &IdentifyOptions::new(),
        );
        assert_eq!(ids(&hits), vec![0, 1]);
    }

    #[test]
    fn test_identify_scales_with_zoom_ratio() {
        let features = features(&[(0.0, 0.0)]);
        let points = build(&features);
        let query = Coord { x: 12.0, y: 0.0 };
        assert!(points.identify(&PixelView::identity(), query, &features, &IdentifyOptions::new()).is_empty());
        // Zoomed out 2x: the sprite now covers 16 target pixels on each side
        let hits = points.identify(&PixelView::zoomed_out(2.0), query, &features, &IdentifyOptions::new());
        assert_eq!(ids(&hits), vec![0]);
    }

    #[test]
    fn test_identify_filter_and_limit() {
        let features = features(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
        let points = build(&features);
        let view = PixelView::identity();
        let at = Coord { x: 1.5, y: 1.5 };

        let all = points.identify(&view, at, &features, &IdentifyOptions::new());
        assert_eq!(ids(&all), vec![0, 1, 2, 3]);

        let even = IdentifyOptions::new()
            .with_filter(|p| p.get("id").and_then(|v| v.as_u64()).is_some_and(|id| id % 2 == 0));
        assert_eq!(ids(&points.identify(&view, at, &features, &even)), vec![0, 2]);

        let limited = points.identify(&view, at, &features, &IdentifyOptions::new().with_limit(2));
        assert_eq!(limited.len(), 2);
        assert!(limited.iter().all(|hit| all.contains(hit)));

        assert!(points.identify(&view, at, &features, &IdentifyOptions::new().with_limit(0)).is_empty());
    }

    #[test]
    fn test_identify_with_filter_expression() {
        let features = features(&[(0.0, 0.0), (1.0, 1.0)]);
        let points = build(&features);
        let filter = Filter::from_json(&json!(["==", "id", 1])).unwrap();
        let hits = points.identify(
            &PixelView::identity(),
            Coord { x: 0.5, y: 0.5 },
            &features,
            &IdentifyOptions::new().with_expression(filter),
        );
        assert_eq!(ids(&hits), vec![1]);
    }

    #[test]
    fn test_identify_without_index_is_empty() {
        let points = build(&[]);
        let hits = points.identify(
            &PixelView::identity(),
            Coord { x: 0.0, y: 0.0 },
            &[],
            &IdentifyOptions::new(),
        );
        assert!(hits.is_empty());
    }
}
