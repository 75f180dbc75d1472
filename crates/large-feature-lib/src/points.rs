//! Point Projector & Indexer
//!
//! Points are projected once at the view's target zoom, not the live zoom, so the same
//! vertex buffer serves every zoom in the target's bucket; the remaining difference is a
//! uniform scale factor applied at draw time. Each surviving point becomes a
//! [`PointRecord`] in an arena, and the spatial index stores arena indices only.

use crate::{Atlas, Feature, MapView, Shape, SpatialIndex, Styles};

/// Floats per vertex: `x, y, sprite_index`
pub const POINT_VERTEX_STRIDE: usize = 3;

/// Identify half-extent floor used unless overridden
const DEFAULT_MIN_TOLERANCE: f64 = 1.0;

/// One projected point, immutable until the next rebuild
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    /// Position in target-zoom pixel space
    pub position: [f64; 2],
    /// Sprite size in screen pixels
    pub size: [f32; 2],
    /// Sprite anchor offset in screen pixels
    pub offset: [f32; 2],
    /// Style (and sprite) index
    pub style_index: usize,
    /// Index of the source feature in the layer's feature list
    pub feature_index: usize,
}

impl PointRecord {
    /// Exact sprite box around the record at the given current/target scale ratio
    pub fn sprite_bounds(&self, scale: f64) -> ([f64; 2], [f64; 2]) {
        let half = [self.size[0] as f64 / 2.0, self.size[1] as f64 / 2.0];
        let offset = [self.offset[0] as f64, self.offset[1] as f64];
        (
            [
                self.position[0] + scale * (offset[0] - half[0]),
                self.position[1] + scale * (offset[1] - half[1]),
            ],
            [
                self.position[0] + scale * (offset[0] + half[0]),
                self.position[1] + scale * (offset[1] + half[1]),
            ],
        )
    }

    /// Whether a target-zoom pixel position falls inside the exact sprite box
    pub fn contains(&self, point: [f64; 2], scale: f64) -> bool {
        let (min, max) = self.sprite_bounds(scale);
        point[0] >= min[0] && point[0] <= max[0] && point[1] >= min[1] && point[1] <= max[1]
    }
}

/// Vertex data, record arena and spatial index for one point data set
#[derive(Debug, Clone)]
pub struct ProjectedPoints {
    vertices: Vec<f32>,
    records: Vec<PointRecord>,
    max_sprite_size: [f32; 2],
    max_offset: [f32; 2],
    target_zoom: f64,
    min_tolerance: f64,
    index: Option<SpatialIndex>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ProjectedPoints {
    /// Project, classify and index every point feature
    ///
    /// Malformed features, polygons, unmatched features and features whose style has no
    /// sprite are dropped.
    pub fn build(features: &[Feature], styles: &Styles, atlas: &Atlas, view: &dyn MapView) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("points::build");

        let target_zoom = view.target_zoom();
        let mut records = Vec::new();
        let mut max_sprite_size = [0.0f32; 2];
        let mut max_offset = [0.0f32; 2];
        let (mut malformed, mut unmatched) = (0usize, 0usize);

        for (feature_index, feature) in features.iter().enumerate() {
            let coordinate = match feature.shape() {
                Some(Shape::Point(coordinate)) => coordinate,
                _ => {
                    tracing::trace!("Skipping feature {} without point geometry", feature_index);
                    malformed += 1;
                    continue;
                }
            };
            let Some((style_index, sprite)) = styles
                .classify_feature(feature)
                .and_then(|style| Some((style, atlas.sprite(style)?)))
            else {
                unmatched += 1;
                continue;
            };

            let projected = view.coordinate_to_point(coordinate, target_zoom);
            for axis in 0..2 {
                max_sprite_size[axis] = max_sprite_size[axis].max(sprite.size[axis]);
                max_offset[axis] = max_offset[axis].max(sprite.offset[axis].abs());
            }
            records.push(PointRecord {
                position: [projected.x, projected.y],
                size: sprite.size,
                offset: sprite.offset,
                style_index,
                feature_index,
            });
        }

        let mut vertices = Vec::with_capacity(records.len() * POINT_VERTEX_STRIDE);
        for record in &records {
            vertices.extend_from_slice(&[
                record.position[0] as f32,
                record.position[1] as f32,
                record.style_index as f32,
            ]);
        }

        let index = if records.is_empty() {
            None
        } else {
            Some(SpatialIndex::build(records.iter().map(|r| r.position)))
        };

        tracing::debug!(
            "Projected {} points at zoom {} ({} malformed, {} unstyled)",
            records.len(),
            target_zoom,
            malformed,
            unmatched
        );

        Self {
            vertices,
            records,
            max_sprite_size,
            max_offset,
            target_zoom,
            min_tolerance: DEFAULT_MIN_TOLERANCE,
            index,
        }
    }

    /// Override the smallest identify half-extent, in pixels
    pub fn with_min_tolerance(mut self, min_tolerance: f64) -> Self {
        self.min_tolerance = min_tolerance.max(0.0);
        self
    }

    /// Interleaved `x, y, sprite_index` vertex data
    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    /// Vertex data as bytes, ready for upload
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn records(&self) -> &[PointRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Largest sprite width and height across all records
    pub fn max_sprite_size(&self) -> [f32; 2] {
        self.max_sprite_size
    }

    /// Largest absolute sprite offset per axis across all records
    pub fn max_sprite_offset(&self) -> [f32; 2] {
        self.max_offset
    }

    /// Zoom the positions were projected at
    pub fn target_zoom(&self) -> f64 {
        self.target_zoom
    }

    pub fn min_tolerance(&self) -> f64 {
        self.min_tolerance
    }

    /// Spatial index, absent when no point survived
    pub fn index(&self) -> Option<&SpatialIndex> {
        self.index.as_ref()
    }

    /// Ratio between the current zoom scale and the target zoom scale
    pub fn scale_factor(&self, view: &dyn MapView) -> f64 {
        view.scale() / view.scale_at_zoom(self.target_zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{PixelView, square_marker_styles};
    use crate::{Properties, Resources, VectorMarkerRasterizer};
    use serde_json::json;

    fn point(x: f64, y: f64, kind: &str) -> Feature {
        Feature::point(x, y, json!({"kind": kind}).as_object().cloned().unwrap())
    }

    #[test]
    fn test_build_records_and_vertices() {
        let styles = square_marker_styles(&[("a", 16.0), ("b", 8.0)]);
        let atlas = Atlas::build(&styles, &VectorMarkerRasterizer, &Resources::new());
        let features = vec![point(1.0, 2.0, "a"), point(3.0, 4.0, "b")];
        let points = ProjectedPoints::build(&features, &styles, &atlas, &PixelView::identity());

        assert_eq!(points.len(), 2);
        assert_eq!(points.vertices(), &[1.0, 2.0, 0.0, 3.0, 4.0, 1.0]);
        assert_eq!(points.max_sprite_size(), [16.0, 16.0]);
        assert_eq!(points.records()[1].feature_index, 1);
        assert_eq!(points.index().map(SpatialIndex::len), Some(2));
        assert_eq!(points.vertex_bytes().len(), 6 * 4);
    }

    #[test]
    fn test_unmatched_and_malformed_dropped() {
        let styles = square_marker_styles(&[("a", 16.0)]);
        let atlas = Atlas::build(&styles, &VectorMarkerRasterizer, &Resources::new());
        let features = vec![
            point(0.0, 0.0, "zzz"),
            Feature::point(f64::NAN, 0.0, Properties::new()),
            point(5.0, 5.0, "a"),
        ];
        let points = ProjectedPoints::build(&features, &styles, &atlas, &PixelView::identity());
        assert_eq!(points.len(), 1);
        assert_eq!(points.records()[0].feature_index, 2);
    }

    #[test]
    fn test_empty_input_has_no_index() {
        let styles = square_marker_styles(&[("a", 16.0)]);
        let atlas = Atlas::build(&styles, &VectorMarkerRasterizer, &Resources::new());
        let points = ProjectedPoints::build(&[], &styles, &atlas, &PixelView::identity());
        assert!(points.is_empty());
        assert!(points.vertices().is_empty());
        assert!(points.index().is_none());
    }

    #[test]
    fn test_style_without_sprite_dropped() {
        let styles = square_marker_styles(&[("a", 16.0)]);
        let atlas = Atlas::empty(styles.len());
        let points = ProjectedPoints::build(
            &[point(0.0, 0.0, "a")],
            &styles,
            &atlas,
            &PixelView::identity(),
        );
        assert!(points.is_empty());
    }

    #[test]
    fn test_record_bounds_with_offset() {
        let record = PointRecord {
            position: [100.0, 100.0],
            size: [10.0, 20.0],
            offset: [5.0, 0.0],
            style_index: 0,
            feature_index: 0,
        };
        assert_eq!(record.sprite_bounds(1.0), ([100.0, 90.0], [110.0, 110.0]));
        assert_eq!(record.sprite_bounds(2.0), ([100.0, 80.0], [120.0, 120.0]));
        assert!(record.contains([109.0, 95.0], 1.0));
        assert!(!record.contains([99.0, 95.0], 1.0));
    }

    #[test]
    fn test_rebuild_is_byte_identical() {
        let styles = square_marker_styles(&[("a", 16.0), ("b", 8.0)]);
        let atlas = Atlas::build(&styles, &VectorMarkerRasterizer, &Resources::new());
        let features: Vec<Feature> = (0..100)
            .map(|i| point(i as f64 * 1.5, (i * 7 % 13) as f64, if i % 2 == 0 { "a" } else { "b" }))
            .collect();
        let view = PixelView::identity();
        let first = ProjectedPoints::build(&features, &styles, &atlas, &view);
        let second = ProjectedPoints::build(&features, &styles, &atlas, &view);
        assert_eq!(first.vertex_bytes(), second.vertex_bytes());
    }
}
