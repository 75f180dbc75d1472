//! Extrusion Geometry Builder - lit wall + roof meshes from polygon footprints
//!
//! Footprints are projected at the target zoom and oriented (outer ring counter-clockwise,
//! holes clockwise) before any normal is computed, so every wall faces away from the solid
//! regardless of input winding. The whole data set lands in one mesh with 32-bit indices
//! and a per-vertex style index, drawable with a single indexed call.

use crate::{Config, Feature, MapView, Shape, Styles};
use geo::orient::{Direction, Orient};
use geo::{Coord, MapCoords, Polygon};
use serde_json::Value;

/// Flat buffers for one extruded data set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtrusionMesh {
    /// `x, y, z` per vertex; x/y in target-zoom pixels, z = height in pixels
    pub positions: Vec<f32>,
    /// `nx, ny, nz` per vertex
    pub normals: Vec<f32>,
    /// Style index per vertex
    pub styles: Vec<f32>,
    /// Three indices per triangle
    pub indices: Vec<u32>,
}

impl ExtrusionMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    pub fn style_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.styles)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    fn push_vertex(&mut self, position: [f32; 3], normal: [f32; 3], style: f32) -> u32 {
        let index = self.vertex_count() as u32;
        self.positions.extend_from_slice(&position);
        self.normals.extend_from_slice(&normal);
        self.styles.push(style);
        index
    }

    /// Roof and walls of one footprint given in pixel space
    ///
    /// `rings` must be oriented (outer counter-clockwise, holes clockwise), open and free
    /// of consecutive duplicates.
    fn push_footprint(&mut self, rings: &[Vec<Coord<f64>>], height: f32, style: f32) {
        let roof = triangulate(rings);
        let base = self.vertex_count() as u32;
        for ring in rings {
            for c in ring {
                self.push_vertex([c.x as f32, c.y as f32, height], [0.0, 0.0, 1.0], style);
            }
        }
        self.indices.extend(roof.iter().map(|i| base + *i as u32));

        for ring in rings {
            for (i, a) in ring.iter().enumerate() {
                let b = ring[(i + 1) % ring.len()];
                let (dx, dy) = (b.x - a.x, b.y - a.y);
                let length = dx.hypot(dy);
                if !(length > 0.0 && length.is_finite()) {
                    continue;
                }
                let normal = [(dy / length) as f32, (-dx / length) as f32, 0.0];
                let v0 = self.push_vertex([a.x as f32, a.y as f32, 0.0], normal, style);
                let v1 = self.push_vertex([b.x as f32, b.y as f32, 0.0], normal, style);
                let v2 = self.push_vertex([b.x as f32, b.y as f32, height], normal, style);
                let v3 = self.push_vertex([a.x as f32, a.y as f32, height], normal, style);
                self.indices.extend_from_slice(&[v0, v1, v2, v0, v2, v3]);
            }
        }
    }
}

/// Roof triangles as indices into the concatenated rings, all counter-clockwise
fn triangulate(rings: &[Vec<Coord<f64>>]) -> Vec<usize> {
    let mut flat = Vec::with_capacity(rings.iter().map(|r| r.len() * 2).sum());
    let mut hole_indices = Vec::with_capacity(rings.len().saturating_sub(1));
    let mut coords = Vec::new();
    for (i, ring) in rings.iter().enumerate() {
        if i > 0 {
            hole_indices.push(coords.len());
        }
        for c in ring {
            flat.extend_from_slice(&[c.x, c.y]);
            coords.push(*c);
        }
    }

    let mut triangles = match earcutr::earcut(&flat, &hole_indices, 2) {
        Ok(triangles) => triangles,
        Err(e) => {
            tracing::trace!("Roof triangulation failed: {:?}", e);
            return Vec::new();
        }
    };
    for triangle in triangles.chunks_exact_mut(3) {
        let (a, b, c) = (coords[triangle[0]], coords[triangle[1]], coords[triangle[2]]);
        let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
        if cross < 0.0 {
            triangle.swap(1, 2);
        }
    }
    triangles
}

/// Open ring without consecutive duplicate vertices
fn clean_ring(ring: &geo::LineString<f64>) -> Vec<Coord<f64>> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for c in &ring.0 {
        if coords.last() != Some(c) {
            coords.push(*c);
        }
    }
    while coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    coords
}

/// Numeric property value; numeric strings are accepted
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Accumulates extruded footprints into one mesh
pub struct ExtrusionBuilder<'a> {
    view: &'a dyn MapView,
    styles: &'a Styles,
    height_property: &'a str,
    target_zoom: f64,
    mesh: ExtrusionMesh,
    footprints: usize,
    skipped: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> ExtrusionBuilder<'a> {
    pub fn new(view: &'a dyn MapView, styles: &'a Styles, config: &'a Config) -> Self {
        Self {
            view,
            styles,
            height_property: &config.height_property,
            target_zoom: view.target_zoom(),
            mesh: ExtrusionMesh::default(),
            footprints: 0,
            skipped: 0,
        }
    }

    /// Extrusion height of a feature in target-zoom pixels; missing or invalid heights are 0
    pub fn height_in_pixels(&self, feature: &Feature) -> f32 {
        let world = feature
            .property(self.height_property)
            .and_then(numeric)
            .unwrap_or(0.0);
        let pixels = self.view.distance_to_pixels(world, self.target_zoom);
        if pixels.is_finite() && pixels > 0.0 {
            pixels as f32
        } else {
            0.0
        }
    }

    /// Append one feature; returns whether it contributed geometry
    pub fn add_feature(&mut self, feature: &Feature) -> bool {
        let Some(Shape::Polygons(polygons)) = feature.shape() else {
            tracing::trace!("Skipping feature without polygon geometry");
            self.skipped += 1;
            return false;
        };
        let Some(style_index) = self.styles.classify_feature(feature) else {
            self.skipped += 1;
            return false;
        };
        let height = self.height_in_pixels(feature);

        let mut added = false;
        for polygon in &polygons {
            added |= self.add_polygon(polygon, height, style_index);
        }
        if !added {
            self.skipped += 1;
        }
        added
    }

    /// Append one geographic footprint with a resolved height and style
    pub fn add_polygon(&mut self, polygon: &Polygon<f64>, height: f32, style_index: usize) -> bool {
        let (view, zoom) = (self.view, self.target_zoom);
        let projected = polygon
            .map_coords(|c| view.coordinate_to_point(c, zoom))
            .orient(Direction::Default);

        let outer = clean_ring(projected.exterior());
        if outer.len() < 3 {
            return false;
        }
        let mut rings = vec![outer];
        rings.extend(
            projected
                .interiors()
                .iter()
                .map(clean_ring)
                .filter(|ring| ring.len() >= 3),
        );

        // Roof vertices plus four per wall edge
        let ring_vertices: usize = rings.iter().map(Vec::len).sum();
        if self.mesh.vertex_count() + ring_vertices * 5 > u32::MAX as usize {
            tracing::warn!("Extrusion mesh exceeds 32-bit indices; dropping footprint");
            return false;
        }

        self.mesh.push_footprint(&rings, height, style_index as f32);
        self.footprints += 1;
        true
    }

    /// Mesh built so far
    pub fn finish(self) -> ExtrusionMesh {
        tracing::debug!(
            "Extruded {} footprints at zoom {} into {} vertices / {} triangles ({} features skipped)",
            self.footprints,
            self.target_zoom,
            self.mesh.vertex_count(),
            self.mesh.triangle_count(),
            self.skipped
        );
        self.mesh
    }

    /// Append every feature and return the finished mesh
    pub fn build(mut self, features: &[Feature]) -> ExtrusionMesh {
        #[cfg(feature = "profiling")]
        profiling::scope!("extrude::build");

        for feature in features {
            self.add_feature(feature);
        }
        self.finish()
    }
}
