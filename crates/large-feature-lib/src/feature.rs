//! Feature storage and normalization
//!
//! Features arrive either as bare coordinates with a property bag or as GeoJSON. Layers only
//! ever look at the normalized [`Shape`], so malformed input is dropped in exactly one place.

use crate::Result;
use geo::{Coord, LineString, Polygon};
use geojson::GeoJson;
use serde_json::Value;

/// Opaque property bag attached to every feature
pub type Properties = serde_json::Map<String, Value>;

/// A single input feature
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    /// A raw coordinate pair with its properties
    Point {
        coordinate: Coord<f64>,
        properties: Properties,
    },
    /// Raw polygon rings (outer ring first, then holes) with their properties
    Polygon {
        rings: Vec<Vec<Coord<f64>>>,
        properties: Properties,
    },
    /// A GeoJSON feature
    GeoJson(geojson::Feature),
}

/// Normalized geometry of a feature
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point(Coord<f64>),
    /// One or more footprints, each with optional holes
    Polygons(Vec<Polygon<f64>>),
}

impl Feature {
    /// Create a point feature
    pub fn point(x: f64, y: f64, properties: Properties) -> Self {
        Feature::Point {
            coordinate: Coord { x, y },
            properties,
        }
    }

    /// Create a polygon feature from raw rings
    pub fn polygon(rings: Vec<Vec<Coord<f64>>>, properties: Properties) -> Self {
        Feature::Polygon { rings, properties }
    }

    /// Property bag of the feature, if it has one
    pub fn properties(&self) -> Option<&Properties> {
        match self {
            Feature::Point { properties, .. } | Feature::Polygon { properties, .. } => {
                Some(properties)
            }
            Feature::GeoJson(feature) => feature.properties.as_ref(),
        }
    }

    /// Look up a single property
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties()?.get(key)
    }

    /// Normalize the geometry, or `None` if it is missing or malformed
    pub fn shape(&self) -> Option<Shape> {
        match self {
            Feature::Point { coordinate, .. } => finite(*coordinate).map(Shape::Point),
            Feature::Polygon { rings, .. } => {
                polygon_from_rings(rings).map(|polygon| Shape::Polygons(vec![polygon]))
            }
            Feature::GeoJson(feature) => shape_from_geojson(&feature.geometry.as_ref()?.value),
        }
    }

    /// Interpret a loosely typed JSON value as a feature
    ///
    /// Accepted forms:
    /// - `[x, y]` or `[x, y, {properties}]`
    /// - `[rings, {properties}]` where `rings` is `[[x, y], ..]` or `[[[x, y], ..], ..]`
    /// - a GeoJSON `Feature` object, or a bare geometry object with `coordinates`
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => {
                let first = items.first()?;
                if first.is_number() {
                    let coordinate = coord_from_json(value)?;
                    let properties = object_at(items.get(2));
                    return Some(Feature::Point {
                        coordinate,
                        properties,
                    });
                }
                let rings = rings_from_json(first)?;
                Some(Feature::Polygon {
                    rings,
                    properties: object_at(items.get(1)),
                })
            }
            Value::Object(object) => {
                if object.contains_key("type") {
                    return match GeoJson::from_json_value(value.clone()).ok()? {
                        GeoJson::Feature(feature) => Some(Feature::GeoJson(feature)),
                        GeoJson::Geometry(geometry) => Some(Feature::GeoJson(geojson::Feature {
                            bbox: None,
                            geometry: Some(geometry),
                            id: None,
                            properties: None,
                            foreign_members: None,
                        })),
                        GeoJson::FeatureCollection(_) => None,
                    };
                }
                // Untyped object: look for coordinates directly
                let coordinates = object.get("coordinates")?;
                let properties = object_at(object.get("properties"));
                if let Some(coordinate) = coord_from_json(coordinates) {
                    return Some(Feature::Point {
                        coordinate,
                        properties,
                    });
                }
                Some(Feature::Polygon {
                    rings: rings_from_json(coordinates)?,
                    properties,
                })
            }
            _ => None,
        }
    }
}

/// Flatten a GeoJSON document into features
pub fn features_from_geojson(geojson: GeoJson) -> Vec<Feature> {
    match geojson {
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .map(Feature::GeoJson)
            .collect(),
        GeoJson::Feature(feature) => vec![Feature::GeoJson(feature)],
        GeoJson::Geometry(geometry) => vec![Feature::GeoJson(geojson::Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        })],
    }
}

/// Parse a JSON document that is either GeoJSON or an array of loosely typed features
///
/// Array entries that cannot be interpreted are skipped.
pub fn features_from_json(value: Value) -> Result<Vec<Feature>> {
    match value {
        Value::Array(items) => {
            let total = items.len();
            let features: Vec<Feature> = items.iter().filter_map(Feature::from_json).collect();
            if features.len() < total {
                tracing::debug!(
                    "Skipped {} unreadable entries out of {}",
                    total - features.len(),
                    total
                );
            }
            Ok(features)
        }
        other => Ok(features_from_geojson(GeoJson::from_json_value(other)?)),
    }
}

fn finite(coordinate: Coord<f64>) -> Option<Coord<f64>> {
    (coordinate.x.is_finite() && coordinate.y.is_finite()).then_some(coordinate)
}

fn object_at(value: Option<&Value>) -> Properties {
    match value {
        Some(Value::Object(object)) => object.clone(),
        _ => Properties::new(),
    }
}

fn coord_from_json(value: &Value) -> Option<Coord<f64>> {
    let items = value.as_array()?;
    let x = items.first()?.as_f64()?;
    let y = items.get(1)?.as_f64()?;
    finite(Coord { x, y })
}

fn ring_from_json(value: &Value) -> Option<Vec<Coord<f64>>> {
    value.as_array()?.iter().map(coord_from_json).collect()
}

fn rings_from_json(value: &Value) -> Option<Vec<Vec<Coord<f64>>>> {
    let items = value.as_array()?;
    // A single ring is given directly as a list of positions
    if coord_from_json(items.first()?).is_some() {
        return Some(vec![ring_from_json(value)?]);
    }
    items.iter().map(ring_from_json).collect()
}

fn coord_from_position(position: &[f64]) -> Option<Coord<f64>> {
    match position {
        [x, y, ..] => finite(Coord { x: *x, y: *y }),
        _ => None,
    }
}

fn polygon_from_rings(rings: &[Vec<Coord<f64>>]) -> Option<Polygon<f64>> {
    let (outer, holes) = rings.split_first()?;
    if outer.len() < 3 || outer.iter().any(|c| finite(*c).is_none()) {
        return None;
    }
    let interiors = holes
        .iter()
        .filter(|hole| hole.len() >= 3 && hole.iter().all(|c| finite(*c).is_some()))
        .map(|hole| LineString::from(hole.clone()))
        .collect();
    Some(Polygon::new(LineString::from(outer.clone()), interiors))
}

fn polygon_from_positions(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let rings: Vec<Vec<Coord<f64>>> = rings
        .iter()
        .map(|ring| ring.iter().map(|p| coord_from_position(p)).collect())
        .collect::<Option<_>>()?;
    polygon_from_rings(&rings)
}

fn shape_from_geojson(value: &geojson::Value) -> Option<Shape> {
    match value {
        geojson::Value::Point(position) => coord_from_position(position).map(Shape::Point),
        geojson::Value::MultiPoint(positions) => positions
            .first()
            .and_then(|p| coord_from_position(p))
            .map(Shape::Point),
        geojson::Value::Polygon(rings) => {
            polygon_from_positions(rings).map(|polygon| Shape::Polygons(vec![polygon]))
        }
        geojson::Value::MultiPolygon(polygons) => {
            let polygons: Vec<Polygon<f64>> = polygons
                .iter()
                .filter_map(|rings| polygon_from_positions(rings))
                .collect();
            (!polygons.is_empty()).then_some(Shape::Polygons(polygons))
        }
        _ => None,
    }
}
