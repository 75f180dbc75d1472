use crate::settings::Settings;
use geo::{BoundingRect, Coord, MultiPoint, Point};
use large_feature_lib::{
    Color, Config, DrawReport, ExtrudeLayer, Feature, Filter, IdentifyOptions, LayerError,
    MarkerType, PointLayer, RecordingContext, Resources, Shape, StyleRule, Styles, Symbol,
    VectorMarkerRasterizer, WebMercatorView, features_from_json,
};
use rayon::prelude::*;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid identify filter: {0}")]
    IdentifyFilter(String),

    #[error("Nothing to draw: pass --points or --polygons")]
    NoInput,

    #[error(transparent)]
    Layer(#[from] LayerError),
}

pub type Result<T> = std::result::Result<T, CliError>;

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse every file in parallel, keeping file order in the result
fn load_features(paths: &[PathBuf]) -> Result<Vec<Feature>> {
    #[cfg(feature = "profiling")]
    profiling::scope!("run::load_features");

    let per_file: Result<Vec<Vec<Feature>>> = paths
        .par_iter()
        .map(|path| {
            let features = features_from_json(read_json(path)?)?;
            tracing::info!("Loaded {} features from {}", features.len(), path.display());
            Ok(features)
        })
        .collect();
    Ok(per_file?.into_iter().flatten().collect())
}

/// One blue dot for every feature, gray extrusions
fn default_styles() -> Styles {
    Styles::new(vec![StyleRule::new(
        Filter::default(),
        Symbol {
            marker_type: Some(MarkerType::Ellipse),
            marker_fill: Some(Color([30, 110, 230, 255])),
            marker_line_color: Some(Color([255, 255, 255, 255])),
            marker_width: Some(8.0),
            polygon_fill: Some(Color([170, 170, 170, 255])),
            ..Default::default()
        },
    )])
}

/// Styles plus the directory icon paths resolve against
fn load_styles(path: Option<&Path>) -> Result<(Styles, PathBuf)> {
    let Some(path) = path else {
        return Ok((default_styles(), PathBuf::from(".")));
    };
    let styles: Styles =
        serde_json::from_value(read_json(path)?).map_err(|source| CliError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::info!("Loaded {} style rules from {}", styles.len(), path.display());
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok((styles, base_dir))
}

fn load_config(settings: &Settings) -> Result<Config> {
    let mut config = match &settings.config {
        Some(path) => serde_json::from_value(read_json(path)?).map_err(|source| CliError::Json {
            path: path.clone(),
            source,
        })?,
        None => Config::default(),
    };
    if settings.debug_atlas.is_some() {
        config.debug_atlas_path = settings.debug_atlas.clone();
    }
    Ok(config)
}

/// Center of the bounding box of every readable geometry
fn data_center<'a>(features: impl IntoIterator<Item = &'a Feature>) -> Option<Coord<f64>> {
    let points: Vec<Point<f64>> = features
        .into_iter()
        .filter_map(Feature::shape)
        .flat_map(|shape| match shape {
            Shape::Point(coordinate) => vec![Point::from(coordinate)],
            Shape::Polygons(polygons) => polygons
                .iter()
                .flat_map(|polygon| polygon.exterior().points())
                .collect(),
        })
        .collect();
    MultiPoint::from(points)
        .bounding_rect()
        .map(|rect| rect.center())
}

fn identify_options(settings: &Settings) -> Result<IdentifyOptions<'static>> {
    let mut options = IdentifyOptions::new();
    if let Some(limit) = settings.limit {
        options = options.with_limit(limit);
    }
    if let Some(expression) = &settings.identify_filter {
        let value: Value = serde_json::from_str(expression)
            .map_err(|e| CliError::IdentifyFilter(e.to_string()))?;
        options = options.with_expression(Filter::from_json(&value)?);
    }
    Ok(options)
}

fn log_report(layer: &str, frame: u32, report: &DrawReport) {
    match report.rebuild {
        Some(rebuild) => tracing::info!(
            "Frame {}: {} layer rebuilt (atlas: {}), uploaded {} bytes, drew {} primitives",
            frame,
            layer,
            rebuild.atlas,
            report.uploaded_bytes,
            report.primitives
        ),
        None => tracing::debug!(
            "Frame {}: {} layer reused buffers, drew {} primitives",
            frame,
            layer,
            report.primitives
        ),
    }
}

/// Load everything, draw the requested frames and print identify results as JSON lines
pub fn run(settings: &Settings) -> Result<()> {
    let (points, polygons) = rayon::join(
        || load_features(&settings.points),
        || load_features(&settings.polygons),
    );
    let (points, polygons) = (points?, polygons?);
    if points.is_empty() && polygons.is_empty() {
        return Err(CliError::NoInput);
    }

    let (styles, base_dir) = load_styles(settings.styles.as_deref())?;
    let config = load_config(settings)?;
    let options = identify_options(settings)?;

    let center = settings
        .center
        .or_else(|| data_center(points.iter().chain(&polygons)))
        .unwrap_or_default();
    let mut view = WebMercatorView::new(
        center,
        settings.zoom,
        (settings.width as f64, settings.height as f64),
    )
    .with_zoom_bucket(settings.zoom_bucket);
    tracing::info!(
        "View centered on {:.5},{:.5} at zoom {}",
        center.x,
        center.y,
        settings.zoom
    );

    let mut point_layer = (!points.is_empty()).then(|| {
        let mut layer = PointLayer::new(
            RecordingContext::new(),
            config.clone(),
            styles.clone(),
            VectorMarkerRasterizer,
        );
        let resources = Resources::load_all(&layer.required_resources(), &base_dir);
        layer.set_resources(resources);
        layer.set_data(points);
        layer
    });
    let mut extrude_layer = (!polygons.is_empty()).then(|| {
        let mut layer = ExtrudeLayer::new(RecordingContext::new(), config.clone(), styles.clone());
        layer.set_data(polygons);
        layer
    });

    for frame in 0..settings.frames {
        profiling::finish_frame!();
        if let Some(layer) = point_layer.as_mut() {
            log_report("point", frame, &layer.draw(&view)?);
        }
        if let Some(layer) = extrude_layer.as_mut() {
            log_report("extrude", frame, &layer.draw(&view)?);
        }
        if frame + 1 < settings.frames {
            view.set_zoom(view.zoom() + settings.zoom_step);
        }
    }

    if !settings.identify.is_empty() {
        let Some(layer) = point_layer.as_ref() else {
            tracing::warn!("Identify needs point data; skipping {} queries", settings.identify.len());
            return Ok(());
        };
        for coordinate in &settings.identify {
            let hits: Vec<Value> = layer
                .identify_hits(&view, *coordinate, &options)
                .into_iter()
                .map(|hit| {
                    json!({
                        "feature": hit.feature_index,
                        "properties": layer.features().get(hit.feature_index).and_then(Feature::properties),
                    })
                })
                .collect();
            println!(
                "{}",
                json!({"lon": coordinate.x, "lat": coordinate.y, "hits": hits})
            );
        }
    }

    if let Some(layer) = &point_layer {
        let recording = layer.context().recording();
        tracing::debug!(
            "Point layer issued {} graphics calls",
            recording.borrow().calls().len()
        );
    }
    Ok(())
}
