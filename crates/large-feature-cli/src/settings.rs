use clap::Parser;
use geo::Coord;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Large Feature - render huge point and polygon sets headlessly and identify features
pub struct Settings {
    /// GeoJSON (or feature array) files drawn as point sprites
    #[clap(short, long, value_name = "FILE")]
    pub points: Vec<PathBuf>,

    /// GeoJSON (or feature array) files drawn as extruded polygons
    #[clap(long, value_name = "FILE")]
    pub polygons: Vec<PathBuf>,

    /// JSON array of style rules; icon paths resolve against its directory
    #[clap(short, long, value_name = "FILE")]
    pub styles: Option<PathBuf>,

    /// JSON layer configuration (height property, hit tolerance, lighting)
    #[clap(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// View center as LON,LAT (defaults to the center of the loaded data)
    #[clap(long, value_name = "LON,LAT", value_parser = parse_lon_lat, allow_hyphen_values = true)]
    pub center: Option<Coord<f64>>,

    /// Initial zoom level
    #[clap(short, long, default_value = "12.0")]
    pub zoom: f64,

    /// Zoom change applied after every frame, to exercise buffer reuse
    #[clap(long, default_value = "0.0", allow_hyphen_values = true)]
    pub zoom_step: f64,

    /// Viewport width in pixels
    #[clap(long, default_value = "1920")]
    pub width: u32,

    /// Viewport height in pixels
    #[clap(long, default_value = "1080")]
    pub height: u32,

    /// Width of the target zoom buckets (0 projects at the live zoom)
    #[clap(long, default_value = "4.0")]
    pub zoom_bucket: f64,

    /// Number of frames to draw
    #[clap(short, long, default_value = "1")]
    pub frames: u32,

    /// Identify point features at LON,LAT after the last frame (repeatable)
    #[clap(short, long, value_name = "LON,LAT", value_parser = parse_lon_lat, allow_hyphen_values = true)]
    pub identify: Vec<Coord<f64>>,

    /// Maximum number of identify results per query
    #[clap(short, long)]
    pub limit: Option<usize>,

    /// Only report identify results matching this JSON filter expression
    #[clap(long, value_name = "EXPR")]
    pub identify_filter: Option<String>,

    /// Write the packed sprite atlas to this PNG on every atlas rebuild
    #[clap(long, value_name = "FILE")]
    pub debug_atlas: Option<PathBuf>,
}

fn parse_lon_lat(value: &str) -> Result<Coord<f64>, String> {
    let (lon, lat) = value
        .split_once(',')
        .ok_or_else(|| format!("expected LON,LAT, got '{value}'"))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|e| format!("invalid longitude '{lon}': {e}"))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|e| format!("invalid latitude '{lat}': {e}"))?;
    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(format!("coordinate out of range: {lon},{lat}"));
    }
    Ok(Coord { x: lon, y: lat })
}
