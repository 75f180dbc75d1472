//! Large Feature Library - Batched Rendering Core for Huge Point and Polygon Sets
//!
//! This library turns tens of thousands to millions of map features into a handful of flat
//! GPU buffers that can be drawn with a single draw call per layer, and keeps enough CPU-side
//! state around to answer screen-space hit tests ("identify") quickly.
//!
//! # Architecture
//!
//! - **[`Atlas`]**: Packs one sprite per style rule into a single texture canvas
//! - **[`ProjectedPoints`]**: Projects point features at a fixed target zoom and indexes them
//! - **[`SpatialIndex`]**: Immutable bulk-loaded R-tree over projected point positions
//! - **[`ExtrusionMesh`]**: Wall + roof triangle mesh built from polygon footprints
//! - **[`PointLayer`] / [`ExtrudeLayer`]**: Frame drivers owning the GPU buffers
//!
//! # Data Flow
//!
//! ```text
//! features + styles ──► Atlas ──► ProjectedPoints ──► vertex buffer + SpatialIndex
//!                   └──────────► ExtrusionBuilder ──► vertex/normal/style/index buffers
//! ```
//!
//! # Performance Characteristics
//!
//! - **Index Build**: O(N log N) bulk load
//! - **Identify**: O(log N + K) where K = candidates in the coarse query box
//! - **Mesh Build**: O(V log V) per footprint (ear clipping with hole elimination)

mod atlas;
mod config;
mod extrude;
mod feature;
pub mod gpu;
mod identify;
mod index;
mod layer;
mod points;
mod state;
mod style;
#[cfg(test)]
mod test_support;
pub mod utils;
pub mod view;

// Public API exports
pub use atlas::{
    Atlas, PackedRect, ResourceDescriptor, Resources, Sprite, SymbolRasterizer,
    VectorMarkerRasterizer,
};
pub use config::{Config, LightingOptions};
pub use extrude::{ExtrusionBuilder, ExtrusionMesh};
pub use feature::{Feature, Properties, Shape, features_from_geojson, features_from_json};
pub use gpu::{GraphicsContext, RecordingContext};
pub use identify::{Hit, IdentifyOptions};
pub use index::SpatialIndex;
pub use layer::{DrawReport, ExtrudeLayer, PointLayer};
pub use points::{PointRecord, ProjectedPoints};
pub use state::{LayerState, Rebuild};
pub use style::{Color, CompareOp, Filter, MarkerType, StyleRule, Styles, Symbol};
pub use view::{MapView, WebMercatorView};

/// Error types for the layer library
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("Graphics context error: {0}")]
    Graphics(#[from] gpu::GraphicsError),

    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Draw of {0} elements exceeds the 32-bit draw count")]
    DrawCountOverflow(usize),
}

pub type Result<T> = std::result::Result<T, LayerError>;
