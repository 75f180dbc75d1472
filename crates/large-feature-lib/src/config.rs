//! Layer configuration

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration shared by the point and extrusion layers
///
/// Serialized with camelCase keys, like the style symbols.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(default, rename_all = "camelCase")
)]
pub struct Config {
    /// Property holding the extrusion height in world units (meters).
    /// Default: "height"
    pub height_property: String,
    /// Smallest half-extent, in pixels, of the identify query box.
    /// Default: 1.0
    pub min_hit_tolerance: f64,
    /// When set, every atlas rebuild also writes the packed canvas here as PNG
    pub debug_atlas_path: Option<PathBuf>,
    /// Directional + ambient lighting for extrusions
    pub lighting: LightingOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            height_property: "height".to_string(),
            min_hit_tolerance: 1.0,
            debug_atlas_path: None,
            lighting: LightingOptions::default(),
        }
    }
}

/// One directional light plus an ambient term
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(default, rename_all = "camelCase")
)]
pub struct LightingOptions {
    /// Direction towards the light; normalized before upload
    pub light_position: [f32; 3],
    pub light_color: [f32; 3],
    pub light_intensity: f32,
    pub ambient_light: [f32; 3],
}

impl Default for LightingOptions {
    fn default() -> Self {
        Self {
            light_position: [10.0, 0.0, 35.0],
            light_color: [1.0, 1.0, 1.0],
            light_intensity: 0.5,
            ambient_light: [0.02, 0.02, 0.02],
        }
    }
}

impl LightingOptions {
    /// Unit vector towards the light, falling back to straight up for a zero position
    pub fn light_direction(&self) -> [f32; 3] {
        let direction = glam::Vec3::from_array(self.light_position).normalize_or_zero();
        if direction == glam::Vec3::ZERO {
            return [0.0, 0.0, 1.0];
        }
        direction.to_array()
    }
}
