//! Atlas Packer - one texture canvas holding a sprite per style rule
//!
//! Every style rule is rasterized once into a small bitmap, and the bitmaps are shelf-packed
//! into a single canvas so a whole point layer samples one texture. Sprites are stored by
//! style index; a rule that produces no pixels keeps an empty slot so later indices never
//! shift.

use crate::{MarkerType, Result, Styles, Symbol};
use image::{ImageFormat, Rgba, RgbaImage, imageops};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Gap between packed sprites, in pixels
const PADDING: u32 = 1;

/// Marker width used when a vector symbol declares none
const DEFAULT_MARKER_SIZE: f32 = 10.0;

/// Largest sprite edge, in pixels; bigger symbols get no sprite
pub const MAX_SPRITE_SIZE: u32 = 2048;

/// Floats per style in [`Atlas::sprite_uniform`]
pub const SPRITE_UNIFORM_STRIDE: usize = 8;

/// Reference to an external bitmap a symbol needs before it can be rasterized
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor {
    /// Path (or URL) of the image
    pub url: String,
    /// Declared size, if the symbol fixes one
    pub size: Option<(u32, u32)>,
}

/// Loaded bitmaps keyed by resource URL
#[derive(Debug, Clone, Default)]
pub struct Resources {
    images: HashMap<String, RgbaImage>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already decoded bitmap
    pub fn insert(&mut self, url: impl Into<String>, image: RgbaImage) {
        self.images.insert(url.into(), image);
    }

    pub fn get(&self, url: &str) -> Option<&RgbaImage> {
        self.images.get(url)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Decode every descriptor from disk; relative paths resolve against `base_dir`
    ///
    /// Unreadable resources are logged and skipped, so the symbols using them end up
    /// without a sprite.
    pub fn load_all(descriptors: &[ResourceDescriptor], base_dir: &Path) -> Self {
        let mut resources = Self::new();
        for descriptor in descriptors {
            if resources.images.contains_key(&descriptor.url) {
                continue;
            }
            let path: PathBuf = base_dir.join(&descriptor.url);
            match image::open(&path) {
                Ok(image) => resources.insert(descriptor.url.clone(), image.to_rgba8()),
                Err(e) => tracing::warn!("Failed to load icon {}: {}", path.display(), e),
            }
        }
        tracing::debug!(
            "Loaded {} of {} symbol resources",
            resources.len(),
            descriptors.len()
        );
        resources
    }
}

/// Turns symbol definitions into bitmaps
pub trait SymbolRasterizer {
    /// External images the symbol needs
    fn resolve_resources(&self, symbol: &Symbol) -> Vec<ResourceDescriptor>;

    /// Render the symbol, or `None` if it has nothing to draw
    fn rasterize(&self, symbol: &Symbol, resources: &Resources) -> Option<RgbaImage>;
}

/// Default rasterizer: draws vector marker shapes or blits a loaded icon
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorMarkerRasterizer;

impl SymbolRasterizer for VectorMarkerRasterizer {
    fn resolve_resources(&self, symbol: &Symbol) -> Vec<ResourceDescriptor> {
        let size = match (symbol.marker_width, symbol.marker_height) {
            (Some(w), Some(h)) => Some(pixel_size(w, h)),
            _ => None,
        };
        symbol
            .marker_file
            .iter()
            .map(|url| ResourceDescriptor {
                url: url.clone(),
                size,
            })
            .collect()
    }

    fn rasterize(&self, symbol: &Symbol, resources: &Resources) -> Option<RgbaImage> {
        if let Some(url) = &symbol.marker_file {
            return rasterize_icon(symbol, resources.get(url)?);
        }
        if !symbol.has_marker() {
            return None;
        }
        rasterize_marker(symbol)
    }
}

fn rasterize_icon(symbol: &Symbol, icon: &RgbaImage) -> Option<RgbaImage> {
    if icon.width() == 0 || icon.height() == 0 {
        return None;
    }
    let aspect = icon.height() as f32 / icon.width() as f32;
    let (width, height) = match (symbol.marker_width, symbol.marker_height) {
        (None, None) => (icon.width(), icon.height()),
        (Some(w), None) => pixel_size(w, w * aspect),
        (None, Some(h)) => pixel_size(h / aspect, h),
        (Some(w), Some(h)) => pixel_size(w, h),
    };
    if !fits_sprite(width, height) {
        return None;
    }
    let mut image = if (width, height) == icon.dimensions() {
        icon.clone()
    } else {
        imageops::resize(icon, width, height, imageops::FilterType::Triangle)
    };
    let opacity = symbol.marker_opacity.unwrap_or(1.0).clamp(0.0, 1.0);
    if opacity < 1.0 {
        for pixel in image.pixels_mut() {
            pixel.0[3] = (pixel.0[3] as f32 * opacity).round() as u8;
        }
    }
    Some(image)
}

fn pixel_size(width: f32, height: f32) -> (u32, u32) {
    (width.round().max(1.0) as u32, height.round().max(1.0) as u32)
}

fn fits_sprite(width: u32, height: u32) -> bool {
    if width > MAX_SPRITE_SIZE || height > MAX_SPRITE_SIZE {
        tracing::warn!(
            "Symbol of {}x{} px exceeds the {} px sprite limit; skipped",
            width,
            height,
            MAX_SPRITE_SIZE
        );
        return false;
    }
    true
}

/// Whether normalized shape coordinates (-1..=1 on both axes, y down) are inside the marker
fn shape_contains(shape: MarkerType, u: f32, v: f32) -> bool {
    match shape {
        MarkerType::Ellipse => u * u + v * v <= 1.0,
        MarkerType::Rectangle => u.abs() <= 1.0 && v.abs() <= 1.0,
        MarkerType::Diamond => u.abs() + v.abs() <= 1.0,
        MarkerType::Triangle => (-1.0..=1.0).contains(&v) && u.abs() <= (v + 1.0) / 2.0,
        MarkerType::Cross => {
            (u.abs() <= 0.2 && v.abs() <= 1.0) || (v.abs() <= 0.2 && u.abs() <= 1.0)
        }
    }
}

fn rasterize_marker(symbol: &Symbol) -> Option<RgbaImage> {
    let shape = symbol.marker_type.unwrap_or_default();
    let width = symbol.marker_width.unwrap_or(DEFAULT_MARKER_SIZE).max(1.0);
    let height = symbol.marker_height.unwrap_or(width).max(1.0);
    let opacity = symbol.marker_opacity.unwrap_or(1.0);

    let fill = symbol
        .marker_fill
        .map(|c| c.with_opacity(symbol.marker_fill_opacity.unwrap_or(1.0) * opacity));
    let line_width = symbol.marker_line_width.unwrap_or(1.0).max(0.0);
    let stroke = symbol
        .marker_line_color
        .filter(|_| line_width > 0.0)
        .map(|c| c.with_opacity(symbol.marker_line_opacity.unwrap_or(1.0) * opacity));
    let stroke_width = if stroke.is_some() { line_width } else { 0.0 };

    let canvas_w = (width + stroke_width).ceil() as u32;
    let canvas_h = (height + stroke_width).ceil() as u32;
    if !fits_sprite(canvas_w, canvas_h) {
        return None;
    }
    let (cx, cy) = (canvas_w as f32 / 2.0, canvas_h as f32 / 2.0);
    let (outer_w, outer_h) = ((width + stroke_width) / 2.0, (height + stroke_width) / 2.0);
    let (inner_w, inner_h) = (
        ((width - stroke_width) / 2.0).max(0.0),
        ((height - stroke_width) / 2.0).max(0.0),
    );

    // 4x4 supersampling for anti-aliased edges
    const SAMPLES: u32 = 4;
    let mut image = RgbaImage::new(canvas_w, canvas_h);
    for (px, py, pixel) in image.enumerate_pixels_mut() {
        let mut premultiplied = [0.0f32; 4];
        for sy in 0..SAMPLES {
            for sx in 0..SAMPLES {
                let x = px as f32 + (sx as f32 + 0.5) / SAMPLES as f32 - cx;
                let y = py as f32 + (sy as f32 + 0.5) / SAMPLES as f32 - cy;
                let inner = inner_w > 0.0
                    && inner_h > 0.0
                    && shape_contains(shape, x / inner_w, y / inner_h);
                let color = if inner {
                    fill
                } else if shape_contains(shape, x / outer_w, y / outer_h) {
                    stroke.or(fill)
                } else {
                    None
                };
                if let Some(color) = color {
                    let [r, g, b, a] = color.to_f32();
                    premultiplied[0] += r * a;
                    premultiplied[1] += g * a;
                    premultiplied[2] += b * a;
                    premultiplied[3] += a;
                }
            }
        }
        let n = (SAMPLES * SAMPLES) as f32;
        let alpha = premultiplied[3] / n;
        if alpha > 0.0 {
            let channel = |c: f32| ((c / n / alpha) * 255.0).round().clamp(0.0, 255.0) as u8;
            *pixel = Rgba([
                channel(premultiplied[0]),
                channel(premultiplied[1]),
                channel(premultiplied[2]),
                (alpha * 255.0).round() as u8,
            ]);
        }
    }
    Some(image)
}

/// Position of one sprite inside the atlas canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One style's packed bitmap plus placement metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sprite {
    /// Pixel rectangle in the canvas
    pub rect: PackedRect,
    /// Normalized texture coordinates `[u0, v0, u1, v1]`
    pub tex_coords: [f32; 4],
    /// Rendered size in pixels
    pub size: [f32; 2],
    /// Anchor offset relative to the projected point, in pixels
    pub offset: [f32; 2],
}

/// All sprites of a style list packed into a single canvas
#[derive(Debug, Clone)]
pub struct Atlas {
    canvas: RgbaImage,
    sprites: Vec<Option<Sprite>>,
}

impl Default for Atlas {
    fn default() -> Self {
        Self::empty(0)
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Atlas {
    /// Atlas with `style_count` empty slots and a 1x1 transparent canvas
    pub fn empty(style_count: usize) -> Self {
        Self {
            canvas: RgbaImage::new(1, 1),
            sprites: vec![None; style_count],
        }
    }

    /// Rasterize every style and pack the results
    pub fn build(styles: &Styles, rasterizer: &dyn SymbolRasterizer, resources: &Resources) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("atlas::build");

        let bitmaps: Vec<Option<(RgbaImage, [f32; 2])>> = styles
            .rules()
            .iter()
            .map(|rule| {
                rasterizer
                    .rasterize(&rule.symbol, resources)
                    .filter(|image| image.width() > 0 && image.height() > 0)
                    .filter(|image| fits_sprite(image.width(), image.height()))
                    .map(|image| (image, [rule.symbol.marker_dx, rule.symbol.marker_dy]))
            })
            .collect();

        let sizes: Vec<Option<(u32, u32)>> = bitmaps
            .iter()
            .map(|b| b.as_ref().map(|(image, _)| image.dimensions()))
            .collect();
        let (rects, width, height) = shelf_pack(&sizes);
        if width == 0 {
            tracing::debug!("No style produced a sprite; atlas is empty");
            return Self::empty(styles.len());
        }

        let mut canvas = RgbaImage::new(width, height);
        let sprites = bitmaps
            .into_iter()
            .zip(rects)
            .map(|(bitmap, rect)| {
                let ((image, offset), rect) = (bitmap?, rect?);
                imageops::replace(&mut canvas, &image, rect.x as i64, rect.y as i64);
                Some(Sprite {
                    rect,
                    tex_coords: [
                        rect.x as f32 / width as f32,
                        rect.y as f32 / height as f32,
                        (rect.x + rect.width) as f32 / width as f32,
                        (rect.y + rect.height) as f32 / height as f32,
                    ],
                    size: [rect.width as f32, rect.height as f32],
                    offset,
                })
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "Packed {} sprites for {} styles into {}x{} atlas",
            sprites.iter().flatten().count(),
            styles.len(),
            width,
            height
        );
        Self { canvas, sprites }
    }

    /// Sprite of a style, if the style produced one
    pub fn sprite(&self, style_index: usize) -> Option<&Sprite> {
        self.sprites.get(style_index)?.as_ref()
    }

    /// One slot per style rule
    pub fn sprites(&self) -> &[Option<Sprite>] {
        &self.sprites
    }

    pub fn sprite_count(&self) -> usize {
        self.sprites.iter().flatten().count()
    }

    /// Whether no style produced a sprite
    pub fn is_empty(&self) -> bool {
        self.sprite_count() == 0
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    /// Per-style sprite metadata: `u0, v0, u1, v1, width, height, dx, dy`
    ///
    /// Styles without a sprite contribute zeros.
    pub fn sprite_uniform(&self) -> Vec<f32> {
        let mut uniform = Vec::with_capacity(self.sprites.len() * SPRITE_UNIFORM_STRIDE);
        for sprite in &self.sprites {
            match sprite {
                Some(s) => {
                    uniform.extend_from_slice(&s.tex_coords);
                    uniform.extend_from_slice(&s.size);
                    uniform.extend_from_slice(&s.offset);
                }
                None => uniform.extend_from_slice(&[0.0; SPRITE_UNIFORM_STRIDE]),
            }
        }
        uniform
    }

    /// Write the packed canvas as PNG
    pub fn save_debug_png(&self, path: &Path) -> Result<()> {
        self.canvas.save_with_format(path, ImageFormat::Png)?;
        tracing::debug!("Wrote atlas canvas to {}", path.display());
        Ok(())
    }
}

/// Shelf packing, tallest first, into a power-of-two-wide canvas
///
/// Returns one rect per input slot plus the canvas size; (0, 0) when nothing was packed.
fn shelf_pack(sizes: &[Option<(u32, u32)>]) -> (Vec<Option<PackedRect>>, u32, u32) {
    let mut order: Vec<(usize, (u32, u32))> = sizes
        .iter()
        .enumerate()
        .filter_map(|(i, size)| size.map(|s| (i, s)))
        .collect();
    if order.is_empty() {
        return (vec![None; sizes.len()], 0, 0);
    }
    // Stable sort keeps the packing deterministic for equal heights
    order.sort_by(|a, b| b.1.1.cmp(&a.1.1));

    let area: u64 = order
        .iter()
        .map(|(_, (w, h))| (w + PADDING) as u64 * (h + PADDING) as u64)
        .sum();
    let widest = order.iter().map(|(_, (w, _))| *w).max().unwrap_or(0);
    let side = (area as f64).sqrt().ceil() as u32;
    let width = side.max(widest + 2 * PADDING).next_power_of_two();

    let mut rects = vec![None; sizes.len()];
    let (mut x, mut y, mut shelf_height) = (PADDING, PADDING, 0);
    for (index, (w, h)) in order {
        if x + w + PADDING > width {
            y += shelf_height + PADDING;
            x = PADDING;
            shelf_height = 0;
        }
        rects[index] = Some(PackedRect {
            x,
            y,
            width: w,
            height: h,
        });
        x += w + PADDING;
        shelf_height = shelf_height.max(h);
    }
    (rects, width, y + shelf_height + PADDING)
}
