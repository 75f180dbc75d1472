use super::{DrawReport, ProgramSlot, draw_count};
use crate::gpu::{
    BufferTarget, Capabilities, DrawMode, GpuBuffer, GpuTexture, GraphicsContext, Uniform,
    VertexAttrib, shaders,
};
use crate::identify::{Hit, IdentifyOptions};
use crate::points::POINT_VERTEX_STRIDE;
use crate::{
    Atlas, Config, Feature, LayerState, MapView, ProjectedPoints, Rebuild, ResourceDescriptor,
    Resources, Result, Styles, SymbolRasterizer,
};
use geo::Coord;

const VERTEX_BYTES: u32 = (POINT_VERTEX_STRIDE * std::mem::size_of::<f32>()) as u32;

const POINT_ATTRIBS: [VertexAttrib; 2] = [
    VertexAttrib {
        name: "a_pos",
        components: 2,
        stride: VERTEX_BYTES,
        offset: 0,
    },
    VertexAttrib {
        name: "a_sprite_idx",
        components: 1,
        stride: VERTEX_BYTES,
        offset: 8,
    },
];

/// Batched sprite layer for large point sets, with screen-space identify
pub struct PointLayer<G: GraphicsContext> {
    ctx: G,
    config: Config,
    styles: Styles,
    rasterizer: Box<dyn SymbolRasterizer>,
    resources: Resources,
    features: Vec<Feature>,
    state: LayerState,
    atlas: Option<Atlas>,
    points: Option<ProjectedPoints>,
    program: ProgramSlot,
    vertex_buffer: Option<GpuBuffer>,
    texture: Option<GpuTexture>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<G: GraphicsContext> PointLayer<G> {
    pub fn new(
        ctx: G,
        config: Config,
        styles: Styles,
        rasterizer: impl SymbolRasterizer + 'static,
    ) -> Self {
        Self {
            ctx,
            config,
            styles,
            rasterizer: Box::new(rasterizer),
            resources: Resources::new(),
            features: Vec::new(),
            state: LayerState::Empty,
            atlas: None,
            points: None,
            program: ProgramSlot::default(),
            vertex_buffer: None,
            texture: None,
        }
    }

    /// Replace the style rules; the atlas and buffers are rebuilt on the next draw
    pub fn set_style(&mut self, styles: Styles) {
        self.styles = styles;
        self.state.invalidate_style();
        tracing::debug!("Point layer style changed: {:?}", self.state);
    }

    /// Replace the feature data; buffers and index are rebuilt on the next draw
    ///
    /// The previous index refers to the old features, so identify finds nothing until then.
    pub fn set_data(&mut self, features: Vec<Feature>) {
        self.features = features;
        self.points = None;
        self.state.invalidate_data();
        tracing::debug!(
            "Point layer data replaced with {} features: {:?}",
            self.features.len(),
            self.state
        );
    }

    /// Replace the loaded symbol bitmaps; the atlas is repacked on the next draw
    pub fn set_resources(&mut self, resources: Resources) {
        self.resources = resources;
        self.state.invalidate_style();
    }

    /// Bitmaps the current styles need before they can all be rasterized
    pub fn required_resources(&self) -> Vec<ResourceDescriptor> {
        let mut descriptors: Vec<ResourceDescriptor> = Vec::new();
        for rule in self.styles.rules() {
            for descriptor in self.rasterizer.resolve_resources(&rule.symbol) {
                if !descriptors.contains(&descriptor) {
                    descriptors.push(descriptor);
                }
            }
        }
        descriptors
    }

    /// Rebuild if needed, then draw every point in one call
    pub fn draw(&mut self, view: &dyn MapView) -> Result<DrawReport> {
        if self.state.is_ready()
            && self
                .points
                .as_ref()
                .is_some_and(|points| points.target_zoom() != view.target_zoom())
        {
            tracing::debug!("Target zoom changed to {}", view.target_zoom());
            self.state.invalidate_data();
        }

        let mut report = DrawReport::default();
        if let Some(rebuild) = self.state.begin_draw() {
            report.uploaded_bytes = self.rebuild(view, rebuild)?;
            report.rebuild = Some(rebuild);
            self.state.finish_build();
        }
        report.primitives = self.render(view)?;
        Ok(report)
    }

    fn rebuild(&mut self, view: &dyn MapView, rebuild: Rebuild) -> Result<usize> {
        #[cfg(feature = "profiling")]
        profiling::scope!("point_layer::rebuild");

        let mut uploaded = 0;
        let program_created = self.program.ensure(
            &mut self.ctx,
            self.styles.len(),
            shaders::point_program,
            shaders::POINT_UNIFORMS,
        )?;

        if rebuild.atlas || self.atlas.is_none() {
            let atlas = Atlas::build(&self.styles, self.rasterizer.as_ref(), &self.resources);
            if let Some(path) = &self.config.debug_atlas_path {
                if let Err(e) = atlas.save_debug_png(path) {
                    tracing::warn!("Failed to write debug atlas: {}", e);
                }
            }
            if let Some(old) = self.texture.take() {
                old.release(&mut self.ctx);
            }
            self.texture = Some(GpuTexture::create(&mut self.ctx, atlas.canvas())?);
            uploaded += atlas.canvas().as_raw().len();
            self.atlas = Some(atlas);
        }
        let Some(atlas) = self.atlas.as_ref() else {
            return Ok(uploaded);
        };

        if rebuild.atlas || program_created {
            if let Some(program) = &self.program.program {
                self.ctx.use_program(program.id());
                self.ctx
                    .set_uniform("u_sprite", Uniform::FloatArray(atlas.sprite_uniform()));
                self.ctx.set_uniform("u_texture", Uniform::Sampler(0));
            }
        }

        let points = ProjectedPoints::build(&self.features, &self.styles, atlas, view)
            .with_min_tolerance(self.config.min_hit_tolerance);

        let buffer = match self.vertex_buffer.take() {
            Some(buffer) => buffer,
            None => GpuBuffer::create(&mut self.ctx)?,
        };
        buffer.upload(&mut self.ctx, BufferTarget::Array, points.vertex_bytes());
        uploaded += points.vertex_bytes().len();
        self.vertex_buffer = Some(buffer);
        self.points = Some(points);
        Ok(uploaded)
    }

    fn render(&mut self, view: &dyn MapView) -> Result<usize> {
        let (Some(program), Some(buffer), Some(points)) =
            (&self.program.program, &self.vertex_buffer, &self.points)
        else {
            return Ok(0);
        };
        let count = points.len();
        let vertex_count = draw_count(count)?;

        self.ctx.use_program(program.id());
        self.ctx.set_capabilities(Capabilities {
            depth_test: false,
            blend: true,
        });
        buffer.bind(&mut self.ctx, BufferTarget::Array);
        self.ctx.enable_vertex_attribs(&POINT_ATTRIBS);
        self.ctx
            .bind_texture(0, self.texture.as_ref().map(GpuTexture::id));
        self.ctx.set_uniform(
            "u_matrix",
            Uniform::Mat4(view.view_projection_matrix().to_cols_array()),
        );
        self.ctx
            .set_uniform("u_scale", Uniform::Float(points.scale_factor(view) as f32));

        if count > 0 {
            self.ctx.draw_arrays(DrawMode::Points, 0, vertex_count);
        }
        Ok(count)
    }

    /// Features whose sprite covers `coordinate`; empty before the first draw
    pub fn identify(
        &self,
        view: &dyn MapView,
        coordinate: Coord<f64>,
        options: &IdentifyOptions<'_>,
    ) -> Vec<&Feature> {
        self.identify_hits(view, coordinate, options)
            .into_iter()
            .filter_map(|hit| self.features.get(hit.feature_index))
            .collect()
    }

    /// Like [`identify`](Self::identify) but returns arena and feature indices
    pub fn identify_hits(
        &self,
        view: &dyn MapView,
        coordinate: Coord<f64>,
        options: &IdentifyOptions<'_>,
    ) -> Vec<Hit> {
        match &self.points {
            Some(points) => points.identify(view, coordinate, &self.features, options),
            None => Vec::new(),
        }
    }

    /// Release every GPU resource and drop the derived data; the next draw rebuilds
    pub fn teardown(&mut self) {
        self.program.release(&mut self.ctx);
        if let Some(buffer) = self.vertex_buffer.take() {
            buffer.release(&mut self.ctx);
        }
        if let Some(texture) = self.texture.take() {
            texture.release(&mut self.ctx);
        }
        self.points = None;
        self.atlas = None;
        self.state.reset();
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn styles(&self) -> &Styles {
        &self.styles
    }

    pub fn atlas(&self) -> Option<&Atlas> {
        self.atlas.as_ref()
    }

    pub fn points(&self) -> Option<&ProjectedPoints> {
        self.points.as_ref()
    }

    pub fn state(&self) -> LayerState {
        self.state
    }

    pub fn context(&self) -> &G {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut G {
        &mut self.ctx
    }
}

impl<G: GraphicsContext> Drop for PointLayer<G> {
    fn drop(&mut self) {
        self.teardown();
    }
}
