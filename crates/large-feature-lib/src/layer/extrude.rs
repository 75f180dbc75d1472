use super::{DrawReport, ProgramSlot, draw_count};
use crate::gpu::{
    BufferTarget, Capabilities, DrawMode, GpuBuffer, GraphicsContext, GraphicsError, IndexType,
    Uniform, VertexAttrib, shaders,
};
use crate::{
    Config, ExtrusionBuilder, ExtrusionMesh, Feature, LayerState, LightingOptions, MapView,
    Rebuild, Result, Styles,
};

const POSITION_ATTRIB: VertexAttrib = VertexAttrib {
    name: "a_pos",
    components: 3,
    stride: 12,
    offset: 0,
};
const NORMAL_ATTRIB: VertexAttrib = VertexAttrib {
    name: "a_normal",
    components: 3,
    stride: 12,
    offset: 0,
};
const STYLE_ATTRIB: VertexAttrib = VertexAttrib {
    name: "a_fill_style",
    components: 1,
    stride: 4,
    offset: 0,
};

/// The four buffers of an uploaded mesh
#[derive(Debug)]
struct MeshBuffers {
    positions: GpuBuffer,
    normals: GpuBuffer,
    styles: GpuBuffer,
    indices: GpuBuffer,
}

impl MeshBuffers {
    /// All four buffers or none; handles created before a failure are released
    fn create<G: GraphicsContext>(ctx: &mut G) -> Result<Self> {
        let mut created = Vec::with_capacity(4);
        for _ in 0..4 {
            match GpuBuffer::create(ctx) {
                Ok(buffer) => created.push(buffer),
                Err(e) => {
                    for buffer in created {
                        buffer.release(ctx);
                    }
                    return Err(e.into());
                }
            }
        }
        match <[GpuBuffer; 4]>::try_from(created) {
            Ok([positions, normals, styles, indices]) => Ok(Self {
                positions,
                normals,
                styles,
                indices,
            }),
            Err(partial) => {
                for buffer in partial {
                    buffer.release(ctx);
                }
                Err(GraphicsError::Allocation("mesh buffers").into())
            }
        }
    }

    fn upload<G: GraphicsContext>(&self, ctx: &mut G, mesh: &ExtrusionMesh) -> usize {
        self.positions
            .upload(ctx, BufferTarget::Array, mesh.position_bytes());
        self.normals.upload(ctx, BufferTarget::Array, mesh.normal_bytes());
        self.styles.upload(ctx, BufferTarget::Array, mesh.style_bytes());
        self.indices
            .upload(ctx, BufferTarget::ElementArray, mesh.index_bytes());
        mesh.position_bytes().len()
            + mesh.normal_bytes().len()
            + mesh.style_bytes().len()
            + mesh.index_bytes().len()
    }

    fn bind<G: GraphicsContext>(&self, ctx: &mut G) {
        for (buffer, attrib) in [
            (&self.positions, POSITION_ATTRIB),
            (&self.normals, NORMAL_ATTRIB),
            (&self.styles, STYLE_ATTRIB),
        ] {
            buffer.bind(ctx, BufferTarget::Array);
            ctx.enable_vertex_attribs(&[attrib]);
        }
        self.indices.bind(ctx, BufferTarget::ElementArray);
    }

    fn release<G: GraphicsContext>(self, ctx: &mut G) {
        self.positions.release(ctx);
        self.normals.release(ctx);
        self.styles.release(ctx);
        self.indices.release(ctx);
    }
}

/// Lit 3D extrusions of polygon features, drawn with one indexed call
pub struct ExtrudeLayer<G: GraphicsContext> {
    ctx: G,
    config: Config,
    styles: Styles,
    features: Vec<Feature>,
    state: LayerState,
    mesh: Option<ExtrusionMesh>,
    target_zoom: Option<f64>,
    program: ProgramSlot,
    buffers: Option<MeshBuffers>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<G: GraphicsContext> ExtrudeLayer<G> {
    pub fn new(ctx: G, config: Config, styles: Styles) -> Self {
        Self {
            ctx,
            config,
            styles,
            features: Vec::new(),
            state: LayerState::Empty,
            mesh: None,
            target_zoom: None,
            program: ProgramSlot::default(),
            buffers: None,
        }
    }

    /// Replace the style rules; fill styles and the mesh are rebuilt on the next draw
    pub fn set_style(&mut self, styles: Styles) {
        self.styles = styles;
        self.state.invalidate_style();
        tracing::debug!("Extrude layer style changed: {:?}", self.state);
    }

    /// Replace the feature data; the mesh is rebuilt on the next draw
    pub fn set_data(&mut self, features: Vec<Feature>) {
        self.features = features;
        self.state.invalidate_data();
        tracing::debug!(
            "Extrude layer data replaced with {} features: {:?}",
            self.features.len(),
            self.state
        );
    }

    /// Change the lighting; applied on the next draw without a rebuild
    pub fn set_lighting(&mut self, lighting: LightingOptions) {
        self.config.lighting = lighting;
    }

    pub fn lighting(&self) -> &LightingOptions {
        &self.config.lighting
    }

    /// Rebuild if needed, then draw the whole mesh in one indexed call
    pub fn draw(&mut self, view: &dyn MapView) -> Result<DrawReport> {
        if self.state.is_ready() && self.target_zoom != Some(view.target_zoom()) {
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
        profiling::scope!("extrude_layer::rebuild");

        let program_created = self.program.ensure(
            &mut self.ctx,
            self.styles.len(),
            shaders::extrude_program,
            shaders::EXTRUDE_UNIFORMS,
        )?;
        if rebuild.atlas || program_created {
            if let Some(program) = &self.program.program {
                self.ctx.use_program(program.id());
                self.ctx.set_uniform(
                    "u_fill_styles",
                    Uniform::FloatArray(self.styles.fill_styles_uniform()),
                );
            }
        }

        let mesh = ExtrusionBuilder::new(view, &self.styles, &self.config).build(&self.features);
        let buffers = match self.buffers.take() {
            Some(buffers) => buffers,
            None => MeshBuffers::create(&mut self.ctx)?,
        };
        let uploaded = buffers.upload(&mut self.ctx, &mesh);
        self.buffers = Some(buffers);
        self.mesh = Some(mesh);
        self.target_zoom = Some(view.target_zoom());
        Ok(uploaded)
    }

    fn render(&mut self, view: &dyn MapView) -> Result<usize> {
        let (Some(program), Some(buffers), Some(mesh)) =
            (&self.program.program, &self.buffers, &self.mesh)
        else {
            return Ok(0);
        };
        let index_count = draw_count(mesh.indices.len())?;

        self.ctx.use_program(program.id());
        self.ctx.set_capabilities(Capabilities {
            depth_test: true,
            blend: false,
        });
        buffers.bind(&mut self.ctx);

        let lighting = &self.config.lighting;
        self.ctx.set_uniform(
            "u_matrix",
            Uniform::Mat4(view.view_projection_matrix().to_cols_array()),
        );
        self.ctx
            .set_uniform("u_lightpos", Uniform::Vec3(lighting.light_direction()));
        self.ctx
            .set_uniform("u_lightcolor", Uniform::Vec3(lighting.light_color));
        self.ctx
            .set_uniform("u_ambientlight", Uniform::Vec3(lighting.ambient_light));
        self.ctx.set_uniform(
            "u_lightintensity",
            Uniform::Float(lighting.light_intensity),
        );

        if !mesh.is_empty() {
            self.ctx
                .draw_elements(DrawMode::Triangles, index_count, IndexType::U32);
        }
        Ok(mesh.triangle_count())
    }

    /// Release every GPU resource and drop the mesh; the next draw rebuilds
    pub fn teardown(&mut self) {
        self.program.release(&mut self.ctx);
        if let Some(buffers) = self.buffers.take() {
            buffers.release(&mut self.ctx);
        }
        self.mesh = None;
        self.target_zoom = None;
        self.state.reset();
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn styles(&self) -> &Styles {
        &self.styles
    }

    /// Mesh of the last build
    pub fn mesh(&self) -> Option<&ExtrusionMesh> {
        self.mesh.as_ref()
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

impl<G: GraphicsContext> Drop for ExtrudeLayer<G> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DrawCall, RecordingContext};
    use crate::test_support::{PixelView, square_marker_styles};
    use geo::Coord;
    use serde_json::json;

    fn square(kind: &str) -> Feature {
        let ring = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]
            .iter()
            .map(|&(x, y)| Coord { x, y })
            .collect();
        Feature::polygon(
            vec![ring],
            json!({"kind": kind, "height": 5}).as_object().cloned().unwrap(),
        )
    }

    fn layer() -> ExtrudeLayer<RecordingContext> {
        ExtrudeLayer::new(
            RecordingContext::new(),
            Config::default(),
            square_marker_styles(&[("a", 1.0), ("b", 1.0)]),
        )
    }

    #[test]
    fn test_draw_uploads_four_buffers_once() {
        let mut layer = layer();
        layer.set_data(vec![square("a")]);
        let view = PixelView::identity();

        let first = layer.draw(&view).unwrap();
        assert!(first.rebuilt());
        assert_eq!(first.primitives, 10);
        let second = layer.draw(&view).unwrap();
        assert!(!second.rebuilt());
        assert_eq!(second.uploaded_bytes, 0);

        let recording = layer.context().recording();
        let recording = recording.borrow();
        assert_eq!(recording.buffer_uploads(), 4);
        assert!(recording.capabilities().depth_test);
        assert!(!recording.capabilities().blend);
        assert_eq!(
            recording.draws()[1],
            DrawCall::Elements {
                mode: DrawMode::Triangles,
                count: 30,
                index_type: IndexType::U32
            }
        );
    }

    #[test]
    fn test_lighting_change_needs_no_rebuild() {
        let mut layer = layer();
        layer.set_data(vec![square("a")]);
        let view = PixelView::identity();
        layer.draw(&view).unwrap();

        layer.set_lighting(LightingOptions {
            light_intensity: 0.9,
            ..Default::default()
        });
        assert!(!layer.draw(&view).unwrap().rebuilt());
        let recording = layer.context().recording();
        assert_eq!(
            recording.borrow().uniform("u_lightintensity"),
            Some(&Uniform::Float(0.9))
        );
    }

    #[test]
    fn test_fill_styles_uploaded_on_style_change() {
        let mut layer = layer();
        layer.set_data(vec![square("b")]);
        let view = PixelView::identity();
        layer.draw(&view).unwrap();
        assert!(layer.mesh().unwrap().styles.iter().all(|&s| s == 1.0));

        layer.set_style(square_marker_styles(&[("b", 1.0)]));
        let report = layer.draw(&view).unwrap();
        assert_eq!(report.rebuild, Some(Rebuild { atlas: true }));
        assert!(layer.mesh().unwrap().styles.iter().all(|&s| s == 0.0));
        let recording = layer.context().recording();
        match recording.borrow().uniform("u_fill_styles") {
            Some(Uniform::FloatArray(values)) => assert_eq!(values.len(), 4),
            other => panic!("unexpected uniform {other:?}"),
        }
    }

    #[test]
    fn test_empty_data_draws_nothing() {
        let mut layer = layer();
        let report = layer.draw(&PixelView::identity()).unwrap();
        assert_eq!(report.primitives, 0);
        assert!(layer.context().recording().borrow().draws().is_empty());
    }

    #[test]
    fn test_partial_buffer_allocation_is_released() {
        let mut layer = ExtrudeLayer::new(
            RecordingContext::with_buffer_limit(2),
            Config::default(),
            square_marker_styles(&[("a", 1.0)]),
        );
        layer.set_data(vec![square("a")]);
        let result = layer.draw(&PixelView::identity());
        assert!(matches!(
            result,
            Err(crate::LayerError::Graphics(GraphicsError::Allocation(_)))
        ));

        let recording = layer.context().recording();
        assert_eq!(recording.borrow().live_buffers().count(), 0);
        drop(layer);
        assert_eq!(recording.borrow().live_resource_count(), 0);
    }
}
