//! Graphics-context collaborator and scoped GPU resources
//!
//! Layers never call a graphics API directly. They talk to a [`GraphicsContext`], which a
//! host implements on top of GL/WebGL/wgpu, and hold every resource in a scoped handle
//! ([`GpuProgram`], [`GpuBuffer`], [`GpuTexture`]) that can only be released through the
//! context that created it.

mod recording;
pub mod shaders;

pub use recording::{Call, DrawCall, Recording, RecordingContext};

/// Failures reported by a graphics context; fatal to the layer that hit them
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphicsError {
    #[error("Shader compilation failed: {0}")]
    ShaderCompile(String),

    #[error("Program link failed: {0}")]
    ProgramLink(String),

    #[error("Failed to allocate {0}")]
    Allocation(&'static str),

    #[error("Context lost")]
    ContextLost,
}

pub type GraphicsResult<T> = std::result::Result<T, GraphicsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Buffer binding point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attributes
    Array,
    /// Triangle indices
    ElementArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Points,
    Triangles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U32,
}

/// One float attribute sourced from the currently bound array buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttrib {
    pub name: &'static str,
    /// Float components per vertex
    pub components: u32,
    /// Bytes between consecutive vertices
    pub stride: u32,
    /// Byte offset of the first component
    pub offset: u32,
}

/// Value for a named uniform
#[derive(Debug, Clone, PartialEq)]
pub enum Uniform {
    Float(f32),
    Vec3([f32; 3]),
    Mat4([f32; 16]),
    FloatArray(Vec<f32>),
    /// Texture unit
    Sampler(u32),
}

/// Fixed-function state a program needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub depth_test: bool,
    pub blend: bool,
}

/// Host graphics API as seen by the layers
pub trait GraphicsContext {
    /// Compile and link a program exposing the named uniforms
    fn create_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
        uniforms: &[&str],
    ) -> GraphicsResult<ProgramId>;

    fn use_program(&mut self, program: ProgramId);

    fn create_buffer(&mut self) -> GraphicsResult<BufferId>;

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferId>);

    /// Replace the contents of the buffer bound to `target`
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8]);

    /// Describe the attributes read from the currently bound array buffer
    fn enable_vertex_attribs(&mut self, attribs: &[VertexAttrib]);

    /// Upload tightly packed RGBA8 pixels as a new texture
    fn load_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> GraphicsResult<TextureId>;

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);

    /// Set a uniform of the program in use
    fn set_uniform(&mut self, name: &str, value: Uniform);

    fn set_capabilities(&mut self, capabilities: Capabilities);

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32);

    fn draw_elements(&mut self, mode: DrawMode, count: u32, index_type: IndexType);

    fn delete_buffer(&mut self, buffer: BufferId);

    fn delete_texture(&mut self, texture: TextureId);

    fn delete_program(&mut self, program: ProgramId);
}

macro_rules! scoped_handle {
    ($(#[$meta:meta])* $name:ident, $id:ty, $delete:ident) => {
        $(#[$meta])*
        #[derive(Debug)]
        #[must_use = "GPU resources must be released through their context"]
        pub struct $name {
            id: $id,
        }

        impl $name {
            pub fn id(&self) -> $id {
                self.id
            }

            /// Delete the resource; the handle cannot be used afterwards
            pub fn release(self, ctx: &mut impl GraphicsContext) {
                let id = self.id;
                std::mem::forget(self);
                ctx.$delete(id);
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                tracing::warn!("{} {:?} dropped without release", stringify!($name), self.id);
            }
        }
    };
}

scoped_handle!(
    /// A linked shader program
    GpuProgram,
    ProgramId,
    delete_program
);
scoped_handle!(
    /// A vertex or index buffer
    GpuBuffer,
    BufferId,
    delete_buffer
);
scoped_handle!(
    /// An uploaded texture
    GpuTexture,
    TextureId,
    delete_texture
);

impl GpuProgram {
    pub fn create(
        ctx: &mut impl GraphicsContext,
        vertex_source: &str,
        fragment_source: &str,
        uniforms: &[&str],
    ) -> GraphicsResult<Self> {
        let id = ctx.create_program(vertex_source, fragment_source, uniforms)?;
        Ok(Self { id })
    }
}

impl GpuBuffer {
    pub fn create(ctx: &mut impl GraphicsContext) -> GraphicsResult<Self> {
        Ok(Self {
            id: ctx.create_buffer()?,
        })
    }

    /// Bind to `target` and replace the contents
    pub fn upload(&self, ctx: &mut impl GraphicsContext, target: BufferTarget, data: &[u8]) {
        ctx.bind_buffer(target, Some(self.id));
        ctx.buffer_data(target, data);
    }

    pub fn bind(&self, ctx: &mut impl GraphicsContext, target: BufferTarget) {
        ctx.bind_buffer(target, Some(self.id));
    }
}

impl GpuTexture {
    pub fn create(ctx: &mut impl GraphicsContext, image: &image::RgbaImage) -> GraphicsResult<Self> {
        let id = ctx.load_texture(image.width(), image.height(), image.as_raw())?;
        Ok(Self { id })
    }
}
