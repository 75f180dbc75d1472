//! In-memory graphics context
//!
//! Records every call instead of talking to a GPU. The CLI uses it for headless runs and the
//! tests use it to check upload counts, buffer contents and resource lifetimes. The
//! recording is shared through an `Rc<RefCell<_>>` so it stays readable after the context
//! has been moved into a layer.

use super::{
    BufferId, BufferTarget, Capabilities, DrawMode, GraphicsContext, GraphicsError,
    GraphicsResult, IndexType, ProgramId, TextureId, Uniform, VertexAttrib,
};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateProgram(ProgramId),
    UseProgram(ProgramId),
    CreateBuffer(BufferId),
    BindBuffer(BufferTarget, Option<BufferId>),
    BufferData(BufferTarget, usize),
    EnableVertexAttribs(Vec<VertexAttrib>),
    LoadTexture(TextureId, u32, u32),
    BindTexture(u32, Option<TextureId>),
    SetUniform(String),
    SetCapabilities(Capabilities),
    Draw(DrawCall),
    DeleteBuffer(BufferId),
    DeleteTexture(TextureId),
    DeleteProgram(ProgramId),
}

/// A recorded draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCall {
    Arrays {
        mode: DrawMode,
        first: u32,
        count: u32,
    },
    Elements {
        mode: DrawMode,
        count: u32,
        index_type: IndexType,
    },
}

/// Everything a [`RecordingContext`] has seen
#[derive(Debug, Default)]
pub struct Recording {
    calls: Vec<Call>,
    next_id: u32,
    programs: BTreeSet<ProgramId>,
    buffers: BTreeSet<BufferId>,
    textures: BTreeSet<TextureId>,
    bound: HashMap<BufferTarget, BufferId>,
    buffer_contents: HashMap<BufferId, Vec<u8>>,
    texture_sizes: HashMap<TextureId, (u32, u32)>,
    uniforms: HashMap<String, Uniform>,
    capabilities: Capabilities,
    buffer_uploads: usize,
    texture_uploads: usize,
    fail_shader_compile: bool,
    buffers_created: usize,
    buffer_limit: Option<usize>,
}

impl Recording {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Number of `buffer_data` calls so far
    pub fn buffer_uploads(&self) -> usize {
        self.buffer_uploads
    }

    /// Number of `load_texture` calls so far
    pub fn texture_uploads(&self) -> usize {
        self.texture_uploads
    }

    pub fn draws(&self) -> Vec<DrawCall> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Draw(draw) => Some(*draw),
                _ => None,
            })
            .collect()
    }

    /// Programs, buffers and textures created and not yet deleted
    pub fn live_resource_count(&self) -> usize {
        self.programs.len() + self.buffers.len() + self.textures.len()
    }

    pub fn live_buffers(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.buffers.iter().copied()
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffer_contents.get(&buffer).map(Vec::as_slice)
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.texture_sizes.get(&texture).copied()
    }

    /// Last value set for a uniform
    pub fn uniform(&self, name: &str) -> Option<&Uniform> {
        self.uniforms.get(name)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Forget recorded calls while keeping resource state
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

/// Graphics context that records calls into a shared [`Recording`]
#[derive(Debug, Clone, Default)]
pub struct RecordingContext {
    recording: Rc<RefCell<Recording>>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose program creation always fails to compile
    pub fn failing_shaders() -> Self {
        let context = Self::new();
        context.recording.borrow_mut().fail_shader_compile = true;
        context
    }

    /// Context that fails every `create_buffer` after the first `limit`
    pub fn with_buffer_limit(limit: usize) -> Self {
        let context = Self::new();
        context.recording.borrow_mut().buffer_limit = Some(limit);
        context
    }

    /// Shared handle on the recording
    pub fn recording(&self) -> Rc<RefCell<Recording>> {
        Rc::clone(&self.recording)
    }
}

impl GraphicsContext for RecordingContext {
    fn create_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
        _uniforms: &[&str],
    ) -> GraphicsResult<ProgramId> {
        let mut recording = self.recording.borrow_mut();
        if recording.fail_shader_compile {
            return Err(GraphicsError::ShaderCompile(format!(
                "refusing {} + {} bytes of source",
                vertex_source.len(),
                fragment_source.len()
            )));
        }
        let id = ProgramId(recording.next_id());
        recording.programs.insert(id);
        recording.calls.push(Call::CreateProgram(id));
        Ok(id)
    }

    fn use_program(&mut self, program: ProgramId) {
        self.recording.borrow_mut().calls.push(Call::UseProgram(program));
    }

    fn create_buffer(&mut self) -> GraphicsResult<BufferId> {
        let mut recording = self.recording.borrow_mut();
        if recording
            .buffer_limit
            .is_some_and(|limit| recording.buffers_created >= limit)
        {
            return Err(GraphicsError::Allocation("buffer"));
        }
        recording.buffers_created += 1;
        let id = BufferId(recording.next_id());
        recording.buffers.insert(id);
        recording.calls.push(Call::CreateBuffer(id));
        Ok(id)
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferId>) {
        let mut recording = self.recording.borrow_mut();
        match buffer {
            Some(id) => recording.bound.insert(target, id),
            None => recording.bound.remove(&target),
        };
        recording.calls.push(Call::BindBuffer(target, buffer));
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8]) {
        let mut recording = self.recording.borrow_mut();
        let Some(&buffer) = recording.bound.get(&target) else {
            tracing::warn!("buffer_data on {:?} with no buffer bound", target);
            return;
        };
        recording.buffer_contents.insert(buffer, data.to_vec());
        recording.buffer_uploads += 1;
        recording.calls.push(Call::BufferData(target, data.len()));
    }

    fn enable_vertex_attribs(&mut self, attribs: &[VertexAttrib]) {
        self.recording
            .borrow_mut()
            .calls
            .push(Call::EnableVertexAttribs(attribs.to_vec()));
    }

    fn load_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> GraphicsResult<TextureId> {
        if rgba.len() != width as usize * height as usize * 4 {
            return Err(GraphicsError::Allocation("texture with mismatched pixel data"));
        }
        let mut recording = self.recording.borrow_mut();
        let id = TextureId(recording.next_id());
        recording.textures.insert(id);
        recording.texture_sizes.insert(id, (width, height));
        recording.texture_uploads += 1;
        recording.calls.push(Call::LoadTexture(id, width, height));
        Ok(id)
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        self.recording
            .borrow_mut()
            .calls
            .push(Call::BindTexture(unit, texture));
    }

    fn set_uniform(&mut self, name: &str, value: Uniform) {
        let mut recording = self.recording.borrow_mut();
        recording.uniforms.insert(name.to_string(), value);
        recording.calls.push(Call::SetUniform(name.to_string()));
    }

    fn set_capabilities(&mut self, capabilities: Capabilities) {
        let mut recording = self.recording.borrow_mut();
        recording.capabilities = capabilities;
        recording.calls.push(Call::SetCapabilities(capabilities));
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) {
        self.recording
            .borrow_mut()
            .calls
            .push(Call::Draw(DrawCall::Arrays { mode, first, count }));
    }

    fn draw_elements(&mut self, mode: DrawMode, count: u32, index_type: IndexType) {
        self.recording
            .borrow_mut()
            .calls
            .push(Call::Draw(DrawCall::Elements {
                mode,
                count,
                index_type,
            }));
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        let mut recording = self.recording.borrow_mut();
        recording.buffers.remove(&buffer);
        recording.buffer_contents.remove(&buffer);
        recording.bound.retain(|_, bound| *bound != buffer);
        recording.calls.push(Call::DeleteBuffer(buffer));
    }

    fn delete_texture(&mut self, texture: TextureId) {
        let mut recording = self.recording.borrow_mut();
        recording.textures.remove(&texture);
        recording.texture_sizes.remove(&texture);
        recording.calls.push(Call::DeleteTexture(texture));
    }

    fn delete_program(&mut self, program: ProgramId) {
        let mut recording = self.recording.borrow_mut();
        recording.programs.remove(&program);
        recording.calls.push(Call::DeleteProgram(program));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_draws_and_uniforms() {
        let mut ctx = RecordingContext::new();
        let recording = ctx.recording();
        ctx.set_uniform("u_scale", Uniform::Float(2.0));
        ctx.draw_arrays(DrawMode::Points, 0, 3);
        ctx.draw_elements(DrawMode::Triangles, 6, IndexType::U32);

        let recording = recording.borrow();
        assert_eq!(recording.uniform("u_scale"), Some(&Uniform::Float(2.0)));
        assert_eq!(recording.draws().len(), 2);
        assert_eq!(
            recording.draws()[0],
            DrawCall::Arrays {
                mode: DrawMode::Points,
                first: 0,
                count: 3
            }
        );
    }

    #[test]
    fn test_buffer_data_requires_binding() {
        let mut ctx = RecordingContext::new();
        let recording = ctx.recording();
        ctx.buffer_data(BufferTarget::Array, &[0; 4]);
        assert_eq!(recording.borrow().buffer_uploads(), 0);
    }

    #[test]
    fn test_texture_size_checked() {
        let mut ctx = RecordingContext::new();
        assert!(ctx.load_texture(2, 2, &[0; 3]).is_err());
        let id = ctx.load_texture(2, 1, &[0; 8]).unwrap();
        assert_eq!(ctx.recording().borrow().texture_size(id), Some((2, 1)));
    }

    #[test]
    fn test_ids_are_unique_across_kinds() {
        let mut ctx = RecordingContext::new();
        let a = ctx.create_buffer().unwrap();
        let b = ctx.create_buffer().unwrap();
        let p = ctx.create_program("", "", &[]).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.0, p.0);
    }
}
