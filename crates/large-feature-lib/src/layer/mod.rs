//! Frame drivers
//!
//! A layer owns its feature list, its style rules, every GPU resource it created and the CPU
//! data derived from them. Mutations only move the [`LayerState`](crate::LayerState); the
//! next [`draw`](PointLayer::draw) performs the rebuild, uploads exactly once, and later
//! draws just rebind buffers and refresh per-frame uniforms.

mod extrude;
mod point;

pub use extrude::ExtrudeLayer;
pub use point::PointLayer;

use crate::gpu::{GpuProgram, GraphicsContext};
use crate::{LayerError, Rebuild};

/// What a single draw did
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DrawReport {
    /// Rebuild performed before drawing, if any
    pub rebuild: Option<Rebuild>,
    /// Bytes sent to buffers and textures during this draw
    pub uploaded_bytes: usize,
    /// Points or triangles submitted
    pub primitives: usize,
}

impl DrawReport {
    pub fn rebuilt(&self) -> bool {
        self.rebuild.is_some()
    }
}

/// Element count as passed to the graphics context
fn draw_count(count: usize) -> crate::Result<u32> {
    u32::try_from(count).map_err(|_| LayerError::DrawCountOverflow(count))
}

/// Program slot that is recompiled only when the style count changes
#[derive(Debug, Default)]
struct ProgramSlot {
    program: Option<GpuProgram>,
    style_count: usize,
}

impl ProgramSlot {
    /// Make sure a program for `style_count` styles exists; returns whether one was created
    fn ensure<G: GraphicsContext>(
        &mut self,
        ctx: &mut G,
        style_count: usize,
        sources: impl FnOnce(usize) -> (String, String),
        uniforms: &[&str],
    ) -> crate::Result<bool> {
        if self.program.is_some() && self.style_count == style_count {
            return Ok(false);
        }
        if let Some(old) = self.program.take() {
            old.release(ctx);
        }
        let (vertex, fragment) = sources(style_count);
        self.program = Some(GpuProgram::create(ctx, &vertex, &fragment, uniforms)?);
        self.style_count = style_count;
        tracing::debug!("Compiled program for {} styles", style_count);
        Ok(true)
    }

    fn release<G: GraphicsContext>(&mut self, ctx: &mut G) {
        if let Some(program) = self.program.take() {
            program.release(ctx);
        }
    }
}
