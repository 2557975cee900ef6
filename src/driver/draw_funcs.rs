//! Fixed state, drawing, compute, readback and barriers.

use super::GlCapture;
use crate::chunk::{Chunk, ChunkOp};
use crate::hooks::{GlHooks, CLIENT_MAPPED_BUFFER_BARRIER_BIT};
use crate::params;
use crate::record::FrameRefType;
use crate::resource::ResourceId;

use gleam::gl::{GLbitfield, GLenum, GLfloat, GLint, GLsizei, GLuint};

impl<H: GlHooks> GlCapture<H> {
    pub fn clear_color(&mut self, red: GLfloat, green: GLfloat, blue: GLfloat, alpha: GLfloat) {
        self.gl.clear_color(red, green, blue, alpha);
        self.render.clear_color = [red, green, blue, alpha];
        self.record_call(
            ResourceId::NULL,
            Chunk::new(ChunkOp::ClearColor, &mut params::ClearColor { red, green, blue, alpha }),
        );
    }

    pub fn viewport(&mut self, x: GLint, y: GLint, width: GLsizei, height: GLsizei) {
        self.gl.viewport(x, y, width, height);
        self.render.viewport = [x, y, width, height];
        self.record_call(
            ResourceId::NULL,
            Chunk::new(ChunkOp::Viewport, &mut params::Viewport { x, y, width, height }),
        );
    }

    /// The objects attached to `framebuffer`.
    fn attachments(&self, framebuffer: ResourceId) -> Vec<ResourceId> {
        self.manager
            .record(framebuffer)
            .and_then(|record| record.framebuffer())
            .map(|data| data.attachments.values().copied().collect())
            .unwrap_or_default()
    }

    /// Note the objects a draw uses. Everything bound is read; the draw
    /// framebuffer's attachments and any transform feedback buffers are
    /// written, as `targets` says, and their histories stop describing them.
    fn note_draw(&mut self, targets: FrameRefType) {
        self.sync_coherent_maps();
        for id in self.render.bound_objects() {
            self.use_resource(id, FrameRefType::Read);
        }

        let mut written = self.attachments(self.render.draw_framebuffer);
        let transform_feedback = self.render.transform_feedback;
        if let Some(data) = self
            .manager
            .record(transform_feedback)
            .and_then(|record| record.transform_feedback())
        {
            written.extend(data.buffers.values().copied());
        }
        for id in written {
            self.use_resource(id, targets);
            self.manager.mark_dirty(id);
        }
    }

    pub fn clear(&mut self, mask: GLbitfield) {
        self.note_draw(FrameRefType::Write);
        self.gl.clear(mask);
        self.record_call(ResourceId::NULL, Chunk::new(ChunkOp::Clear, &mut params::Clear { mask }));
    }

    pub fn draw_arrays(&mut self, mode: GLenum, first: GLint, count: GLsizei) {
        self.note_draw(FrameRefType::ReadBeforeWrite);
        self.gl.draw_arrays(mode, first, count);
        self.record_call(
            ResourceId::NULL,
            Chunk::new(ChunkOp::DrawArrays, &mut params::DrawArrays { mode, first, count }),
        );
    }

    /// `glDrawElements` with the element buffer of the bound vertex array.
    /// `offset` is a byte offset into that buffer.
    pub fn draw_elements(&mut self, mode: GLenum, count: GLsizei, ty: GLenum, offset: usize) {
        self.note_draw(FrameRefType::ReadBeforeWrite);
        self.gl.draw_elements(mode, count, ty, offset);
        self.record_call(
            ResourceId::NULL,
            Chunk::new(
                ChunkOp::DrawElements,
                &mut params::DrawElements {
                    mode,
                    count,
                    ty,
                    offset: offset as u64,
                },
            ),
        );
    }

    /// `glMultiDrawArrays`. Replay lists each of the draws it makes as an
    /// event of its own.
    pub fn multi_draw_arrays(&mut self, mode: GLenum, firsts: &[GLint], counts: &[GLsizei]) {
        if firsts.len() != counts.len() {
            log::error!("multi_draw_arrays: {} firsts but {} counts; ignoring call",
                        firsts.len(), counts.len());
            return;
        }
        self.note_draw(FrameRefType::ReadBeforeWrite);
        self.gl.multi_draw_arrays(mode, firsts, counts);
        self.record_call(
            ResourceId::NULL,
            Chunk::new(
                ChunkOp::MultiDrawArrays,
                &mut params::MultiDrawArrays {
                    mode,
                    firsts: firsts.to_vec(),
                    counts: counts.to_vec(),
                },
            ),
        );
    }

    pub fn dispatch_compute(&mut self, x: GLuint, y: GLuint, z: GLuint) {
        self.sync_coherent_maps();
        for id in self.render.bound_objects() {
            self.use_resource(id, FrameRefType::Read);
        }
        self.gl.dispatch_compute(x, y, z);
        self.record_call(
            ResourceId::NULL,
            Chunk::new(ChunkOp::DispatchCompute, &mut params::DispatchCompute { x, y, z }),
        );
    }

    /// `glReadPixels` from the read framebuffer into `out`. The pixels
    /// themselves are not recorded; replay reads them again.
    pub fn read_pixels(&mut self, x: GLint, y: GLint, width: GLsizei, height: GLsizei,
                       format: GLenum, ty: GLenum, out: &mut [u8]) {
        self.sync_coherent_maps();
        let framebuffer = self.render.read_framebuffer;
        self.use_resource(framebuffer, FrameRefType::Read);
        for id in self.attachments(framebuffer) {
            self.use_resource(id, FrameRefType::Read);
        }
        self.gl.read_pixels(x, y, width, height, format, ty, out);
        self.record_call(
            ResourceId::NULL,
            Chunk::new(
                ChunkOp::ReadPixels,
                &mut params::ReadPixels { x, y, width, height, format, ty },
            ),
        );
    }

    /// `glMemoryBarrier`. The client-mapped-buffer bit is what makes writes
    /// through persistent maps visible, so that's when we propagate them.
    pub fn memory_barrier(&mut self, barriers: GLbitfield) {
        if barriers & CLIENT_MAPPED_BUFFER_BARRIER_BIT != 0 {
            for id in self.maps.pending_persistent(&self.manager) {
                self.use_resource(id, FrameRefType::ReadBeforeWrite);
            }
            let flushed = self.maps.persistent_barrier(&self.gl, &mut self.manager);
            for (id, chunk) in flushed {
                self.record_call(id, chunk);
            }
        }
        self.gl.memory_barrier(barriers);
        self.record_call(
            ResourceId::NULL,
            Chunk::new(ChunkOp::MemoryBarrier, &mut params::MemoryBarrier { barriers }),
        );
    }
}
