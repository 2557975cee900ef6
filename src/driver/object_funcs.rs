//! Samplers, framebuffers, renderbuffers, vertex arrays, transform feedback,
//! program pipelines, shaders, programs, queries and syncs, and deleting
//! objects of any kind.

use super::GlCapture;
use crate::chunk::{Chunk, ChunkOp};
use crate::hooks::GlHooks;
use crate::params;
use crate::record::FrameRefType;
use crate::resource::{ResourceId, ResourceKind};

use gleam::gl::{self, GLbitfield, GLenum, GLfloat, GLint, GLsizei, GLuint};

impl<H: GlHooks> GlCapture<H> {
    /// Register an object the driver just created and record `op` creating
    /// it. `build` gets the new id.
    fn record_creation<P, F>(&mut self, kind: ResourceKind, name: GLuint, op: ChunkOp, build: F)
    where
        P: crate::serial::Serialise,
        F: FnOnce(ResourceId) -> P,
    {
        let id = self.create(kind, name);
        self.use_resource(id, FrameRefType::Write);
        let chunk = Chunk::new(op, &mut build(id));
        self.record_call(id, chunk);
    }

    /// Make `parent` one of `id`'s dependencies, and note its use.
    fn depend_on(&mut self, id: ResourceId, parent: ResourceId) {
        self.use_resource(parent, FrameRefType::Read);
        if let Some(record) = self.manager.record_mut(id) {
            record.add_parent(parent);
        }
    }

    pub fn create_sampler(&mut self) -> GLuint {
        let name = self.gl.create_sampler();
        self.record_creation(ResourceKind::Sampler, name, ChunkOp::CreateSampler,
                             |sampler| params::CreateSampler { sampler });
        name
    }

    pub fn sampler_parameter_i(&mut self, sampler: GLuint, pname: GLenum, value: GLint) {
        let id = self.id_of(ResourceKind::Sampler, sampler);
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.sampler_parameter_i(sampler, pname, value);
        self.respecify(id, |chunk| {
            chunk.op() == ChunkOp::SamplerParameterI
                && chunk.read::<params::SamplerParameterI>().map_or(false, |p| p.pname == pname)
        });
        self.record_call(
            id,
            Chunk::new(
                ChunkOp::SamplerParameterI,
                &mut params::SamplerParameterI { sampler: id, pname, value },
            ),
        );
    }

    pub fn sampler_parameter_f(&mut self, sampler: GLuint, pname: GLenum, value: GLfloat) {
        let id = self.id_of(ResourceKind::Sampler, sampler);
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.sampler_parameter_f(sampler, pname, value);
        self.respecify(id, |chunk| {
            chunk.op() == ChunkOp::SamplerParameterF
                && chunk.read::<params::SamplerParameterF>().map_or(false, |p| p.pname == pname)
        });
        self.record_call(
            id,
            Chunk::new(
                ChunkOp::SamplerParameterF,
                &mut params::SamplerParameterF { sampler: id, pname, value },
            ),
        );
    }

    pub fn bind_sampler(&mut self, unit: GLuint, sampler: GLuint) {
        let id = self.id_of(ResourceKind::Sampler, sampler);
        self.use_resource(id, FrameRefType::Unknown);
        self.gl.bind_sampler(unit, sampler);
        if id.is_null() {
            self.render.samplers.remove(&unit);
        } else {
            self.render.samplers.insert(unit, id);
        }
        self.record_call(
            ResourceId::NULL,
            Chunk::new(ChunkOp::BindSampler, &mut params::BindSampler { unit, sampler: id }),
        );
    }

    pub fn create_framebuffer(&mut self) -> GLuint {
        let name = self.gl.create_framebuffer();
        self.record_creation(ResourceKind::Framebuffer, name, ChunkOp::CreateFramebuffer,
                             |framebuffer| params::CreateFramebuffer { framebuffer });
        name
    }

    /// Drop `framebuffer`'s recorded attachment at `attachment`, and note what
    /// is attached there now.
    fn attach(&mut self, framebuffer: ResourceId, attachment: GLenum, object: ResourceId) {
        self.depend_on(framebuffer, object);
        if let Some(data) = self.manager.record_mut(framebuffer).and_then(|r| r.framebuffer_mut()) {
            if object.is_null() {
                data.attachments.remove(&attachment);
            } else {
                data.attachments.insert(attachment, object);
            }
        }
        self.respecify(framebuffer, |chunk| match chunk.op() {
            ChunkOp::FramebufferTexture => chunk
                .read::<params::FramebufferTexture>()
                .map_or(false, |p| p.attachment == attachment),
            ChunkOp::FramebufferRenderbuffer => chunk
                .read::<params::FramebufferRenderbuffer>()
                .map_or(false, |p| p.attachment == attachment),
            _ => false,
        });
    }

    pub fn framebuffer_texture(&mut self, framebuffer: GLuint, attachment: GLenum,
                               texture: GLuint, level: GLint) {
        let id = self.id_of(ResourceKind::Framebuffer, framebuffer);
        let texture_id = self.id_of(ResourceKind::Texture, texture);
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.framebuffer_texture(framebuffer, attachment, texture, level);
        self.attach(id, attachment, texture_id);
        self.record_call(
            id,
            Chunk::new(
                ChunkOp::FramebufferTexture,
                &mut params::FramebufferTexture {
                    framebuffer: id,
                    attachment,
                    texture: texture_id,
                    level,
                },
            ),
        );
    }

    pub fn framebuffer_renderbuffer(&mut self, framebuffer: GLuint, attachment: GLenum,
                                    renderbuffer: GLuint) {
        let id = self.id_of(ResourceKind::Framebuffer, framebuffer);
        let renderbuffer_id = self.id_of(ResourceKind::Renderbuffer, renderbuffer);
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.framebuffer_renderbuffer(framebuffer, attachment, renderbuffer);
        self.attach(id, attachment, renderbuffer_id);
        self.record_call(
            id,
            Chunk::new(
                ChunkOp::FramebufferRenderbuffer,
                &mut params::FramebufferRenderbuffer {
                    framebuffer: id,
                    attachment,
                    renderbuffer: renderbuffer_id,
                },
            ),
        );
    }

    pub fn bind_framebuffer(&mut self, target: GLenum, framebuffer: GLuint) {
        let id = self.id_of(ResourceKind::Framebuffer, framebuffer);
        self.use_resource(id, FrameRefType::Unknown);
        self.gl.bind_framebuffer(target, framebuffer);
        match target {
            gl::DRAW_FRAMEBUFFER => self.render.draw_framebuffer = id,
            gl::READ_FRAMEBUFFER => self.render.read_framebuffer = id,
            _ => {
                self.render.draw_framebuffer = id;
                self.render.read_framebuffer = id;
            }
        }
        self.record_call(
            ResourceId::NULL,
            Chunk::new(ChunkOp::BindFramebuffer, &mut params::BindFramebuffer { target, framebuffer: id }),
        );
    }

    pub fn create_renderbuffer(&mut self) -> GLuint {
        let name = self.gl.create_renderbuffer();
        self.record_creation(ResourceKind::Renderbuffer, name, ChunkOp::CreateRenderbuffer,
                             |renderbuffer| params::CreateRenderbuffer { renderbuffer });
        name
    }

    pub fn renderbuffer_storage(&mut self, renderbuffer: GLuint, internal_format: GLenum,
                                samples: GLsizei, width: GLsizei, height: GLsizei) {
        let id = self.id_of(ResourceKind::Renderbuffer, renderbuffer);
        self.use_resource(id, FrameRefType::Write);
        self.gl.renderbuffer_storage(renderbuffer, internal_format, samples, width, height);
        self.respecify(id, |chunk| chunk.op() == ChunkOp::RenderbufferStorage);
        self.record_call(
            id,
            Chunk::new(
                ChunkOp::RenderbufferStorage,
                &mut params::RenderbufferStorage {
                    renderbuffer: id,
                    internal_format,
                    samples,
                    width,
                    height,
                },
            ),
        );
    }

    pub fn create_vertex_array(&mut self) -> GLuint {
        let name = self.gl.create_vertex_array();
        self.record_creation(ResourceKind::VertexArray, name, ChunkOp::CreateVertexArray,
                             |vertex_array| params::CreateVertexArray { vertex_array });
        name
    }

    pub fn vertex_attrib_pointer(&mut self, vertex_array: GLuint, index: GLuint, buffer: GLuint,
                                 size: GLint, ty: GLenum, normalized: bool, stride: GLsizei,
                                 offset: usize) {
        let id = self.id_of(ResourceKind::VertexArray, vertex_array);
        let buffer_id = self.id_of(ResourceKind::Buffer, buffer);
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.vertex_attrib_pointer(vertex_array, index, buffer, size, ty, normalized, stride, offset);
        self.depend_on(id, buffer_id);
        if let Some(data) = self.manager.record_mut(id).and_then(|r| r.vertex_array_mut()) {
            data.attrib_buffers.insert(index, buffer_id);
        }
        self.respecify(id, |chunk| {
            chunk.op() == ChunkOp::VertexAttribPointer
                && chunk.read::<params::VertexAttribPointer>().map_or(false, |p| p.index == index)
        });
        self.record_call(
            id,
            Chunk::new(
                ChunkOp::VertexAttribPointer,
                &mut params::VertexAttribPointer {
                    vertex_array: id,
                    index,
                    buffer: buffer_id,
                    size,
                    ty,
                    normalized,
                    stride,
                    offset: offset as u64,
                },
            ),
        );
    }

    pub fn enable_vertex_attrib(&mut self, vertex_array: GLuint, index: GLuint, enabled: bool) {
        let id = self.id_of(ResourceKind::VertexArray, vertex_array);
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.enable_vertex_attrib(vertex_array, index, enabled);
        self.respecify(id, |chunk| {
            chunk.op() == ChunkOp::EnableVertexAttrib
                && chunk.read::<params::EnableVertexAttrib>().map_or(false, |p| p.index == index)
        });
        self.record_call(
            id,
            Chunk::new(
                ChunkOp::EnableVertexAttrib,
                &mut params::EnableVertexAttrib { vertex_array: id, index, enabled },
            ),
        );
    }

    pub fn vertex_array_element_buffer(&mut self, vertex_array: GLuint, buffer: GLuint) {
        let id = self.id_of(ResourceKind::VertexArray, vertex_array);
        let buffer_id = self.id_of(ResourceKind::Buffer, buffer);
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.vertex_array_element_buffer(vertex_array, buffer);
        self.depend_on(id, buffer_id);
        if let Some(data) = self.manager.record_mut(id).and_then(|r| r.vertex_array_mut()) {
            data.element_buffer = buffer_id;
        }
        self.respecify(id, |chunk| chunk.op() == ChunkOp::VertexArrayElementBuffer);
        self.record_call(
            id,
            Chunk::new(
                ChunkOp::VertexArrayElementBuffer,
                &mut params::VertexArrayElementBuffer { vertex_array: id, buffer: buffer_id },
            ),
        );
    }

    pub fn bind_vertex_array(&mut self, vertex_array: GLuint) {
        let id = self.id_of(ResourceKind::VertexArray, vertex_array);
        self.use_resource(id, FrameRefType::Unknown);
        self.gl.bind_vertex_array(vertex_array);
        self.render.vertex_array = id;
        self.record_call(
            ResourceId::NULL,
            Chunk::new(ChunkOp::BindVertexArray, &mut params::BindVertexArray { vertex_array: id }),
        );
    }

    pub fn create_transform_feedback(&mut self) -> GLuint {
        let name = self.gl.create_transform_feedback();
        self.record_creation(ResourceKind::TransformFeedback, name, ChunkOp::CreateTransformFeedback,
                             |transform_feedback| params::CreateTransformFeedback { transform_feedback });
        name
    }

    pub fn transform_feedback_buffer(&mut self, transform_feedback: GLuint, index: GLuint,
                                     buffer: GLuint) {
        let id = self.id_of(ResourceKind::TransformFeedback, transform_feedback);
        let buffer_id = self.id_of(ResourceKind::Buffer, buffer);
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.transform_feedback_buffer(transform_feedback, index, buffer);
        self.depend_on(id, buffer_id);
        if let Some(data) = self.manager.record_mut(id).and_then(|r| r.transform_feedback_mut()) {
            data.buffers.insert(index, buffer_id);
        }
        self.respecify(id, |chunk| {
            chunk.op() == ChunkOp::TransformFeedbackBuffer
                && chunk.read::<params::TransformFeedbackBuffer>().map_or(false, |p| p.index == index)
        });
        self.record_call(
            id,
            Chunk::new(
                ChunkOp::TransformFeedbackBuffer,
                &mut params::TransformFeedbackBuffer {
                    transform_feedback: id,
                    index,
                    buffer: buffer_id,
                },
            ),
        );
    }

    pub fn bind_transform_feedback(&mut self, transform_feedback: GLuint) {
        let id = self.id_of(ResourceKind::TransformFeedback, transform_feedback);
        self.use_resource(id, FrameRefType::Unknown);
        self.gl.bind_transform_feedback(transform_feedback);
        self.render.transform_feedback = id;
        self.record_call(
            ResourceId::NULL,
            Chunk::new(
                ChunkOp::BindTransformFeedback,
                &mut params::BindTransformFeedback { transform_feedback: id },
            ),
        );
    }

    pub fn create_program_pipeline(&mut self) -> GLuint {
        let name = self.gl.create_program_pipeline();
        self.record_creation(ResourceKind::ProgramPipeline, name, ChunkOp::CreateProgramPipeline,
                             |pipeline| params::CreateProgramPipeline { pipeline });
        name
    }

    pub fn use_program_stages(&mut self, pipeline: GLuint, stages: GLbitfield, program: GLuint) {
        let id = self.id_of(ResourceKind::ProgramPipeline, pipeline);
        let program_id = self.id_of(ResourceKind::Program, program);
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.use_program_stages(pipeline, stages, program);
        self.depend_on(id, program_id);
        self.record_call(
            id,
            Chunk::new(
                ChunkOp::UseProgramStages,
                &mut params::UseProgramStages {
                    pipeline: id,
                    stages,
                    program: program_id,
                },
            ),
        );
    }

    pub fn bind_program_pipeline(&mut self, pipeline: GLuint) {
        let id = self.id_of(ResourceKind::ProgramPipeline, pipeline);
        self.use_resource(id, FrameRefType::Unknown);
        self.gl.bind_program_pipeline(pipeline);
        self.render.pipeline = id;
        self.record_call(
            ResourceId::NULL,
            Chunk::new(ChunkOp::BindProgramPipeline, &mut params::BindProgramPipeline { pipeline: id }),
        );
    }

    pub fn create_shader(&mut self, kind: GLenum) -> GLuint {
        let name = self.gl.create_shader(kind);
        self.record_creation(ResourceKind::Shader, name, ChunkOp::CreateShader,
                             |shader| params::CreateShader { shader, kind });
        name
    }

    pub fn shader_source(&mut self, shader: GLuint, source: &str) {
        let id = self.id_of(ResourceKind::Shader, shader);
        self.use_resource(id, FrameRefType::Write);
        self.gl.shader_source(shader, source);
        self.respecify(id, |chunk| {
            chunk.op() == ChunkOp::ShaderSource || chunk.op() == ChunkOp::CompileShader
        });
        self.record_call(
            id,
            Chunk::new(
                ChunkOp::ShaderSource,
                &mut params::ShaderSource {
                    shader: id,
                    source: source.to_string(),
                },
            ),
        );
    }

    pub fn compile_shader(&mut self, shader: GLuint) {
        let id = self.id_of(ResourceKind::Shader, shader);
        self.use_resource(id, FrameRefType::Read);
        self.gl.compile_shader(shader);
        self.record_call(id, Chunk::new(ChunkOp::CompileShader, &mut params::CompileShader { shader: id }));
    }

    pub fn create_program(&mut self) -> GLuint {
        let name = self.gl.create_program();
        self.record_creation(ResourceKind::Program, name, ChunkOp::CreateProgram,
                             |program| params::CreateProgram { program });
        name
    }

    pub fn attach_shader(&mut self, program: GLuint, shader: GLuint) {
        let id = self.id_of(ResourceKind::Program, program);
        let shader_id = self.id_of(ResourceKind::Shader, shader);
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.attach_shader(program, shader);
        self.depend_on(id, shader_id);
        self.record_call(
            id,
            Chunk::new(ChunkOp::AttachShader, &mut params::AttachShader { program: id, shader: shader_id }),
        );
    }

    pub fn link_program(&mut self, program: GLuint) {
        let id = self.id_of(ResourceKind::Program, program);
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.link_program(program);
        self.record_call(id, Chunk::new(ChunkOp::LinkProgram, &mut params::LinkProgram { program: id }));
    }

    pub fn use_program(&mut self, program: GLuint) {
        let id = self.id_of(ResourceKind::Program, program);
        self.use_resource(id, FrameRefType::Unknown);
        self.gl.use_program(program);
        self.render.program = id;
        self.record_call(
            ResourceId::NULL,
            Chunk::new(ChunkOp::UseProgram, &mut params::UseProgram { program: id }),
        );
    }

    pub fn create_query(&mut self) -> GLuint {
        let name = self.gl.create_query();
        self.record_creation(ResourceKind::Query, name, ChunkOp::CreateQuery,
                             |query| params::CreateQuery { query });
        name
    }

    pub fn begin_query(&mut self, target: GLenum, query: GLuint) {
        let id = self.id_of(ResourceKind::Query, query);
        self.use_resource(id, FrameRefType::Write);
        self.gl.begin_query(target, query);
        self.record_call(
            ResourceId::NULL,
            Chunk::new(ChunkOp::BeginQuery, &mut params::BeginQuery { target, query: id }),
        );
    }

    pub fn end_query(&mut self, target: GLenum) {
        self.gl.end_query(target);
        self.record_call(ResourceId::NULL, Chunk::new(ChunkOp::EndQuery, &mut params::EndQuery { target }));
    }

    /// `glFenceSync`. Return the name the hooks gave the sync object.
    pub fn fence_sync(&mut self, condition: GLenum) -> GLuint {
        let name = self.gl.fence_sync(condition);
        self.record_creation(ResourceKind::Sync, name, ChunkOp::FenceSync,
                             |sync| params::FenceSync { sync, condition });
        name
    }

    /// Delete the object of type `kind` the current context calls `name`.
    ///
    /// The driver may hand `name` out again at once. The object's id is never
    /// reused, and during a capture its record lives until the frame ends.
    pub fn delete_object(&mut self, kind: ResourceKind, name: GLuint) {
        let id = self.id_of(kind, name);
        if id.is_null() {
            self.gl.delete_object(kind, name);
            return;
        }
        self.use_resource(id, FrameRefType::Unknown);

        if kind == ResourceKind::Buffer {
            if let Some(record) = self.manager.record_mut(id) {
                let native = record.resource.name;
                if let Some(buffer) = record.buffer_mut() {
                    self.maps.release(&self.gl, id, native, buffer);
                }
            }
        }
        self.gl.delete_object(kind, name);
        self.render.unbind(id);

        if let Some(frame) = self.frame.as_mut() {
            frame
                .chunks
                .push(Chunk::new(ChunkOp::DeleteResource, &mut params::DeleteResource { resource: id }));
        }
        self.manager.release(id);
        log::trace!("{:?} {} ({}) deleted", kind, name, id);
    }
}
