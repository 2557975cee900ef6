//! An in-memory stand-in for a GL driver, for tests.
//!
//! Object names come from one counter shared by every kind, and deleted names
//! are handed out again first, as real drivers like to do. Buffer and texture
//! contents live in plain vectors. Anything the fake doesn't model answers with
//! defaults rather than failing.

use crate::hooks::{Attachment, GlHooks, VertexAttrib, DYNAMIC_STORAGE_BIT};
use crate::initstate::bytes_per_pixel;
use crate::resource::ResourceKind;

use gleam::gl::{self, GLbitfield, GLenum, GLfloat, GLint, GLsizei, GLuint};

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ptr;

/// A call the fake saw that produces pixels or reads them.
#[derive(Clone, Debug, PartialEq)]
pub enum FakeDraw {
    Clear(GLbitfield),
    Arrays { mode: GLenum, first: GLint, count: GLsizei },
    Elements { mode: GLenum, count: GLsizei, ty: GLenum, offset: usize },
    Compute(GLuint, GLuint, GLuint),
    ReadPixels,
}

#[derive(Default)]
struct Texture {
    target: GLenum,
    view_of: Option<GLuint>,
    format: GLenum,
    ty: GLenum,
    levels: BTreeMap<(GLenum, GLint), (GLsizei, GLsizei, Vec<u8>)>,
}

#[derive(Default)]
struct VertexArray {
    element_buffer: GLuint,
    attribs: BTreeMap<GLuint, VertexAttrib>,
}

#[derive(Default)]
struct State {
    next_name: GLuint,
    free: Vec<GLuint>,
    buffers: HashMap<GLuint, Vec<u8>>,
    /// Storage flags of buffers allocated with `buffer_storage`.
    immutable: HashMap<GLuint, GLbitfield>,
    invalid_operations: usize,
    textures: HashMap<GLuint, Texture>,
    sampler_ints: HashMap<(GLuint, GLenum), GLint>,
    sampler_floats: HashMap<(GLuint, GLenum), GLfloat>,
    framebuffers: HashMap<GLuint, BTreeMap<GLenum, Attachment>>,
    vertex_arrays: HashMap<GLuint, VertexArray>,
    transform_feedback: HashMap<GLuint, BTreeMap<GLuint, GLuint>>,
    shader_sources: HashMap<GLuint, String>,
    live: BTreeMap<GLuint, ResourceKind>,
    draw_framebuffer: GLuint,
    clear_color: [GLfloat; 4],
    draws: Vec<FakeDraw>,
    flushes: Vec<(GLuint, usize, usize)>,
}

impl State {
    fn name(&mut self, kind: ResourceKind) -> GLuint {
        let name = match self.free.pop() {
            Some(name) => name,
            None => {
                self.next_name += 1;
                self.next_name
            }
        };
        self.live.insert(name, kind);
        name
    }

    fn write_buffer(&mut self, buffer: GLuint, offset: usize, data: &[u8]) {
        if let Some(contents) = self.buffers.get_mut(&buffer) {
            if let Some(range) = contents.get_mut(offset..offset + data.len()) {
                range.copy_from_slice(data);
            }
        }
    }

    /// The texture whose storage `texture` uses.
    fn storage(&self, texture: GLuint) -> GLuint {
        match self.textures.get(&texture).and_then(|t| t.view_of) {
            Some(original) => original,
            None => texture,
        }
    }
}

pub struct FakeGl {
    state: RefCell<State>,
}

impl FakeGl {
    pub fn new() -> FakeGl {
        FakeGl {
            state: RefCell::new(State::default()),
        }
    }

    pub fn buffer_contents(&self, buffer: GLuint) -> Vec<u8> {
        self.state.borrow().buffers.get(&buffer).cloned().unwrap_or_default()
    }

    pub fn texture_pixels(&self, texture: GLuint, face: GLenum, level: GLint) -> Vec<u8> {
        let state = self.state.borrow();
        let storage = state.storage(texture);
        state
            .textures
            .get(&storage)
            .and_then(|t| t.levels.get(&(face, level)))
            .map(|(_, _, pixels)| pixels.clone())
            .unwrap_or_default()
    }

    pub fn shader_source(&self, shader: GLuint) -> Option<String> {
        self.state.borrow().shader_sources.get(&shader).cloned()
    }

    pub fn draws(&self) -> Vec<FakeDraw> {
        self.state.borrow().draws.clone()
    }

    pub fn clear_draws(&self) {
        self.state.borrow_mut().draws.clear();
    }

    /// Every `flush_mapped_buffer_range` call: buffer, offset, length.
    pub fn flushes(&self) -> Vec<(GLuint, usize, usize)> {
        self.state.borrow().flushes.clone()
    }

    /// How many calls were refused with `GL_INVALID_OPERATION`.
    pub fn invalid_operations(&self) -> usize {
        self.state.borrow().invalid_operations
    }

    /// The names of every object not yet deleted, of `kind`.
    pub fn live_objects(&self, kind: ResourceKind) -> Vec<GLuint> {
        self.state
            .borrow()
            .live
            .iter()
            .filter(|&(_, &k)| k == kind)
            .map(|(&name, _)| name)
            .collect()
    }
}

fn level_bytes(format: GLenum, ty: GLenum, width: GLsizei, height: GLsizei) -> usize {
    let pixel = bytes_per_pixel(format, ty).unwrap_or(4);
    pixel * width.max(0) as usize * height.max(0) as usize
}

unsafe impl GlHooks for FakeGl {
    fn gen_buffer(&self) -> GLuint {
        let mut state = self.state.borrow_mut();
        let name = state.name(ResourceKind::Buffer);
        state.buffers.insert(name, vec![]);
        name
    }

    fn buffer_data(&self, buffer: GLuint, size: usize, data: Option<&[u8]>, _usage: GLenum) {
        let mut contents = vec![0; size];
        if let Some(data) = data {
            let len = data.len().min(size);
            contents[..len].copy_from_slice(&data[..len]);
        }
        let mut state = self.state.borrow_mut();
        state.buffers.insert(buffer, contents);
        state.immutable.remove(&buffer);
    }

    fn buffer_storage(&self, buffer: GLuint, size: usize, data: Option<&[u8]>, flags: GLbitfield) {
        self.buffer_data(buffer, size, data, gl::STATIC_DRAW);
        self.state.borrow_mut().immutable.insert(buffer, flags);
    }

    /// Immutable storage only takes this with `DYNAMIC_STORAGE_BIT`.
    fn buffer_sub_data(&self, buffer: GLuint, offset: usize, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        let flags = state.immutable.get(&buffer).copied();
        match flags {
            Some(flags) if flags & DYNAMIC_STORAGE_BIT == 0 => {
                state.invalid_operations += 1;
            }
            _ => state.write_buffer(buffer, offset, data),
        }
    }

    fn get_buffer_sub_data(&self, buffer: GLuint, offset: usize, out: &mut [u8]) {
        let state = self.state.borrow();
        if let Some(contents) = state.buffers.get(&buffer) {
            if let Some(range) = contents.get(offset..offset + out.len()) {
                out.copy_from_slice(range);
            }
        }
    }

    fn copy_buffer_sub_data(&self, read: GLuint, write: GLuint,
                            read_offset: usize, write_offset: usize, size: usize) {
        let mut source = vec![0; size];
        self.get_buffer_sub_data(read, read_offset, &mut source);
        self.state.borrow_mut().write_buffer(write, write_offset, &source);
    }

    fn map_buffer_range(&self, buffer: GLuint, offset: usize, length: usize,
                        _access: GLbitfield) -> *mut u8 {
        let mut state = self.state.borrow_mut();
        match state.buffers.get_mut(&buffer) {
            Some(contents) if offset + length <= contents.len() => {
                contents[offset..].as_mut_ptr()
            }
            _ => ptr::null_mut(),
        }
    }

    fn flush_mapped_buffer_range(&self, buffer: GLuint, offset: usize, length: usize) {
        self.state.borrow_mut().flushes.push((buffer, offset, length));
    }

    fn unmap_buffer(&self, _buffer: GLuint) -> bool {
        true
    }

    fn memory_barrier(&self, _barriers: GLbitfield) {}

    fn create_texture(&self, target: GLenum) -> GLuint {
        let mut state = self.state.borrow_mut();
        let name = state.name(ResourceKind::Texture);
        state.textures.insert(
            name,
            Texture {
                target,
                ..Texture::default()
            },
        );
        name
    }

    fn tex_image_2d(&self, texture: GLuint, target: GLenum, level: GLint, _internal_format: GLint,
                    width: GLsizei, height: GLsizei, format: GLenum, ty: GLenum,
                    data: Option<&[u8]>) {
        let mut state = self.state.borrow_mut();
        let storage = state.storage(texture);
        let texture = state.textures.entry(storage).or_default();
        let mut pixels = vec![0; level_bytes(format, ty, width, height)];
        if let Some(data) = data {
            let len = data.len().min(pixels.len());
            pixels[..len].copy_from_slice(&data[..len]);
        }
        texture.format = format;
        texture.ty = ty;
        texture.levels.insert((target, level), (width, height, pixels));
    }

    fn tex_sub_image_2d(&self, texture: GLuint, target: GLenum, level: GLint,
                        x: GLint, y: GLint, width: GLsizei, height: GLsizei,
                        format: GLenum, ty: GLenum, data: &[u8]) {
        let pixel = bytes_per_pixel(format, ty).unwrap_or(4);
        let mut state = self.state.borrow_mut();
        let storage = state.storage(texture);
        let (level_width, _, pixels) = match state
            .textures
            .get_mut(&storage)
            .and_then(|t| t.levels.get_mut(&(target, level)))
        {
            Some(found) => found,
            None => return,
        };
        let row_len = width.max(0) as usize * pixel;
        for row in 0..height.max(0) as usize {
            let src = row * row_len;
            let dst = ((y.max(0) as usize + row) * *level_width as usize + x.max(0) as usize) * pixel;
            if let (Some(from), Some(to)) = (data.get(src..src + row_len), pixels.get_mut(dst..dst + row_len)) {
                to.copy_from_slice(from);
            }
        }
    }

    fn get_tex_image(&self, texture: GLuint, target: GLenum, level: GLint,
                     _format: GLenum, _ty: GLenum, out: &mut [u8]) {
        let pixels = self.texture_pixels(texture, target, level);
        let len = pixels.len().min(out.len());
        out[..len].copy_from_slice(&pixels[..len]);
    }

    fn tex_parameter_i(&self, _texture: GLuint, _pname: GLenum, _value: GLint) {}

    fn texture_view(&self, texture: GLuint, target: GLenum, original: GLuint,
                    _internal_format: GLenum, _min_level: GLuint, _num_levels: GLuint,
                    _min_layer: GLuint, _num_layers: GLuint) {
        let mut state = self.state.borrow_mut();
        let storage = state.storage(original);
        let view = state.textures.entry(texture).or_default();
        view.target = target;
        view.view_of = Some(storage);
    }

    fn bind_texture_unit(&self, _unit: GLuint, _texture: GLuint) {}

    fn create_sampler(&self) -> GLuint {
        self.state.borrow_mut().name(ResourceKind::Sampler)
    }

    fn sampler_parameter_i(&self, sampler: GLuint, pname: GLenum, value: GLint) {
        self.state.borrow_mut().sampler_ints.insert((sampler, pname), value);
    }

    fn sampler_parameter_f(&self, sampler: GLuint, pname: GLenum, value: GLfloat) {
        self.state.borrow_mut().sampler_floats.insert((sampler, pname), value);
    }

    fn get_sampler_parameter_i(&self, sampler: GLuint, pname: GLenum) -> GLint {
        let state = self.state.borrow();
        state.sampler_ints.get(&(sampler, pname)).copied().unwrap_or(0)
    }

    fn get_sampler_parameter_f(&self, sampler: GLuint, pname: GLenum) -> GLfloat {
        let state = self.state.borrow();
        state.sampler_floats.get(&(sampler, pname)).copied().unwrap_or(0.0)
    }

    fn bind_sampler(&self, _unit: GLuint, _sampler: GLuint) {}

    fn create_framebuffer(&self) -> GLuint {
        let mut state = self.state.borrow_mut();
        let name = state.name(ResourceKind::Framebuffer);
        state.framebuffers.insert(name, BTreeMap::new());
        name
    }

    fn framebuffer_texture(&self, framebuffer: GLuint, attachment: GLenum,
                           texture: GLuint, level: GLint) {
        let mut state = self.state.borrow_mut();
        let attachments = state.framebuffers.entry(framebuffer).or_default();
        if texture == 0 {
            attachments.remove(&attachment);
        } else {
            attachments.insert(
                attachment,
                Attachment {
                    object_type: gl::TEXTURE,
                    name: texture,
                    level,
                },
            );
        }
    }

    fn framebuffer_renderbuffer(&self, framebuffer: GLuint, attachment: GLenum,
                                renderbuffer: GLuint) {
        let mut state = self.state.borrow_mut();
        let attachments = state.framebuffers.entry(framebuffer).or_default();
        if renderbuffer == 0 {
            attachments.remove(&attachment);
        } else {
            attachments.insert(
                attachment,
                Attachment {
                    object_type: gl::RENDERBUFFER,
                    name: renderbuffer,
                    level: 0,
                },
            );
        }
    }

    fn get_framebuffer_attachment(&self, framebuffer: GLuint, attachment: GLenum) -> Attachment {
        let state = self.state.borrow();
        state
            .framebuffers
            .get(&framebuffer)
            .and_then(|attachments| attachments.get(&attachment))
            .copied()
            .unwrap_or(Attachment {
                object_type: gl::NONE,
                name: 0,
                level: 0,
            })
    }

    fn bind_framebuffer(&self, target: GLenum, framebuffer: GLuint) {
        if target == gl::FRAMEBUFFER || target == gl::DRAW_FRAMEBUFFER {
            self.state.borrow_mut().draw_framebuffer = framebuffer;
        }
    }

    fn create_renderbuffer(&self) -> GLuint {
        self.state.borrow_mut().name(ResourceKind::Renderbuffer)
    }

    fn renderbuffer_storage(&self, _renderbuffer: GLuint, _internal_format: GLenum,
                            _samples: GLsizei, _width: GLsizei, _height: GLsizei) {}

    fn create_vertex_array(&self) -> GLuint {
        let mut state = self.state.borrow_mut();
        let name = state.name(ResourceKind::VertexArray);
        state.vertex_arrays.insert(name, VertexArray::default());
        name
    }

    fn vertex_attrib_pointer(&self, vertex_array: GLuint, index: GLuint, buffer: GLuint,
                             size: GLint, ty: GLenum, normalized: bool, stride: GLsizei,
                             offset: usize) {
        let mut state = self.state.borrow_mut();
        let attrib = state
            .vertex_arrays
            .entry(vertex_array)
            .or_default()
            .attribs
            .entry(index)
            .or_default();
        attrib.buffer = buffer;
        attrib.size = size;
        attrib.ty = ty;
        attrib.normalized = normalized;
        attrib.stride = stride;
        attrib.offset = offset;
    }

    fn enable_vertex_attrib(&self, vertex_array: GLuint, index: GLuint, enabled: bool) {
        let mut state = self.state.borrow_mut();
        let vao = state.vertex_arrays.entry(vertex_array).or_default();
        vao.attribs.entry(index).or_default().enabled = enabled;
    }

    fn vertex_array_element_buffer(&self, vertex_array: GLuint, buffer: GLuint) {
        let mut state = self.state.borrow_mut();
        state.vertex_arrays.entry(vertex_array).or_default().element_buffer = buffer;
    }

    fn get_vertex_attrib(&self, vertex_array: GLuint, index: GLuint) -> VertexAttrib {
        let state = self.state.borrow();
        state
            .vertex_arrays
            .get(&vertex_array)
            .and_then(|vao| vao.attribs.get(&index))
            .copied()
            .unwrap_or_default()
    }

    fn get_vertex_array_element_buffer(&self, vertex_array: GLuint) -> GLuint {
        let state = self.state.borrow();
        state.vertex_arrays.get(&vertex_array).map_or(0, |vao| vao.element_buffer)
    }

    fn max_vertex_attribs(&self) -> GLuint {
        16
    }

    fn bind_vertex_array(&self, _vertex_array: GLuint) {}

    fn create_transform_feedback(&self) -> GLuint {
        let mut state = self.state.borrow_mut();
        let name = state.name(ResourceKind::TransformFeedback);
        state.transform_feedback.insert(name, BTreeMap::new());
        name
    }

    fn transform_feedback_buffer(&self, transform_feedback: GLuint, index: GLuint,
                                 buffer: GLuint) {
        let mut state = self.state.borrow_mut();
        state.transform_feedback.entry(transform_feedback).or_default().insert(index, buffer);
    }

    fn get_transform_feedback_buffer(&self, transform_feedback: GLuint, index: GLuint) -> GLuint {
        let state = self.state.borrow();
        state
            .transform_feedback
            .get(&transform_feedback)
            .and_then(|buffers| buffers.get(&index))
            .copied()
            .unwrap_or(0)
    }

    fn bind_transform_feedback(&self, _transform_feedback: GLuint) {}

    fn create_program_pipeline(&self) -> GLuint {
        self.state.borrow_mut().name(ResourceKind::ProgramPipeline)
    }

    fn use_program_stages(&self, _pipeline: GLuint, _stages: GLbitfield, _program: GLuint) {}

    fn bind_program_pipeline(&self, _pipeline: GLuint) {}

    fn create_shader(&self, _kind: GLenum) -> GLuint {
        self.state.borrow_mut().name(ResourceKind::Shader)
    }

    fn shader_source(&self, shader: GLuint, source: &str) {
        self.state.borrow_mut().shader_sources.insert(shader, source.to_string());
    }

    fn compile_shader(&self, _shader: GLuint) {}

    fn create_program(&self) -> GLuint {
        self.state.borrow_mut().name(ResourceKind::Program)
    }

    fn attach_shader(&self, _program: GLuint, _shader: GLuint) {}

    fn link_program(&self, _program: GLuint) {}

    fn use_program(&self, _program: GLuint) {}

    fn create_query(&self) -> GLuint {
        self.state.borrow_mut().name(ResourceKind::Query)
    }

    fn begin_query(&self, _target: GLenum, _query: GLuint) {}

    fn end_query(&self, _target: GLenum) {}

    fn fence_sync(&self, _condition: GLenum) -> GLuint {
        self.state.borrow_mut().name(ResourceKind::Sync)
    }

    fn delete_object(&self, kind: ResourceKind, name: GLuint) {
        let mut state = self.state.borrow_mut();
        if state.live.get(&name) != Some(&kind) {
            return;
        }
        state.live.remove(&name);
        state.free.push(name);
        match kind {
            ResourceKind::Buffer => {
                state.buffers.remove(&name);
                state.immutable.remove(&name);
            }
            ResourceKind::Texture => {
                state.textures.remove(&name);
            }
            ResourceKind::Sampler => {
                state.sampler_ints.retain(|&(sampler, _), _| sampler != name);
                state.sampler_floats.retain(|&(sampler, _), _| sampler != name);
            }
            ResourceKind::Framebuffer => {
                state.framebuffers.remove(&name);
            }
            ResourceKind::VertexArray => {
                state.vertex_arrays.remove(&name);
            }
            ResourceKind::TransformFeedback => {
                state.transform_feedback.remove(&name);
            }
            ResourceKind::Shader => {
                state.shader_sources.remove(&name);
            }
            _ => {}
        }
    }

    fn clear_color(&self, red: GLfloat, green: GLfloat, blue: GLfloat, alpha: GLfloat) {
        self.state.borrow_mut().clear_color = [red, green, blue, alpha];
    }

    /// Clearing the color buffer fills an RGBA8 texture at color attachment
    /// zero of the bound draw framebuffer.
    fn clear(&self, mask: GLbitfield) {
        let mut state = self.state.borrow_mut();
        state.draws.push(FakeDraw::Clear(mask));
        if mask & gl::COLOR_BUFFER_BIT == 0 {
            return;
        }
        let target = match state
            .framebuffers
            .get(&state.draw_framebuffer)
            .and_then(|attachments| attachments.get(&gl::COLOR_ATTACHMENT0))
        {
            Some(attachment) if attachment.object_type == gl::TEXTURE => *attachment,
            _ => return,
        };
        let color: Vec<u8> = state.clear_color.iter().map(|&c| (c.max(0.0).min(1.0) * 255.0).round() as u8).collect();
        let storage = state.storage(target.name);
        if let Some(texture) = state.textures.get_mut(&storage) {
            if (texture.format, texture.ty) != (gl::RGBA, gl::UNSIGNED_BYTE) {
                return;
            }
            let face = texture.target;
            if let Some((_, _, pixels)) = texture.levels.get_mut(&(face, target.level)) {
                for pixel in pixels.chunks_mut(4) {
                    pixel.copy_from_slice(&color);
                }
            }
        }
    }

    fn viewport(&self, _x: GLint, _y: GLint, _width: GLsizei, _height: GLsizei) {}

    fn draw_arrays(&self, mode: GLenum, first: GLint, count: GLsizei) {
        self.state.borrow_mut().draws.push(FakeDraw::Arrays { mode, first, count });
    }

    fn draw_elements(&self, mode: GLenum, count: GLsizei, ty: GLenum, offset: usize) {
        self.state.borrow_mut().draws.push(FakeDraw::Elements { mode, count, ty, offset });
    }

    fn multi_draw_arrays(&self, mode: GLenum, firsts: &[GLint], counts: &[GLsizei]) {
        for (&first, &count) in firsts.iter().zip(counts) {
            self.draw_arrays(mode, first, count);
        }
    }

    fn dispatch_compute(&self, x: GLuint, y: GLuint, z: GLuint) {
        self.state.borrow_mut().draws.push(FakeDraw::Compute(x, y, z));
    }

    fn read_pixels(&self, _x: GLint, _y: GLint, _width: GLsizei, _height: GLsizei,
                   _format: GLenum, _ty: GLenum, out: &mut [u8]) {
        self.state.borrow_mut().draws.push(FakeDraw::ReadPixels);
        for byte in out {
            *byte = 0;
        }
    }
}
