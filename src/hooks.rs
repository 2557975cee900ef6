//! The table of real GL entry points that capture and replay call through.
//!
//! The interception layer that sits between an application and its GL driver
//! is outside this crate. It hands us an implementation of `GlHooks`, whose
//! methods call the real driver functions. Methods take `&self`, as `gleam::Gl`
//! does; drivers keep their own state.
//!
//! The methods use the direct-state-access forms of the GL API, which name the
//! object they affect rather than acting on whatever is bound. Implementations
//! for contexts without DSA can emulate them with bind/operate/restore.

use crate::resource::ResourceKind;

use gleam::gl::{GLbitfield, GLenum, GLfloat, GLint, GLsizei, GLuint};

// GL 4.4 buffer storage and mapping bits, which gleam's bindings don't cover.
pub const MAP_PERSISTENT_BIT: GLbitfield = 0x0040;
pub const MAP_COHERENT_BIT: GLbitfield = 0x0080;
pub const DYNAMIC_STORAGE_BIT: GLbitfield = 0x0100;
pub const CLIENT_MAPPED_BUFFER_BARRIER_BIT: GLbitfield = 0x4000;

pub const TEXTURE_2D_MULTISAMPLE_ARRAY: GLenum = 0x9102;
pub const TEXTURE_CUBE_MAP_ARRAY: GLenum = 0x9009;

/// The state of one vertex attribute of a vertex array object.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct VertexAttrib {
    pub enabled: bool,
    pub buffer: GLuint,
    pub size: GLint,
    pub ty: GLenum,
    pub normalized: bool,
    pub stride: GLsizei,
    pub offset: usize,
}

/// What is attached at one framebuffer attachment point.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Attachment {
    /// `gl::TEXTURE`, `gl::RENDERBUFFER` or `gl::NONE`.
    pub object_type: GLenum,
    pub name: GLuint,
    pub level: GLint,
}

/// The real GL entry points.
///
/// # Safety
///
/// The pointer `map_buffer_range` returns must be valid for reads and writes of
/// the requested length until the matching `unmap_buffer` call, or until the
/// buffer is deleted, whichever comes first. The capture layer hands that
/// memory to the application and copies through it.
pub unsafe trait GlHooks {
    fn gen_buffer(&self) -> GLuint;
    fn buffer_data(&self, buffer: GLuint, size: usize, data: Option<&[u8]>, usage: GLenum);
    fn buffer_storage(&self, buffer: GLuint, size: usize, data: Option<&[u8]>, flags: GLbitfield);
    fn buffer_sub_data(&self, buffer: GLuint, offset: usize, data: &[u8]);
    fn get_buffer_sub_data(&self, buffer: GLuint, offset: usize, out: &mut [u8]);
    fn copy_buffer_sub_data(&self, read: GLuint, write: GLuint,
                            read_offset: usize, write_offset: usize, size: usize);
    fn map_buffer_range(&self, buffer: GLuint, offset: usize, length: usize,
                        access: GLbitfield) -> *mut u8;
    /// `offset` is relative to the start of the mapped range.
    fn flush_mapped_buffer_range(&self, buffer: GLuint, offset: usize, length: usize);
    fn unmap_buffer(&self, buffer: GLuint) -> bool;
    fn memory_barrier(&self, barriers: GLbitfield);

    fn create_texture(&self, target: GLenum) -> GLuint;
    /// `target` names the cube face for cube maps, and is the texture's target
    /// otherwise.
    fn tex_image_2d(&self, texture: GLuint, target: GLenum, level: GLint, internal_format: GLint,
                    width: GLsizei, height: GLsizei, format: GLenum, ty: GLenum,
                    data: Option<&[u8]>);
    fn tex_sub_image_2d(&self, texture: GLuint, target: GLenum, level: GLint,
                        x: GLint, y: GLint, width: GLsizei, height: GLsizei,
                        format: GLenum, ty: GLenum, data: &[u8]);
    fn get_tex_image(&self, texture: GLuint, target: GLenum, level: GLint,
                     format: GLenum, ty: GLenum, out: &mut [u8]);
    fn tex_parameter_i(&self, texture: GLuint, pname: GLenum, value: GLint);
    fn texture_view(&self, texture: GLuint, target: GLenum, original: GLuint,
                    internal_format: GLenum, min_level: GLuint, num_levels: GLuint,
                    min_layer: GLuint, num_layers: GLuint);
    fn bind_texture_unit(&self, unit: GLuint, texture: GLuint);

    fn create_sampler(&self) -> GLuint;
    fn sampler_parameter_i(&self, sampler: GLuint, pname: GLenum, value: GLint);
    fn sampler_parameter_f(&self, sampler: GLuint, pname: GLenum, value: GLfloat);
    fn get_sampler_parameter_i(&self, sampler: GLuint, pname: GLenum) -> GLint;
    fn get_sampler_parameter_f(&self, sampler: GLuint, pname: GLenum) -> GLfloat;
    fn bind_sampler(&self, unit: GLuint, sampler: GLuint);

    fn create_framebuffer(&self) -> GLuint;
    fn framebuffer_texture(&self, framebuffer: GLuint, attachment: GLenum,
                           texture: GLuint, level: GLint);
    fn framebuffer_renderbuffer(&self, framebuffer: GLuint, attachment: GLenum,
                                renderbuffer: GLuint);
    fn get_framebuffer_attachment(&self, framebuffer: GLuint, attachment: GLenum) -> Attachment;
    fn bind_framebuffer(&self, target: GLenum, framebuffer: GLuint);

    fn create_renderbuffer(&self) -> GLuint;
    fn renderbuffer_storage(&self, renderbuffer: GLuint, internal_format: GLenum,
                            samples: GLsizei, width: GLsizei, height: GLsizei);

    fn create_vertex_array(&self) -> GLuint;
    fn vertex_attrib_pointer(&self, vertex_array: GLuint, index: GLuint, buffer: GLuint,
                             size: GLint, ty: GLenum, normalized: bool, stride: GLsizei,
                             offset: usize);
    fn enable_vertex_attrib(&self, vertex_array: GLuint, index: GLuint, enabled: bool);
    fn vertex_array_element_buffer(&self, vertex_array: GLuint, buffer: GLuint);
    fn get_vertex_attrib(&self, vertex_array: GLuint, index: GLuint) -> VertexAttrib;
    fn get_vertex_array_element_buffer(&self, vertex_array: GLuint) -> GLuint;
    fn max_vertex_attribs(&self) -> GLuint;
    fn bind_vertex_array(&self, vertex_array: GLuint);

    fn create_transform_feedback(&self) -> GLuint;
    fn transform_feedback_buffer(&self, transform_feedback: GLuint, index: GLuint,
                                 buffer: GLuint);
    fn get_transform_feedback_buffer(&self, transform_feedback: GLuint, index: GLuint) -> GLuint;
    fn bind_transform_feedback(&self, transform_feedback: GLuint);

    fn create_program_pipeline(&self) -> GLuint;
    fn use_program_stages(&self, pipeline: GLuint, stages: GLbitfield, program: GLuint);
    fn bind_program_pipeline(&self, pipeline: GLuint);

    fn create_shader(&self, kind: GLenum) -> GLuint;
    fn shader_source(&self, shader: GLuint, source: &str);
    fn compile_shader(&self, shader: GLuint);
    fn create_program(&self) -> GLuint;
    fn attach_shader(&self, program: GLuint, shader: GLuint);
    fn link_program(&self, program: GLuint);
    fn use_program(&self, program: GLuint);

    fn create_query(&self) -> GLuint;
    fn begin_query(&self, target: GLenum, query: GLuint);
    fn end_query(&self, target: GLenum);

    /// Sync objects are pointers in GL; implementations hand out a name for
    /// each instead.
    fn fence_sync(&self, condition: GLenum) -> GLuint;

    /// Delete an object of any kind, with the matching `glDelete*` entry
    /// point.
    fn delete_object(&self, kind: ResourceKind, name: GLuint);

    fn clear_color(&self, red: GLfloat, green: GLfloat, blue: GLfloat, alpha: GLfloat);
    fn clear(&self, mask: GLbitfield);
    fn viewport(&self, x: GLint, y: GLint, width: GLsizei, height: GLsizei);
    fn draw_arrays(&self, mode: GLenum, first: GLint, count: GLsizei);
    fn draw_elements(&self, mode: GLenum, count: GLsizei, ty: GLenum, offset: usize);
    fn multi_draw_arrays(&self, mode: GLenum, firsts: &[GLint], counts: &[GLsizei]);
    fn dispatch_compute(&self, x: GLuint, y: GLuint, z: GLuint);
    fn read_pixels(&self, x: GLint, y: GLint, width: GLsizei, height: GLsizei,
                   format: GLenum, ty: GLenum, out: &mut [u8]);
}
