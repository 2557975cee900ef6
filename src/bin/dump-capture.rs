use docopt::Docopt;
use serde::Deserialize;

use gl_capture::chunk::Chunk;
use gl_capture::hooks::{Attachment, VertexAttrib};
use gl_capture::{GlContext, GlHooks, GlReplay, Recording, ResourceKind};
use gleam::gl::{GLbitfield, GLenum, GLfloat, GLint, GLsizei, GLuint};

use std::process;

const USAGE: &str = "
Dump a gl-capture capture file.

For each captured frame, list its setup chunks, its initial-state chunks and
its own chunks, with every field of each. With --events, list the frame's
replay events instead.

Usage:
  dump-capture [--events] <file>
  dump-capture (-h | --help)

Options:
  --events     List replay events and drawcalls rather than chunks.
  -h --help    Show this message.
";

#[derive(Debug, Deserialize)]
struct Args {
    arg_file: String,
    flag_events: bool,
}

fn dump_chunks(section: &str, chunks: &[Chunk]) {
    println!("  {} ({} chunks)", section, chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        println!("    {:4} {}", i, chunk.op().name());
        match chunk.fields() {
            Ok(fields) => {
                for field in fields {
                    println!("           {}", field);
                }
            }
            Err(err) => println!("           <malformed: {}>", err),
        }
    }
}

fn dump_events(recording: &Recording, index: usize) {
    // Reading a frame for replay makes no GL calls.
    match GlReplay::new(NoGl, GlContext::new(0, 0), recording, index) {
        Ok(replay) => {
            for event in replay.events() {
                match replay.get_drawcall(event.event_id) {
                    Some(drawcall) => println!("  * {:5} chunk {:4} {}",
                                               event.event_id, event.chunk_index, drawcall.name),
                    None => println!("    {:5} chunk {:4} {}",
                                     event.event_id, event.chunk_index, event.op.name()),
                }
            }
            println!("  {} events, {} drawcalls", replay.events().len(), replay.drawcalls().len());
        }
        Err(err) => println!("  frame cannot be replayed: {}", err),
    }
}

/// Hooks for decoding a capture without a driver. Replay never calls them
/// unless asked to execute something, and this tool never asks.
struct NoGl;

macro_rules! unreachable_hooks {
    ( $( fn $name:ident ( $( $arg:ident : $ty:ty ),* ) $( -> $ret:ty )? ; )* ) => {
        unsafe impl GlHooks for NoGl {
            $(
                #[allow(unused_variables)]
                fn $name(&self, $( $arg: $ty ),* ) $( -> $ret )? {
                    unreachable!(concat!("dump-capture never executes GL calls: ", stringify!($name)))
                }
            )*
        }
    }
}

unreachable_hooks! {
    fn gen_buffer() -> GLuint;
    fn buffer_data(buffer: GLuint, size: usize, data: Option<&[u8]>, usage: GLenum);
    fn buffer_storage(buffer: GLuint, size: usize, data: Option<&[u8]>, flags: GLbitfield);
    fn buffer_sub_data(buffer: GLuint, offset: usize, data: &[u8]);
    fn get_buffer_sub_data(buffer: GLuint, offset: usize, out: &mut [u8]);
    fn copy_buffer_sub_data(read: GLuint, write: GLuint, read_offset: usize, write_offset: usize, size: usize);
    fn map_buffer_range(buffer: GLuint, offset: usize, length: usize, access: GLbitfield) -> *mut u8;
    fn flush_mapped_buffer_range(buffer: GLuint, offset: usize, length: usize);
    fn unmap_buffer(buffer: GLuint) -> bool;
    fn memory_barrier(barriers: GLbitfield);
    fn create_texture(target: GLenum) -> GLuint;
    fn tex_image_2d(texture: GLuint, target: GLenum, level: GLint, internal_format: GLint,
                    width: GLsizei, height: GLsizei, format: GLenum, ty: GLenum, data: Option<&[u8]>);
    fn tex_sub_image_2d(texture: GLuint, target: GLenum, level: GLint, x: GLint, y: GLint,
                        width: GLsizei, height: GLsizei, format: GLenum, ty: GLenum, data: &[u8]);
    fn get_tex_image(texture: GLuint, target: GLenum, level: GLint, format: GLenum, ty: GLenum, out: &mut [u8]);
    fn tex_parameter_i(texture: GLuint, pname: GLenum, value: GLint);
    fn texture_view(texture: GLuint, target: GLenum, original: GLuint, internal_format: GLenum,
                    min_level: GLuint, num_levels: GLuint, min_layer: GLuint, num_layers: GLuint);
    fn bind_texture_unit(unit: GLuint, texture: GLuint);
    fn create_sampler() -> GLuint;
    fn sampler_parameter_i(sampler: GLuint, pname: GLenum, value: GLint);
    fn sampler_parameter_f(sampler: GLuint, pname: GLenum, value: GLfloat);
    fn get_sampler_parameter_i(sampler: GLuint, pname: GLenum) -> GLint;
    fn get_sampler_parameter_f(sampler: GLuint, pname: GLenum) -> GLfloat;
    fn bind_sampler(unit: GLuint, sampler: GLuint);
    fn create_framebuffer() -> GLuint;
    fn framebuffer_texture(framebuffer: GLuint, attachment: GLenum, texture: GLuint, level: GLint);
    fn framebuffer_renderbuffer(framebuffer: GLuint, attachment: GLenum, renderbuffer: GLuint);
    fn get_framebuffer_attachment(framebuffer: GLuint, attachment: GLenum) -> Attachment;
    fn bind_framebuffer(target: GLenum, framebuffer: GLuint);
    fn create_renderbuffer() -> GLuint;
    fn renderbuffer_storage(renderbuffer: GLuint, internal_format: GLenum, samples: GLsizei,
                            width: GLsizei, height: GLsizei);
    fn create_vertex_array() -> GLuint;
    fn vertex_attrib_pointer(vertex_array: GLuint, index: GLuint, buffer: GLuint, size: GLint,
                             ty: GLenum, normalized: bool, stride: GLsizei, offset: usize);
    fn enable_vertex_attrib(vertex_array: GLuint, index: GLuint, enabled: bool);
    fn vertex_array_element_buffer(vertex_array: GLuint, buffer: GLuint);
    fn get_vertex_attrib(vertex_array: GLuint, index: GLuint) -> VertexAttrib;
    fn get_vertex_array_element_buffer(vertex_array: GLuint) -> GLuint;
    fn max_vertex_attribs() -> GLuint;
    fn bind_vertex_array(vertex_array: GLuint);
    fn create_transform_feedback() -> GLuint;
    fn transform_feedback_buffer(transform_feedback: GLuint, index: GLuint, buffer: GLuint);
    fn get_transform_feedback_buffer(transform_feedback: GLuint, index: GLuint) -> GLuint;
    fn bind_transform_feedback(transform_feedback: GLuint);
    fn create_program_pipeline() -> GLuint;
    fn use_program_stages(pipeline: GLuint, stages: GLbitfield, program: GLuint);
    fn bind_program_pipeline(pipeline: GLuint);
    fn create_shader(kind: GLenum) -> GLuint;
    fn shader_source(shader: GLuint, source: &str);
    fn compile_shader(shader: GLuint);
    fn create_program() -> GLuint;
    fn attach_shader(program: GLuint, shader: GLuint);
    fn link_program(program: GLuint);
    fn use_program(program: GLuint);
    fn create_query() -> GLuint;
    fn begin_query(target: GLenum, query: GLuint);
    fn end_query(target: GLenum);
    fn fence_sync(condition: GLenum) -> GLuint;
    fn delete_object(kind: ResourceKind, name: GLuint);
    fn clear_color(red: GLfloat, green: GLfloat, blue: GLfloat, alpha: GLfloat);
    fn clear(mask: GLbitfield);
    fn viewport(x: GLint, y: GLint, width: GLsizei, height: GLsizei);
    fn draw_arrays(mode: GLenum, first: GLint, count: GLsizei);
    fn draw_elements(mode: GLenum, count: GLsizei, ty: GLenum, offset: usize);
    fn multi_draw_arrays(mode: GLenum, firsts: &[GLint], counts: &[GLsizei]);
    fn dispatch_compute(x: GLuint, y: GLuint, z: GLuint);
    fn read_pixels(x: GLint, y: GLint, width: GLsizei, height: GLsizei, format: GLenum, ty: GLenum,
                   out: &mut [u8]);
}

fn main() {
    env_logger::init();
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let recording = match Recording::load(&args.arg_file) {
        Ok(recording) => recording,
        Err(err) => {
            eprintln!("{}: {}", args.arg_file, err);
            process::exit(1);
        }
    };

    let driver = &recording.driver;
    println!("capture format {}, vendor {:?}, renderer {:?}",
             driver.version, driver.vendor, driver.renderer);
    for (index, frame) in recording.frames.iter().enumerate() {
        println!("frame {} (application frame {}), {} chunks",
                 index, frame.frame_number, frame.chunk_count());
        if args.flag_events {
            dump_events(&recording, index);
            continue;
        }
        dump_chunks("setup", &frame.setup);
        dump_chunks("initial state", &frame.initial);
        dump_chunks("frame", &frame.chunks);
    }
}
