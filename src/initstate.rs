//! Initial contents: the state of an object at the moment a frame capture
//! begins.
//!
//! A captured frame may use objects created long before it. Replaying their
//! recorded history recreates them, but not everything the GPU did to them
//! since, so each one referenced by the frame also gets a snapshot of its
//! contents, fetched from the live driver. Replay applies the snapshots after
//! recreating the objects and before running the frame.
//!
//! Snapshots go into the capture as `InitialContents` chunks, whose body is an
//! `InitialState`. The same `Serialise` implementation writes and reads them.

use crate::error::ReplayError;
use crate::hooks::{GlHooks, TEXTURE_2D_MULTISAMPLE_ARRAY};
use crate::record::ResourceRecord;
use crate::resource::{GlContext, ResourceId, ResourceIdentity, ResourceKind};
use crate::rle;
use crate::serial::{serialise_list, Serialise, Serialiser};

use gleam::gl;
use gleam::gl::{GLenum, GLint, GLuint};

use std::convert::TryFrom;

serialised_struct! {
    /// One (face, level) image of a texture. `face` is the cube face target
    /// for cube maps and the texture's own target otherwise.
    pub struct TextureLevel {
        face: u32,
        level: i32,
        width: i32,
        height: i32,
        // Whether `rle` was compressed as 32-bit words rather than bytes.
        packed_words: bool,
        rle: Vec<u8>,
    }

    pub struct AttachmentState {
        attachment: u32,
        object: ResourceId,
        renderbuffer: bool,
        level: i32,
    }

    pub struct AttribState {
        index: u32,
        enabled: bool,
        buffer: ResourceId,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: u64,
    }

    /// Sampler parameters, in the order of `SAMPLER_INT_PARAMS` and
    /// `SAMPLER_FLOAT_PARAMS`.
    pub struct SamplerContents {
        ints: Vec<i32>,
        floats: Vec<f32>,
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextureContents {
    pub target: u32,
    pub internal_format: i32,
    pub format: u32,
    pub ty: u32,
    pub levels: Vec<TextureLevel>,
}

impl Serialise for TextureContents {
    fn serialise<S: Serialiser>(&mut self, ser: &mut S) -> Result<(), S::Error> {
        let mut target = u64::from(self.target);
        ser.uint("target", &mut target, u64::from(u32::MAX))?;
        self.target = target as u32;
        let mut internal_format = i64::from(self.internal_format);
        ser.sint("internal_format", &mut internal_format, i64::from(i32::MIN), i64::from(i32::MAX))?;
        self.internal_format = internal_format as i32;
        let mut format = u64::from(self.format);
        ser.uint("format", &mut format, u64::from(u32::MAX))?;
        self.format = format as u32;
        let mut ty = u64::from(self.ty);
        ser.uint("ty", &mut ty, u64::from(u32::MAX))?;
        self.ty = ty as u32;
        serialise_list(ser, "levels", &mut self.levels)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FramebufferContents {
    pub attachments: Vec<AttachmentState>,
}

impl Serialise for FramebufferContents {
    fn serialise<S: Serialiser>(&mut self, ser: &mut S) -> Result<(), S::Error> {
        serialise_list(ser, "attachments", &mut self.attachments)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexArrayContents {
    pub element_buffer: ResourceId,
    pub attribs: Vec<AttribState>,
}

impl Serialise for VertexArrayContents {
    fn serialise<S: Serialiser>(&mut self, ser: &mut S) -> Result<(), S::Error> {
        ser.id("element_buffer", &mut self.element_buffer)?;
        serialise_list(ser, "attribs", &mut self.attribs)
    }
}

/// A snapshot of one object's contents.
#[derive(Clone, Debug, PartialEq)]
pub enum InitialContents {
    Buffer { data: Vec<u8> },
    Texture(TextureContents),
    Sampler(SamplerContents),
    Framebuffer(FramebufferContents),
    VertexArray(VertexArrayContents),
    /// The contents couldn't be captured. Replay leaves them unspecified.
    Undefined { reason: String },
}

impl Default for InitialContents {
    fn default() -> InitialContents {
        InitialContents::Undefined {
            reason: String::new(),
        }
    }
}

impl InitialContents {
    const MAX_CODE: u64 = 5;

    fn code(&self) -> u64 {
        match self {
            InitialContents::Buffer { .. } => 0,
            InitialContents::Texture(_) => 1,
            InitialContents::Sampler(_) => 2,
            InitialContents::Framebuffer(_) => 3,
            InitialContents::VertexArray(_) => 4,
            InitialContents::Undefined { .. } => 5,
        }
    }

    fn empty(code: u64) -> InitialContents {
        match code {
            0 => InitialContents::Buffer { data: vec![] },
            1 => InitialContents::Texture(TextureContents::default()),
            2 => InitialContents::Sampler(SamplerContents::default()),
            3 => InitialContents::Framebuffer(FramebufferContents::default()),
            4 => InitialContents::VertexArray(VertexArrayContents::default()),
            _ => InitialContents::default(),
        }
    }

    /// The number of payload bytes this snapshot carries.
    pub fn payload_len(&self) -> usize {
        match self {
            InitialContents::Buffer { data } => data.len(),
            InitialContents::Texture(texture) => texture.levels.iter().map(|l| l.rle.len()).sum(),
            _ => 0,
        }
    }
}

/// The body of an `InitialContents` chunk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InitialState {
    pub id: ResourceId,
    pub contents: InitialContents,
}

impl Serialise for InitialState {
    fn serialise<S: Serialiser>(&mut self, ser: &mut S) -> Result<(), S::Error> {
        ser.id("id", &mut self.id)?;
        let mut code = self.contents.code();
        ser.uint("kind", &mut code, InitialContents::MAX_CODE)?;
        if ser.is_reading() {
            self.contents = InitialContents::empty(code);
        }
        match &mut self.contents {
            InitialContents::Buffer { data } => ser.bytes("data", data),
            InitialContents::Texture(texture) => texture.serialise(ser),
            InitialContents::Sampler(sampler) => sampler.serialise(ser),
            InitialContents::Framebuffer(framebuffer) => framebuffer.serialise(ser),
            InitialContents::VertexArray(vertex_array) => vertex_array.serialise(ser),
            InitialContents::Undefined { reason } => ser.string("reason", reason),
        }
    }
}

pub const SAMPLER_INT_PARAMS: &[GLenum] = &[
    gl::TEXTURE_MIN_FILTER,
    gl::TEXTURE_MAG_FILTER,
    gl::TEXTURE_WRAP_S,
    gl::TEXTURE_WRAP_T,
    gl::TEXTURE_WRAP_R,
    gl::TEXTURE_COMPARE_MODE,
    gl::TEXTURE_COMPARE_FUNC,
];

pub const SAMPLER_FLOAT_PARAMS: &[GLenum] = &[gl::TEXTURE_MIN_LOD, gl::TEXTURE_MAX_LOD];

pub const ATTACHMENT_POINTS: &[GLenum] = &[
    gl::COLOR_ATTACHMENT0,
    gl::COLOR_ATTACHMENT1,
    gl::COLOR_ATTACHMENT2,
    gl::COLOR_ATTACHMENT3,
    gl::DEPTH_ATTACHMENT,
    gl::STENCIL_ATTACHMENT,
];

/// Vertex arrays beyond this many attributes aren't snapshotted.
const MAX_SNAPSHOT_ATTRIBS: GLuint = 16;

/// Return the size of one pixel of `format` and `ty`, or `None` for
/// combinations we don't snapshot.
pub fn bytes_per_pixel(format: GLenum, ty: GLenum) -> Option<usize> {
    let components = match format {
        gl::RED | gl::ALPHA | gl::LUMINANCE | gl::DEPTH_COMPONENT => 1,
        gl::RG => 2,
        gl::RGB | gl::BGR => 3,
        gl::RGBA | gl::BGRA => 4,
        _ => return None,
    };
    let component_size = match ty {
        gl::UNSIGNED_BYTE => 1,
        gl::UNSIGNED_SHORT | gl::SHORT | gl::HALF_FLOAT => 2,
        gl::FLOAT | gl::UNSIGNED_INT => 4,
        _ => return None,
    };
    Some(components * component_size)
}

fn level_size(format: GLenum, ty: GLenum, width: GLint, height: GLint) -> Option<usize> {
    let width = usize::try_from(width).ok()?;
    let height = usize::try_from(height).ok()?;
    bytes_per_pixel(format, ty)?.checked_mul(width)?.checked_mul(height)
}

fn undefined(reason: &str) -> Option<InitialContents> {
    Some(InitialContents::Undefined {
        reason: reason.to_string(),
    })
}

/// Fetch `record`'s current contents from the driver. `ctx` must be able to
/// access the object. Return `None` for kinds whose recorded history fully
/// determines their state.
///
/// If `use_cache` is set, texture levels already in the record's payload cache
/// are reused rather than read back.
pub fn fetch<H: GlHooks>(
    gl: &H,
    ctx: &GlContext,
    identity: &ResourceIdentity,
    record: &mut ResourceRecord,
    use_cache: bool,
) -> Option<InitialContents> {
    let name = record.resource.name;
    match record.kind() {
        ResourceKind::Buffer => {
            let buffer = record.buffer()?;
            let mut data = vec![0; buffer.size];
            gl.get_buffer_sub_data(name, 0, &mut data);
            Some(InitialContents::Buffer { data })
        }
        ResourceKind::Texture => fetch_texture(gl, record, use_cache),
        ResourceKind::Renderbuffer => undefined("renderbuffer contents are not captured"),
        ResourceKind::Sampler => {
            let ints = SAMPLER_INT_PARAMS
                .iter()
                .map(|&pname| gl.get_sampler_parameter_i(name, pname))
                .collect();
            let floats = SAMPLER_FLOAT_PARAMS
                .iter()
                .map(|&pname| gl.get_sampler_parameter_f(name, pname))
                .collect();
            Some(InitialContents::Sampler(SamplerContents { ints, floats }))
        }
        ResourceKind::Framebuffer => {
            let mut attachments = vec![];
            for &point in ATTACHMENT_POINTS {
                let found = gl.get_framebuffer_attachment(name, point);
                let kind = match found.object_type {
                    gl::TEXTURE => ResourceKind::Texture,
                    gl::RENDERBUFFER => ResourceKind::Renderbuffer,
                    _ => continue,
                };
                let object = lookup(identity, ctx, kind, found.name);
                attachments.push(AttachmentState {
                    attachment: point,
                    object,
                    renderbuffer: kind == ResourceKind::Renderbuffer,
                    level: found.level,
                });
            }
            Some(InitialContents::Framebuffer(FramebufferContents { attachments }))
        }
        ResourceKind::VertexArray => {
            let element_buffer = gl.get_vertex_array_element_buffer(name);
            let element_buffer = lookup(identity, ctx, ResourceKind::Buffer, element_buffer);
            let count = gl.max_vertex_attribs().min(MAX_SNAPSHOT_ATTRIBS);
            let attribs = (0..count)
                .map(|index| {
                    let attrib = gl.get_vertex_attrib(name, index);
                    AttribState {
                        index,
                        enabled: attrib.enabled,
                        buffer: lookup(identity, ctx, ResourceKind::Buffer, attrib.buffer),
                        size: attrib.size,
                        ty: attrib.ty,
                        normalized: attrib.normalized,
                        stride: attrib.stride,
                        offset: attrib.offset as u64,
                    }
                })
                .collect();
            Some(InitialContents::VertexArray(VertexArrayContents {
                element_buffer,
                attribs,
            }))
        }
        ResourceKind::TransformFeedback
        | ResourceKind::Program
        | ResourceKind::ProgramPipeline
        | ResourceKind::Shader
        | ResourceKind::Query
        | ResourceKind::Sync => None,
    }
}

fn lookup(identity: &ResourceIdentity, ctx: &GlContext, kind: ResourceKind, name: GLuint) -> ResourceId {
    if name == 0 {
        return ResourceId::NULL;
    }
    match identity.id_for(&ctx.resource(kind, name)) {
        Some(id) => id,
        None => {
            log::warn!("{:?} {} is bound but was never registered", kind, name);
            ResourceId::NULL
        }
    }
}

fn fetch_texture<H: GlHooks>(gl: &H, record: &mut ResourceRecord, use_cache: bool)
                             -> Option<InitialContents>
{
    let name = record.resource.name;
    let texture = record.texture_mut()?;
    if texture.view_of.is_some() {
        // The viewed texture's own snapshot covers the shared storage.
        return None;
    }
    if texture.target == gl::TEXTURE_2D_MULTISAMPLE || texture.target == TEXTURE_2D_MULTISAMPLE_ARRAY
        || texture.samples > 1
    {
        return undefined("multisample texture contents are not captured");
    }
    let (format, ty) = (texture.format, texture.ty);
    let pixel_size = match bytes_per_pixel(format, ty) {
        Some(size) => size,
        None => return undefined("unsupported texture format"),
    };
    if !use_cache {
        texture.payload_cache.clear();
    }

    let mut levels = vec![];
    for (&(face, level), &(width, height)) in texture.levels.iter() {
        let size = match level_size(format, ty, width, height) {
            Some(size) => size,
            None => {
                log::warn!("texture {} level {} of face {:#x} has bad size {}x{}",
                           name, level, face, width, height);
                return undefined("texture level size out of range");
            }
        };
        let packed_words = pixel_size % 4 == 0;
        let rle = match texture.payload_cache.get(&(face, level)) {
            Some(cached) => cached.clone(),
            None => {
                let mut pixels = vec![0; size];
                gl.get_tex_image(name, face, level, format, ty, &mut pixels);
                let encoded = if packed_words {
                    rle::encode_u32(&pixels)
                } else {
                    rle::encode_u8(&pixels)
                };
                texture.payload_cache.insert((face, level), encoded.clone());
                encoded
            }
        };
        levels.push(TextureLevel {
            face,
            level,
            width,
            height,
            packed_words,
            rle,
        });
    }

    Some(InitialContents::Texture(TextureContents {
        target: texture.target,
        internal_format: texture.internal_format,
        format,
        ty,
        levels,
    }))
}

/// Decompress one texture level's pixels.
pub fn decode_level(contents: &TextureContents, level: &TextureLevel) -> Result<Vec<u8>, ReplayError> {
    let size = level_size(contents.format, contents.ty, level.width, level.height)
        .ok_or(crate::error::SerialError::OutOfRange("texture level size"))?;
    let pixels = if level.packed_words {
        rle::decode_u32(&level.rle, size)?
    } else {
        rle::decode_u8(&level.rle, size)?
    };
    Ok(pixels)
}

/// Push `contents` into the live object replay created for `id`.
pub fn apply<H: GlHooks>(
    gl: &H,
    identity: &ResourceIdentity,
    id: ResourceId,
    contents: &InitialContents,
) -> Result<(), ReplayError> {
    let name = identity.resolve_name(id)?;
    match contents {
        InitialContents::Buffer { data } => {
            if data.is_empty() {
                return Ok(());
            }
            // The buffer may have immutable storage, so copy from a staging
            // buffer rather than uploading directly.
            let staging = gl.gen_buffer();
            gl.buffer_data(staging, data.len(), Some(data), gl::STATIC_DRAW);
            gl.copy_buffer_sub_data(staging, name, 0, 0, data.len());
            gl.delete_object(ResourceKind::Buffer, staging);
        }
        InitialContents::Texture(texture) => {
            for level in &texture.levels {
                let pixels = decode_level(texture, level)?;
                gl.tex_sub_image_2d(name, level.face, level.level, 0, 0, level.width, level.height,
                                    texture.format, texture.ty, &pixels);
            }
        }
        InitialContents::Sampler(sampler) => {
            for (&pname, &value) in SAMPLER_INT_PARAMS.iter().zip(&sampler.ints) {
                gl.sampler_parameter_i(name, pname, value);
            }
            for (&pname, &value) in SAMPLER_FLOAT_PARAMS.iter().zip(&sampler.floats) {
                gl.sampler_parameter_f(name, pname, value);
            }
        }
        InitialContents::Framebuffer(framebuffer) => {
            for &point in ATTACHMENT_POINTS {
                gl.framebuffer_texture(name, point, 0, 0);
            }
            for attachment in &framebuffer.attachments {
                let object = identity.resolve_name(attachment.object)?;
                if attachment.renderbuffer {
                    gl.framebuffer_renderbuffer(name, attachment.attachment, object);
                } else {
                    gl.framebuffer_texture(name, attachment.attachment, object, attachment.level);
                }
            }
        }
        InitialContents::VertexArray(vertex_array) => {
            let element_buffer = identity.resolve_name(vertex_array.element_buffer)?;
            gl.vertex_array_element_buffer(name, element_buffer);
            for attrib in &vertex_array.attribs {
                let buffer = identity.resolve_name(attrib.buffer)?;
                gl.vertex_attrib_pointer(name, attrib.index, buffer, attrib.size, attrib.ty,
                                         attrib.normalized, attrib.stride, attrib.offset as usize);
                gl.enable_vertex_attrib(name, attrib.index, attrib.enabled);
            }
        }
        InitialContents::Undefined { reason } => {
            log::warn!("{}: initial contents undefined ({}); leaving them unspecified", id, reason);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::{from_bytes, to_bytes};

    fn check(contents: InitialContents) {
        let mut state = InitialState {
            id: ResourceId::from_raw(9),
            contents,
        };
        let bytes = to_bytes(&mut state);
        let (read, trailing) = from_bytes::<InitialState>(&bytes).unwrap();
        assert_eq!(trailing, 0);
        assert_eq!(read, state);
    }

    #[test]
    fn every_kind_serialises() {
        check(InitialContents::Buffer { data: vec![1, 2, 3] });
        check(InitialContents::Texture(TextureContents {
            target: gl::TEXTURE_2D,
            internal_format: gl::RGBA8 as i32,
            format: gl::RGBA,
            ty: gl::UNSIGNED_BYTE,
            levels: vec![TextureLevel {
                face: gl::TEXTURE_2D,
                level: 0,
                width: 2,
                height: 2,
                packed_words: true,
                rle: rle::encode_u32(&[7; 16]),
            }],
        }));
        check(InitialContents::Sampler(SamplerContents {
            ints: vec![gl::NEAREST as i32, gl::LINEAR as i32],
            floats: vec![-1000.0, 1000.0],
        }));
        check(InitialContents::VertexArray(VertexArrayContents {
            element_buffer: ResourceId::from_raw(3),
            attribs: vec![AttribState {
                index: 1,
                enabled: true,
                buffer: ResourceId::from_raw(4),
                size: 3,
                ty: gl::FLOAT,
                normalized: false,
                stride: 12,
                offset: 24,
            }],
        }));
        check(InitialContents::Undefined {
            reason: "multisample".to_string(),
        });
    }

    #[test]
    fn bad_kind_code() {
        serialised_struct! {
            pub struct Bogus { id: ResourceId, kind: u64 }
        }
        let bytes = to_bytes(&mut Bogus {
            id: ResourceId::from_raw(1),
            kind: 17,
        });
        assert!(from_bytes::<InitialState>(&bytes).is_err());
    }

    #[test]
    fn pixel_sizes() {
        assert_eq!(bytes_per_pixel(gl::RGBA, gl::UNSIGNED_BYTE), Some(4));
        assert_eq!(bytes_per_pixel(gl::RED, gl::FLOAT), Some(4));
        assert_eq!(bytes_per_pixel(gl::RGB, gl::UNSIGNED_BYTE), Some(3));
        assert_eq!(bytes_per_pixel(gl::RGBA, gl::UNSIGNED_INT_8_8_8_8_REV), None);
        assert_eq!(level_size(gl::RGBA, gl::UNSIGNED_BYTE, 4, -1), None);
    }
}
