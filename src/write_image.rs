//! Writing texture contents out as PNG images.

use crate::error::ReplayError;
use crate::initstate::{self, TextureContents, TextureLevel};

use gleam::gl::{GLenum, RGBA, UNSIGNED_BYTE};
use image::png::PngEncoder;
use image::ColorType;

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("can't write pixels of format 0x{format:x}, type 0x{ty:x} as PNG")]
    UnsupportedFormat { format: GLenum, ty: GLenum },

    #[error("texture level has negative size {0}x{1}")]
    BadSize(i32, i32),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Decode(#[from] ReplayError),
}

/// Write `data`, which holds `width` by `height` pixels of `format` and `ty`,
/// to `out` as a PNG.
pub fn write_png<W: Write>(out: W, data: &[u8], width: u32, height: u32,
                           format: GLenum, ty: GLenum) -> Result<(), ExportError> {
    let color_type = match (format, ty) {
        (RGBA, UNSIGNED_BYTE) => ColorType::Rgba8,
        _ => return Err(ExportError::UnsupportedFormat { format, ty }),
    };
    PngEncoder::new(out).encode(data, width, height, color_type)?;
    Ok(())
}

pub fn write_image<P: AsRef<Path>>(path: P, data: &[u8], width: u32, height: u32,
                                   format: GLenum, ty: GLenum) -> Result<(), ExportError> {
    let file = io::BufWriter::new(File::create(path)?);
    write_png(file, data, width, height, format, ty)
}

/// Decode one level of a texture's initial contents and write it to `path`.
pub fn write_texture_level<P: AsRef<Path>>(path: P, texture: &TextureContents,
                                           level: &TextureLevel) -> Result<(), ExportError> {
    if level.width < 0 || level.height < 0 {
        return Err(ExportError::BadSize(level.width, level.height));
    }
    let pixels = initstate::decode_level(texture, level)?;
    write_image(path, &pixels, level.width as u32, level.height as u32, texture.format, texture.ty)
}
