//! Textures and texture views.

use super::GlCapture;
use crate::chunk::{Chunk, ChunkOp};
use crate::hooks::GlHooks;
use crate::params;
use crate::record::FrameRefType;
use crate::resource::{ResourceId, ResourceKind};

use gleam::gl::{GLenum, GLint, GLsizei, GLuint};

/// True if `chunk` specifies the contents of image (`face`, `level`).
fn specifies_image(chunk: &Chunk, face: GLenum, level: GLint) -> bool {
    match chunk.op() {
        ChunkOp::TexImage2D => chunk
            .read::<params::TexImage2D>()
            .map_or(false, |p| p.target == face && p.level == level),
        ChunkOp::TexSubImage2D => chunk
            .read::<params::TexSubImage2D>()
            .map_or(false, |p| p.target == face && p.level == level),
        _ => false,
    }
}

impl<H: GlHooks> GlCapture<H> {
    pub fn create_texture(&mut self, target: GLenum) -> GLuint {
        let name = self.gl.create_texture(target);
        let id = self.create(ResourceKind::Texture, name);
        if let Some(texture) = self.manager.record_mut(id).and_then(|record| record.texture_mut()) {
            texture.target = target;
        }
        self.use_resource(id, FrameRefType::Write);
        self.record_call(
            id,
            Chunk::new(ChunkOp::CreateTexture, &mut params::CreateTexture { texture: id, target }),
        );
        name
    }

    /// `glTextureImage2D`, or rather the DSA form it would have. `target` is
    /// the cube face for cube maps.
    pub fn tex_image_2d(&mut self, texture: GLuint, target: GLenum, level: GLint,
                        internal_format: GLint, width: GLsizei, height: GLsizei,
                        format: GLenum, ty: GLenum, data: Option<&[u8]>) {
        let id = self.id_of(ResourceKind::Texture, texture);
        self.sync_coherent_maps();
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.tex_image_2d(texture, target, level, internal_format, width, height, format, ty, data);

        if let Some(record) = self.manager.record_mut(id).and_then(|record| record.texture_mut()) {
            record.internal_format = internal_format;
            record.format = format;
            record.ty = ty;
            record.levels.insert((target, level), (width, height));
            record.payload_cache.remove(&(target, level));
        }
        self.respecify(id, |chunk| specifies_image(chunk, target, level));

        let chunk = Chunk::new(
            ChunkOp::TexImage2D,
            &mut params::TexImage2D {
                texture: id,
                target,
                level,
                internal_format,
                width,
                height,
                format,
                ty,
                has_data: data.is_some(),
                data: data.map(|data| data.to_vec()).unwrap_or_default(),
            },
        );
        self.record_call(id, chunk);
    }

    pub fn tex_sub_image_2d(&mut self, texture: GLuint, target: GLenum, level: GLint,
                            x: GLint, y: GLint, width: GLsizei, height: GLsizei,
                            format: GLenum, ty: GLenum, data: &[u8]) {
        let id = self.id_of(ResourceKind::Texture, texture);
        self.sync_coherent_maps();
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.tex_sub_image_2d(texture, target, level, x, y, width, height, format, ty, data);

        if let Some(record) = self.manager.record_mut(id).and_then(|record| record.texture_mut()) {
            record.payload_cache.remove(&(target, level));
        }

        let chunk = Chunk::new(
            ChunkOp::TexSubImage2D,
            &mut params::TexSubImage2D {
                texture: id,
                target,
                level,
                x,
                y,
                width,
                height,
                format,
                ty,
                data: data.to_vec(),
            },
        );
        self.record_call(id, chunk);
    }

    pub fn tex_parameter_i(&mut self, texture: GLuint, pname: GLenum, value: GLint) {
        let id = self.id_of(ResourceKind::Texture, texture);
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.tex_parameter_i(texture, pname, value);
        self.respecify(id, |chunk| {
            chunk.op() == ChunkOp::TexParameter
                && chunk.read::<params::TexParameter>().map_or(false, |p| p.pname == pname)
        });
        self.record_call(
            id,
            Chunk::new(ChunkOp::TexParameter, &mut params::TexParameter { texture: id, pname, value }),
        );
    }

    /// `glTextureView`, with the view's name allocated here. Return the view's
    /// name.
    ///
    /// A view shares its original's storage, so the view depends on the
    /// original, and writes through either make both dirty.
    pub fn texture_view(&mut self, target: GLenum, original: GLuint, internal_format: GLenum,
                        min_level: GLuint, num_levels: GLuint,
                        min_layer: GLuint, num_layers: GLuint) -> GLuint {
        let original_id = self.id_of(ResourceKind::Texture, original);
        self.use_resource(original_id, FrameRefType::Read);

        let name = self.gl.create_texture(target);
        self.gl.texture_view(name, target, original, internal_format,
                             min_level, num_levels, min_layer, num_layers);
        let id = self.create(ResourceKind::Texture, name);

        let storage = self.view_storage(original_id);
        let levels = self
            .manager
            .record(original_id)
            .and_then(|record| record.texture())
            .map(|texture| (texture.internal_format, texture.format, texture.ty, texture.levels.clone()));
        if let Some(record) = self.manager.record_mut(id) {
            record.add_parent(original_id);
            if let Some(texture) = record.texture_mut() {
                texture.target = target;
                texture.view_of = Some(storage);
                if let Some((internal_format, format, ty, levels)) = levels {
                    texture.internal_format = internal_format;
                    texture.format = format;
                    texture.ty = ty;
                    texture.levels = levels;
                }
            }
        }
        self.use_resource(id, FrameRefType::Write);

        let chunk = Chunk::new(
            ChunkOp::TextureView,
            &mut params::TextureView {
                texture: id,
                target,
                original: original_id,
                internal_format,
                min_level,
                num_levels,
                min_layer,
                num_layers,
            },
        );
        self.record_call(id, chunk);
        name
    }

    /// The texture whose storage `id` uses: a view of a view shares the first
    /// texture's storage.
    fn view_storage(&self, id: ResourceId) -> ResourceId {
        self.manager
            .record(id)
            .and_then(|record| record.texture())
            .and_then(|texture| texture.view_of)
            .unwrap_or(id)
    }

    pub fn bind_texture_unit(&mut self, unit: GLuint, texture: GLuint) {
        let id = self.id_of(ResourceKind::Texture, texture);
        self.use_resource(id, FrameRefType::Unknown);
        self.gl.bind_texture_unit(unit, texture);
        if id.is_null() {
            self.render.textures.remove(&unit);
        } else {
            self.render.textures.insert(unit, id);
        }
        self.record_call(
            ResourceId::NULL,
            Chunk::new(ChunkOp::BindTextureUnit, &mut params::BindTextureUnit { unit, texture: id }),
        );
    }
}
