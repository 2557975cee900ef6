//! Buffer objects.

use super::GlCapture;
use crate::chunk::{Chunk, ChunkOp};
use crate::hooks::GlHooks;
use crate::params;
use crate::record::FrameRefType;
use crate::resource::ResourceKind;

use gleam::gl::{GLbitfield, GLenum, GLuint, MAP_INVALIDATE_BUFFER_BIT, MAP_READ_BIT, MAP_WRITE_BIT};

use std::ptr;

/// The first `size` bytes of `data`, zero-filled if it's shorter or absent.
fn initial_backing(size: usize, data: Option<&[u8]>) -> Vec<u8> {
    let mut backing = vec![0; size];
    if let Some(data) = data {
        let len = data.len().min(size);
        backing[..len].copy_from_slice(&data[..len]);
    }
    backing
}

fn redefines_storage(chunk: &Chunk) -> bool {
    match chunk.op() {
        ChunkOp::BufferData | ChunkOp::BufferStorage => true,
        op => op.writes_contents(),
    }
}

impl<H: GlHooks> GlCapture<H> {
    pub fn gen_buffer(&mut self) -> GLuint {
        let name = self.gl.gen_buffer();
        let id = self.create(ResourceKind::Buffer, name);
        self.use_resource(id, FrameRefType::Write);
        self.record_call(id, Chunk::new(ChunkOp::CreateBuffer, &mut params::CreateBuffer { buffer: id }));
        name
    }

    /// `glNamedBufferData`. Respecifying a buffer's storage makes its earlier
    /// history irrelevant.
    pub fn buffer_data(&mut self, buffer: GLuint, size: usize, data: Option<&[u8]>, usage: GLenum) {
        let id = self.id_of(ResourceKind::Buffer, buffer);
        self.sync_coherent_maps();
        self.use_resource(id, FrameRefType::Write);
        self.gl.buffer_data(buffer, size, data, usage);

        if let Some(record) = self.manager.record_mut(id).and_then(|record| record.buffer_mut()) {
            record.size = size;
            record.usage = usage;
            record.storage_flags = 0;
            record.immutable = false;
            record.backing = initial_backing(size, data);
            record.backing_valid = true;
        }
        self.respecify(id, redefines_storage);
        if !self.is_capturing() && !self.manager.is_high_traffic(id) {
            self.manager.mark_clean(id);
        }

        let data = data.map(|data| data[..data.len().min(size)].to_vec());
        let chunk = Chunk::new(
            ChunkOp::BufferData,
            &mut params::BufferData {
                buffer: id,
                size: size as u64,
                has_data: data.is_some(),
                data: data.unwrap_or_default(),
                usage,
            },
        );
        self.record_call(id, chunk);
    }

    /// `glNamedBufferStorage`. Storage that can be mapped persistently gets
    /// set up for map emulation here.
    pub fn buffer_storage(&mut self, buffer: GLuint, size: usize, data: Option<&[u8]>,
                          flags: GLbitfield) {
        let id = self.id_of(ResourceKind::Buffer, buffer);
        self.use_resource(id, FrameRefType::Write);
        self.gl.buffer_storage(buffer, size, data, flags);

        if let Some(record) = self.manager.record_mut(id).and_then(|record| record.buffer_mut()) {
            record.size = size;
            record.storage_flags = flags;
            record.immutable = true;
            record.backing = initial_backing(size, data);
            record.backing_valid = true;
            self.maps.storage_allocated(&self.gl, buffer, record);
        }
        self.respecify(id, redefines_storage);
        if !self.is_capturing() && !self.manager.is_high_traffic(id) {
            self.manager.mark_clean(id);
        }

        let data = data.map(|data| data[..data.len().min(size)].to_vec());
        let chunk = Chunk::new(
            ChunkOp::BufferStorage,
            &mut params::BufferStorage {
                buffer: id,
                size: size as u64,
                has_data: data.is_some(),
                data: data.unwrap_or_default(),
                flags,
            },
        );
        self.record_call(id, chunk);
    }

    pub fn buffer_sub_data(&mut self, buffer: GLuint, offset: usize, data: &[u8]) {
        let id = self.id_of(ResourceKind::Buffer, buffer);
        self.sync_coherent_maps();
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        self.gl.buffer_sub_data(buffer, offset, data);

        if let Some(record) = self.manager.record_mut(id).and_then(|record| record.buffer_mut()) {
            if let Some(range) = record.backing.get_mut(offset..offset + data.len()) {
                range.copy_from_slice(data);
            }
        }

        let chunk = Chunk::new(
            ChunkOp::BufferSubData,
            &mut params::BufferSubData {
                buffer: id,
                offset: offset as u64,
                data: data.to_vec(),
            },
        );
        self.record_call(id, chunk);
    }

    /// `glCopyNamedBufferSubData`. Outside a capture the copy can't be
    /// recorded in the destination's history, since it depends on the source's
    /// contents at the time, so the destination becomes dirty instead.
    pub fn copy_buffer_sub_data(&mut self, read: GLuint, write: GLuint,
                                read_offset: usize, write_offset: usize, size: usize) {
        let read_id = self.id_of(ResourceKind::Buffer, read);
        let write_id = self.id_of(ResourceKind::Buffer, write);
        self.sync_coherent_maps();
        self.use_resource(read_id, FrameRefType::Read);
        self.use_resource(write_id, FrameRefType::ReadBeforeWrite);
        self.gl.copy_buffer_sub_data(read, write, read_offset, write_offset, size);

        if let Some(record) = self.manager.record_mut(write_id).and_then(|record| record.buffer_mut()) {
            record.backing_valid = false;
        }

        if !self.is_capturing() {
            self.manager.mark_dirty(write_id);
            return;
        }
        let chunk = Chunk::new(
            ChunkOp::CopyBufferSubData,
            &mut params::CopyBufferSubData {
                read: read_id,
                write: write_id,
                read_offset: read_offset as u64,
                write_offset: write_offset as u64,
                size: size as u64,
            },
        );
        self.record_call(write_id, chunk);
    }

    /// `glMapNamedBufferRange`. Return the pointer the application should
    /// write through, or null if the map fails.
    pub fn map_buffer_range(&mut self, buffer: GLuint, offset: usize, length: usize,
                            access: GLbitfield) -> *mut u8 {
        let id = self.id_of(ResourceKind::Buffer, buffer);
        if id.is_null() {
            return self.gl.map_buffer_range(buffer, offset, length, access);
        }
        self.sync_coherent_maps();

        let reference = if access & (MAP_READ_BIT | MAP_WRITE_BIT) == MAP_READ_BIT {
            FrameRefType::Read
        } else if access & MAP_INVALIDATE_BUFFER_BIT != 0 {
            FrameRefType::Write
        } else {
            FrameRefType::ReadBeforeWrite
        };
        self.use_resource(id, reference);

        match self.maps.map(&self.gl, &mut self.manager, id, offset, length, access) {
            Some(pointer) => pointer.as_ptr(),
            None => ptr::null_mut(),
        }
    }

    /// `glUnmapNamedBuffer`.
    pub fn unmap_buffer(&mut self, buffer: GLuint) -> bool {
        let id = self.id_of(ResourceKind::Buffer, buffer);
        if id.is_null() {
            return self.gl.unmap_buffer(buffer);
        }
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        let (result, effects) = self.maps.unmap(&self.gl, &mut self.manager, id);
        self.apply_map_effects(id, effects);
        result
    }

    /// `glFlushMappedNamedBufferRange`. `offset` is relative to the start of
    /// the mapped range.
    pub fn flush_mapped_buffer_range(&mut self, buffer: GLuint, offset: usize, length: usize) {
        let id = self.id_of(ResourceKind::Buffer, buffer);
        if id.is_null() {
            self.gl.flush_mapped_buffer_range(buffer, offset, length);
            return;
        }
        self.use_resource(id, FrameRefType::ReadBeforeWrite);
        let effects = self.maps.flush(&self.gl, &mut self.manager, id, offset, length);
        self.apply_map_effects(id, effects);
    }

    /// The memory the pointer from the last `map_buffer_range` call on
    /// `buffer` refers to, covering the mapped range.
    pub fn mapped_range_mut(&mut self, buffer: GLuint) -> Option<&mut [u8]> {
        let id = self.resource_id(ResourceKind::Buffer, buffer)?;
        self.manager.record_mut(id)?.buffer_mut()?.client_range()
    }
}
