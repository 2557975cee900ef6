//! Per-object capture records.
//!
//! Each tracked GL object has a `ResourceRecord` holding the chunks that
//! recreate it, the objects it depends on, and whatever kind-specific state the
//! capture layer keeps on the CPU side.

use crate::chunk::{Chunk, ChunkOp};
use crate::mapping::MappedRegion;
use crate::resource::{GlResource, ResourceId, ResourceKind};

use gleam::gl::{GLbitfield, GLenum, GLint, GLsizei, GLuint};
use serde::Serialize;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// How a frame uses an object, accumulated over every use in the frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum FrameRefType {
    /// Referenced in a way we can't classify, such as being bound.
    Unknown,
    Read,
    /// Completely overwritten before anything read it.
    Write,
    ReadBeforeWrite,
}

impl FrameRefType {
    /// Fold a new reference into the accumulated one, keeping the strongest
    /// claim on the object's contents at frame start.
    pub fn combine(self, new: FrameRefType) -> FrameRefType {
        use FrameRefType::*;
        match (self, new) {
            (old, Unknown) => old,
            (Unknown, new) => new,
            (ReadBeforeWrite, _) | (_, ReadBeforeWrite) => ReadBeforeWrite,
            (Write, _) => Write,
            (Read, Write) => ReadBeforeWrite,
            (Read, Read) => Read,
        }
    }
}

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Return a serial number greater than that of every chunk recorded so far.
pub fn next_serial() -> u64 {
    NEXT_SERIAL.load(Ordering::Relaxed)
}

/// A chunk held by a record, stamped with a process-wide serial number so
/// that chunks from different records can be merged back into call order.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedChunk {
    pub serial: u64,
    pub chunk: Chunk,
}

impl RecordedChunk {
    pub fn new(chunk: Chunk) -> RecordedChunk {
        RecordedChunk {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            chunk,
        }
    }
}

#[derive(Debug, Default)]
pub struct BufferData {
    pub size: usize,
    pub usage: GLenum,
    pub storage_flags: GLbitfield,
    pub immutable: bool,

    /// A CPU copy of the buffer's contents. Idle write maps hand out pointers
    /// into this.
    pub backing: Vec<u8>,

    /// False if GL may have changed the buffer behind `backing`'s back.
    pub backing_valid: bool,

    pub map: MappedRegion,
}

impl BufferData {
    pub fn is_persistent(&self) -> bool {
        self.storage_flags & crate::hooks::MAP_PERSISTENT_BIT != 0
    }
}

#[derive(Debug, Default)]
pub struct TextureData {
    pub target: GLenum,
    pub internal_format: GLint,
    pub format: GLenum,
    pub ty: GLenum,
    pub samples: GLsizei,

    /// The size of every specified (face, level) image.
    pub levels: BTreeMap<(GLenum, GLint), (GLsizei, GLsizei)>,

    /// For texture views, the texture whose storage this one shares.
    pub view_of: Option<ResourceId>,

    /// Compressed contents of each (face, level), as last fetched. Valid only
    /// while the texture is clean.
    pub payload_cache: BTreeMap<(GLenum, GLint), Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct FramebufferData {
    pub attachments: BTreeMap<GLenum, ResourceId>,
}

#[derive(Debug, Default)]
pub struct VertexArrayData {
    pub element_buffer: ResourceId,
    pub attrib_buffers: BTreeMap<GLuint, ResourceId>,
}

#[derive(Debug, Default)]
pub struct TransformFeedbackData {
    pub buffers: BTreeMap<GLuint, ResourceId>,
}

/// Kind-specific CPU-side state for a record.
#[derive(Debug)]
pub enum ResourceData {
    Buffer(BufferData),
    Texture(TextureData),
    Framebuffer(FramebufferData),
    VertexArray(VertexArrayData),
    TransformFeedback(TransformFeedbackData),
    Plain,
}

impl ResourceData {
    fn for_kind(kind: ResourceKind) -> ResourceData {
        match kind {
            ResourceKind::Buffer => ResourceData::Buffer(BufferData::default()),
            ResourceKind::Texture => ResourceData::Texture(TextureData::default()),
            ResourceKind::Framebuffer => ResourceData::Framebuffer(FramebufferData::default()),
            ResourceKind::VertexArray => ResourceData::VertexArray(VertexArrayData::default()),
            ResourceKind::TransformFeedback => {
                ResourceData::TransformFeedback(TransformFeedbackData::default())
            }
            _ => ResourceData::Plain,
        }
    }
}

macro_rules! data_accessors {
    ( $( $variant:ident : $type:ty => $get:ident, $get_mut:ident; )* ) => {
        impl ResourceRecord {
            $(
                pub fn $get(&self) -> Option<&$type> {
                    match &self.data {
                        ResourceData::$variant(data) => Some(data),
                        _ => None,
                    }
                }

                pub fn $get_mut(&mut self) -> Option<&mut $type> {
                    match &mut self.data {
                        ResourceData::$variant(data) => Some(data),
                        _ => None,
                    }
                }
            )*
        }
    }
}

/// Everything the capture layer knows about one GL object.
#[derive(Debug)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub resource: GlResource,

    /// The chunks that recreate this object, in call order.
    ///
    /// Only the capturing thread appends to or pops from this list, but
    /// re-specification inspects it while deciding what to discard, so each
    /// record guards its own list.
    chunks: Mutex<Vec<RecordedChunk>>,

    /// Objects this one's state depends on: a view's texture, a framebuffer's
    /// attachments, a vertex array's buffers.
    parents: BTreeSet<ResourceId>,

    update_count: u32,

    pub data: ResourceData,
}

data_accessors! {
    Buffer: BufferData => buffer, buffer_mut;
    Texture: TextureData => texture, texture_mut;
    Framebuffer: FramebufferData => framebuffer, framebuffer_mut;
    VertexArray: VertexArrayData => vertex_array, vertex_array_mut;
    TransformFeedback: TransformFeedbackData => transform_feedback, transform_feedback_mut;
}

impl ResourceRecord {
    pub fn new(id: ResourceId, resource: GlResource) -> ResourceRecord {
        ResourceRecord {
            id,
            resource,
            chunks: Mutex::new(Vec::new()),
            parents: BTreeSet::new(),
            update_count: 0,
            data: ResourceData::for_kind(resource.kind),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.resource.kind
    }

    fn lock_chunks(&self) -> MutexGuard<Vec<RecordedChunk>> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `chunk`, returning its serial number.
    pub fn add_chunk(&self, chunk: Chunk) -> u64 {
        let recorded = RecordedChunk::new(chunk);
        let serial = recorded.serial;
        log::trace!("{}: recorded {:?} as #{}", self.id, recorded.chunk.op(), serial);
        self.lock_chunks().push(recorded);
        serial
    }

    pub fn last_chunk_op(&self) -> Option<ChunkOp> {
        self.lock_chunks().last().map(|recorded| recorded.chunk.op())
    }

    pub fn pop_chunk(&self) -> Option<RecordedChunk> {
        self.lock_chunks().pop()
    }

    pub fn chunk_count(&self) -> usize {
        self.lock_chunks().len()
    }

    /// Discard every chunk that `superseded` returns true for, because a new
    /// call replaces the state they established. Return how many were
    /// dropped.
    pub fn respecify<F>(&self, mut superseded: F) -> usize
    where
        F: FnMut(&Chunk) -> bool,
    {
        let mut chunks = self.lock_chunks();
        let before = chunks.len();
        chunks.retain(|recorded| !superseded(&recorded.chunk));
        before - chunks.len()
    }

    /// Return copies of the chunks recorded before `serial`, leaving out
    /// content updates if `skip_contents` is set.
    pub fn chunks_before(&self, serial: u64, skip_contents: bool) -> Vec<RecordedChunk> {
        self.lock_chunks()
            .iter()
            .filter(|recorded| recorded.serial < serial)
            .filter(|recorded| !(skip_contents && recorded.chunk.op().writes_contents()))
            .cloned()
            .collect()
    }

    pub fn add_parent(&mut self, parent: ResourceId) {
        if !parent.is_null() && parent != self.id {
            self.parents.insert(parent);
        }
    }

    pub fn parents(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.parents.iter().copied()
    }

    /// Count an update made outside a captured frame, and return the new
    /// total.
    pub fn note_update(&mut self) -> u32 {
        self.update_count = self.update_count.saturating_add(1);
        self.update_count
    }

    pub fn update_count(&self) -> u32 {
        self.update_count
    }
}
