//! Emulation of mapped buffers.
//!
//! An application that maps a buffer writes to memory directly, so no GL call
//! tells us what changed. To capture those writes, the pointer the application
//! gets back is usually not the driver's. Depending on the map and on what we're
//! doing, it points into one of three places:
//!
//! - the driver's own mapping ("passthrough"), when we don't need to see the
//!   writes: we're not capturing, and either we've given up tracking this
//!   buffer's history, or the map doesn't invalidate so we needn't know its
//!   contents;
//!
//! - the record's backing store, a CPU copy of the buffer, for read maps and
//!   for idle write maps that discard the old contents;
//!
//! - the record's shadow storage, for write maps during a frame capture and for
//!   every persistent map.
//!
//! Shadow storage is two buffer-sized copies: `current`, which the application
//! writes through, and `comparison`, holding what was last propagated to GL.
//! Diffing them finds what the application changed, so captured unmaps only
//! serialize that range.
//!
//! Persistent maps outlive any one GL call, so persistently-mappable buffers
//! get a real persistent mapping of their whole storage when it is allocated,
//! and we copy flushed ranges into it. Coherent maps promise the GPU sees
//! writes without an explicit flush. We fake that by diffing every coherent
//! map before each call that could observe the buffer, so a write becomes
//! visible at the next intercepted call rather than immediately.

use crate::chunk::{Chunk, ChunkOp};
use crate::error::{CaptureFailure, CaptureWarning};
use crate::hooks::{GlHooks, MAP_COHERENT_BIT, MAP_PERSISTENT_BIT};
use crate::manager::ResourceManager;
use crate::params;
use crate::record::BufferData;
use crate::resource::ResourceId;

use gleam::gl::{
    GLbitfield, GLuint, MAP_FLUSH_EXPLICIT_BIT, MAP_INVALIDATE_BUFFER_BIT,
    MAP_INVALIDATE_RANGE_BIT, MAP_READ_BIT, MAP_WRITE_BIT,
};

use std::collections::BTreeSet;
use std::ops::Range;
use std::ptr::{self, NonNull};

/// Invalidated ranges of shadow storage are filled with this, so that reads
/// of data the application never wrote stand out.
pub const UNINITIALISED_FILL: u8 = 0xcc;

/// Maps no longer than this are serialized whole rather than diffed.
pub const DIFF_THRESHOLD: usize = 512;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MapStatus {
    Unmapped,
    MappedRead,
    MappedWrite,
    /// The application has the driver's own pointer.
    MappedPassthrough,
}

impl Default for MapStatus {
    fn default() -> MapStatus {
        MapStatus::Unmapped
    }
}

/// Which memory the application's pointer refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MapTarget {
    Backing,
    Shadow,
    Driver,
}

#[derive(Debug, Default)]
pub struct ShadowStorage {
    pub current: Vec<u8>,
    pub comparison: Vec<u8>,
}

impl ShadowStorage {
    fn new(contents: Vec<u8>) -> ShadowStorage {
        ShadowStorage {
            comparison: contents.clone(),
            current: contents,
        }
    }

    /// Bring `comparison` up to date with `current` over `range`.
    fn settle(&mut self, range: Range<usize>) {
        let ShadowStorage {
            current,
            comparison,
        } = self;
        comparison[range.clone()].copy_from_slice(&current[range]);
    }
}

/// The mapping state of one buffer.
#[derive(Debug, Default)]
pub struct MappedRegion {
    pub status: MapStatus,
    pub offset: usize,
    pub length: usize,
    pub access: GLbitfield,
    pub invalidate: bool,

    /// How many persistent maps of this buffer are outstanding.
    pub persistent_maps: u32,

    pub shadow: Option<ShadowStorage>,

    target: Option<MapTarget>,

    /// The driver's pointer for a passthrough map.
    passthrough: Option<NonNull<u8>>,

    /// The driver's persistent mapping of the whole buffer, made when storage
    /// was allocated.
    persistent: Option<NonNull<u8>>,
}

impl MappedRegion {
    pub fn is_mapped(&self) -> bool {
        self.status != MapStatus::Unmapped
    }

    pub fn has_persistent_storage(&self) -> bool {
        self.persistent.is_some()
    }

    fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.length
    }

    fn reset(&mut self) {
        self.status = MapStatus::Unmapped;
        self.target = None;
        self.passthrough = None;
    }
}

/// Return the smallest range outside of which `a` and `b` are equal, or `None`
/// if they are equal everywhere.
pub fn find_diff_range(a: &[u8], b: &[u8]) -> Option<Range<usize>> {
    debug_assert_eq!(a.len(), b.len());
    let start = a.iter().zip(b).position(|(x, y)| x != y)?;
    let end = a.len() - a.iter().rev().zip(b.iter().rev()).position(|(x, y)| x != y)?;
    Some(start..end)
}

impl BufferData {
    /// The memory the application's pointer refers to, covering the mapped
    /// range.
    pub fn client_range(&mut self) -> Option<&mut [u8]> {
        let range = self.map.range();
        match self.map.target? {
            MapTarget::Backing => self.backing.get_mut(range),
            MapTarget::Shadow => self.map.shadow.as_mut()?.current.get_mut(range),
            MapTarget::Driver => {
                let ptr = self.map.passthrough?;
                // Safety: `GlHooks` implementations guarantee the mapped
                // pointer is valid for the mapped length until unmap, and we
                // clear `passthrough` when we unmap.
                Some(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.map.length) })
            }
        }
    }

    fn client_pointer(&mut self) -> Option<NonNull<u8>> {
        let slice = self.client_range()?;
        NonNull::new(slice.as_mut_ptr())
    }

    /// Copy `range` of the shadow's current contents into the driver's
    /// persistent mapping, and flush it.
    fn propagate_persistent<H: GlHooks>(&mut self, gl: &H, name: GLuint, range: Range<usize>) {
        let (shadow, real) = match (self.map.shadow.as_ref(), self.map.persistent) {
            (Some(shadow), Some(real)) => (shadow, real),
            _ => return,
        };
        let source = &shadow.current[range.clone()];
        // Safety: the persistent mapping covers the whole buffer, and `range`
        // lies within the shadow storage, which is the buffer's size.
        unsafe {
            ptr::copy_nonoverlapping(source.as_ptr(), real.as_ptr().add(range.start), source.len());
        }
        gl.flush_mapped_buffer_range(name, range.start, range.len());
    }
}

/// Write `data` into the buffer `name` at `offset` with a short-lived write
/// map, which works for immutable storage too.
fn write_through<H: GlHooks>(gl: &H, name: GLuint, offset: usize, data: &[u8]) {
    if data.is_empty() {
        return;
    }
    let ptr = gl.map_buffer_range(name, offset, data.len(), MAP_WRITE_BIT);
    if ptr.is_null() {
        log::error!("failed to map buffer {} to write back {} bytes", name, data.len());
        return;
    }
    // Safety: `GlHooks` guarantees the mapping covers `data.len()` bytes.
    unsafe {
        ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
    }
    gl.unmap_buffer(name);
}

/// What an unmap or flush needs the capture layer to do next.
#[derive(Debug, Default)]
pub struct MapEffects {
    /// A chunk for the frame being captured, or for the buffer's own record.
    pub chunk: Option<Chunk>,
    pub failure: Option<CaptureFailure>,
    pub warning: Option<CaptureWarning>,
    /// The buffer's contents changed in a way its record's history doesn't
    /// show.
    pub dirtied: bool,
}

/// Tracks every buffer with a live persistent or coherent map, and implements
/// the mapping policy.
#[derive(Debug)]
pub struct BufferMapEmulator {
    persistent: BTreeSet<ResourceId>,
    coherent: BTreeSet<ResourceId>,
    diff_threshold: usize,
    bytes_saved: usize,
}

impl Default for BufferMapEmulator {
    fn default() -> BufferMapEmulator {
        BufferMapEmulator::new(DIFF_THRESHOLD)
    }
}

impl BufferMapEmulator {
    pub fn new(diff_threshold: usize) -> BufferMapEmulator {
        BufferMapEmulator {
            persistent: BTreeSet::new(),
            coherent: BTreeSet::new(),
            diff_threshold,
            bytes_saved: 0,
        }
    }

    /// How many bytes unmap diffing has kept out of captures so far.
    pub fn bytes_saved(&self) -> usize {
        self.bytes_saved
    }

    pub fn has_coherent_maps(&self) -> bool {
        !self.coherent.is_empty()
    }

    pub fn is_persistently_mapped(&self, id: ResourceId) -> bool {
        self.persistent.contains(&id)
    }

    /// Set up a buffer whose storage was just allocated with `flags`. Buffers
    /// that can be mapped persistently get a driver mapping of their whole
    /// storage and shadow storage, both kept until the buffer is deleted.
    pub fn storage_allocated<H: GlHooks>(&mut self, gl: &H, name: GLuint, buffer: &mut BufferData) {
        if buffer.storage_flags & MAP_PERSISTENT_BIT == 0 {
            return;
        }
        let access = MAP_WRITE_BIT | MAP_FLUSH_EXPLICIT_BIT | MAP_PERSISTENT_BIT;
        buffer.map.persistent = NonNull::new(gl.map_buffer_range(name, 0, buffer.size, access));
        if buffer.map.persistent.is_none() {
            log::error!("failed to map persistent buffer {} for capture", name);
        }
        buffer.map.shadow = Some(ShadowStorage::new(buffer.backing.clone()));
    }

    /// Handle `glMapBufferRange`. Return the pointer to give the application,
    /// or `None` if the map is invalid.
    pub fn map<H: GlHooks>(
        &mut self,
        gl: &H,
        manager: &mut ResourceManager,
        id: ResourceId,
        offset: usize,
        length: usize,
        access: GLbitfield,
    ) -> Option<NonNull<u8>> {
        let capturing = manager.is_capturing();
        let high_traffic = manager.is_high_traffic(id);
        let dirty = manager.is_dirty(id);

        let record = manager.record_mut(id)?;
        let name = record.resource.name;
        let buffer = record.buffer_mut()?;

        if buffer.map.is_mapped() {
            log::error!("{} mapped while already mapped", id);
            return None;
        }
        match offset.checked_add(length) {
            Some(end) if end <= buffer.size && length > 0 => {}
            _ => {
                log::error!("map of {} at {}+{} exceeds its size {}", id, offset, length, buffer.size);
                return None;
            }
        }

        let write = access & MAP_WRITE_BIT != 0;
        let read_only = access & (MAP_READ_BIT | MAP_WRITE_BIT) == MAP_READ_BIT;
        let invalidate = access & (MAP_INVALIDATE_BUFFER_BIT | MAP_INVALIDATE_RANGE_BIT) != 0;
        let flush_explicit = access & MAP_FLUSH_EXPLICIT_BIT != 0;
        let persistent = access & MAP_PERSISTENT_BIT != 0;

        // Outside a capture, maps whose writes we don't need to see go
        // straight to the driver.
        let mut direct = !capturing && (high_traffic || dirty);
        if !capturing && write && (!invalidate || flush_explicit) {
            direct = true;
        }
        if persistent || buffer.map.has_persistent_storage() {
            direct = false;
        }

        buffer.map.offset = offset;
        buffer.map.length = length;
        buffer.map.access = access;
        buffer.map.invalidate = invalidate;

        if persistent {
            buffer.map.persistent_maps += 1;
            self.persistent.insert(id);
            if access & MAP_COHERENT_BIT != 0 {
                self.coherent.insert(id);
            }
        }

        let pointer = if direct {
            let ptr = gl.map_buffer_range(name, offset, length, access);
            buffer.map.passthrough = NonNull::new(ptr);
            buffer.map.status = MapStatus::MappedPassthrough;
            buffer.map.target = Some(MapTarget::Driver);
            buffer.map.passthrough
        } else if read_only {
            let range = buffer.map.range();
            let target = if buffer.map.has_persistent_storage() {
                MapTarget::Shadow
            } else {
                MapTarget::Backing
            };
            match target {
                MapTarget::Shadow => {
                    // What we read is what GL holds, so there is nothing to
                    // propagate back.
                    let shadow = buffer.map.shadow.as_mut()?;
                    gl.get_buffer_sub_data(name, offset, &mut shadow.current[range.clone()]);
                    shadow.settle(range);
                }
                _ => gl.get_buffer_sub_data(name, offset, &mut buffer.backing[range]),
            }
            buffer.map.status = MapStatus::MappedRead;
            buffer.map.target = Some(target);
            buffer.client_pointer()
        } else if buffer.map.has_persistent_storage() {
            let range = buffer.map.range();
            let shadow = buffer.map.shadow.as_mut()?;
            if invalidate {
                fill(&mut shadow.current[range.clone()]);
                fill(&mut shadow.comparison[range]);
            }
            buffer.map.status = MapStatus::MappedWrite;
            buffer.map.target = Some(MapTarget::Shadow);
            buffer.client_pointer()
        } else if capturing {
            if buffer.map.shadow.is_none() {
                let mut contents = vec![0; buffer.size];
                if !invalidate {
                    // Take the whole buffer, since the shadow outlives this
                    // map.
                    if dirty || !buffer.backing_valid {
                        gl.get_buffer_sub_data(name, 0, &mut contents);
                    } else {
                        contents.copy_from_slice(&buffer.backing);
                    }
                }
                buffer.map.shadow = Some(ShadowStorage::new(contents));
            }
            let range = buffer.map.range();
            let shadow = buffer.map.shadow.as_mut()?;
            if invalidate {
                fill(&mut shadow.current[range.clone()]);
                fill(&mut shadow.comparison[range]);
            }
            buffer.map.status = MapStatus::MappedWrite;
            buffer.map.target = Some(MapTarget::Shadow);
            buffer.client_pointer()
        } else {
            buffer.map.status = MapStatus::MappedWrite;
            buffer.map.target = Some(MapTarget::Backing);
            buffer.client_pointer()
        };

        if direct {
            manager.mark_high_traffic(id);
        }

        pointer
    }

    /// Handle `glUnmapBuffer`. Return the driver's result, and what the capture
    /// layer must do.
    pub fn unmap<H: GlHooks>(
        &mut self,
        gl: &H,
        manager: &mut ResourceManager,
        id: ResourceId,
    ) -> (bool, MapEffects) {
        let capturing = manager.is_capturing();
        let mut effects = MapEffects::default();
        let diff_threshold = self.diff_threshold;

        let record = match manager.record_mut(id) {
            Some(record) => record,
            None => return (false, effects),
        };
        let name = record.resource.name;
        let buffer = match record.buffer_mut() {
            Some(buffer) => buffer,
            None => return (false, effects),
        };

        let mut result = true;
        match buffer.map.status {
            MapStatus::Unmapped => {
                log::error!("unmap of {}, which is not mapped", id);
                return (false, effects);
            }
            MapStatus::MappedRead => {}
            MapStatus::MappedPassthrough => {
                if capturing {
                    log::error!("failed to capture frame: saw an unmap of {} whose map we did not capture", id);
                    effects.failure = Some(CaptureFailure::UncappedUnmap(id));
                }
                result = gl.unmap_buffer(name);
                effects.dirtied = true;
            }
            MapStatus::MappedWrite => {
                if buffer.map.access & MAP_FLUSH_EXPLICIT_BIT != 0 {
                    // Every flush was handled as it happened.
                } else if capturing {
                    let (offset, data) = diffed_unmap(buffer, diff_threshold, &mut self.bytes_saved);
                    let end = offset + data.len();
                    if end > offset {
                        buffer.backing[offset..end].copy_from_slice(&data);
                        if buffer.map.has_persistent_storage() {
                            buffer.propagate_persistent(gl, name, offset..end);
                        } else {
                            write_through(gl, name, offset, &data);
                        }
                    }
                    effects.chunk = Some(Chunk::new(
                        ChunkOp::Unmap,
                        &mut params::Unmap {
                            buffer: id,
                            offset: offset as u64,
                            data,
                        },
                    ));
                    effects.dirtied = true;
                } else if buffer.map.has_persistent_storage() {
                    let range = buffer.map.range();
                    buffer.propagate_persistent(gl, name, range.clone());
                    if let Some(shadow) = buffer.map.shadow.as_mut() {
                        shadow.settle(range);
                    }
                    effects.dirtied = true;
                } else {
                    // The application wrote into our memory; pass it on to GL
                    // whole, and keep the backing store in step.
                    let offset = buffer.map.offset;
                    let data = buffer.client_range().map(|slice| slice.to_vec()).unwrap_or_default();
                    write_through(gl, name, offset, &data);
                    if buffer.map.target == Some(MapTarget::Shadow) {
                        buffer.backing[offset..offset + data.len()].copy_from_slice(&data);
                    }
                    effects.chunk = Some(Chunk::new(
                        ChunkOp::Unmap,
                        &mut params::Unmap {
                            buffer: id,
                            offset: offset as u64,
                            data,
                        },
                    ));
                }
            }
        }

        if buffer.map.access & MAP_PERSISTENT_BIT != 0 {
            buffer.map.persistent_maps = buffer.map.persistent_maps.saturating_sub(1);
            if buffer.map.persistent_maps == 0 {
                self.persistent.remove(&id);
                self.coherent.remove(&id);
            }
        }
        buffer.map.reset();

        (result, effects)
    }

    /// Handle `glFlushMappedBufferRange`. `offset` is relative to the start of
    /// the mapped range.
    pub fn flush<H: GlHooks>(
        &mut self,
        gl: &H,
        manager: &mut ResourceManager,
        id: ResourceId,
        offset: usize,
        length: usize,
    ) -> MapEffects {
        let capturing = manager.is_capturing();
        let mut effects = MapEffects::default();

        let buffer = match manager.record_mut(id) {
            Some(record) => {
                let name = record.resource.name;
                match record.buffer_mut() {
                    Some(buffer) => (name, buffer),
                    None => return effects,
                }
            }
            None => return effects,
        };
        let (name, buffer) = buffer;

        match buffer.map.status {
            MapStatus::Unmapped => {
                log::warn!("flush of {}, which is not mapped; ignoring", id);
            }
            MapStatus::MappedRead => {}
            MapStatus::MappedPassthrough => {
                gl.flush_mapped_buffer_range(name, offset, length);
                if capturing {
                    log::error!("failed to capture frame: saw a flush of {} whose map we did not capture", id);
                    effects.failure = Some(CaptureFailure::UncappedUnmap(id));
                }
            }
            MapStatus::MappedWrite => {
                let mut start = offset;
                let mut end = offset.saturating_add(length);
                if end > buffer.map.length {
                    log::warn!("flushed range of {} is outside its mapped range; clamping", id);
                    effects.warning = Some(CaptureWarning::FlushClamped { id, offset, length });
                    end = buffer.map.length;
                    start = start.min(end);
                }
                let absolute = buffer.map.offset + start..buffer.map.offset + end;
                effects.chunk = self.flush_range(gl, buffer, id, name, absolute, capturing);
                effects.dirtied = true;
            }
        }

        effects
    }

    /// Propagate `range` (in buffer coordinates) of a write map to GL, and
    /// return the chunk recording it if we're capturing.
    fn flush_range<H: GlHooks>(
        &mut self,
        gl: &H,
        buffer: &mut BufferData,
        id: ResourceId,
        name: GLuint,
        range: Range<usize>,
        capturing: bool,
    ) -> Option<Chunk> {
        let data = match buffer.map.target {
            Some(MapTarget::Shadow) => buffer.map.shadow.as_ref()?.current[range.clone()].to_vec(),
            Some(MapTarget::Backing) => buffer.backing[range.clone()].to_vec(),
            _ => return None,
        };

        if capturing {
            if let Some(shadow) = buffer.map.shadow.as_mut() {
                shadow.settle(range.clone());
            }
            buffer.backing[range.clone()].copy_from_slice(&data);
        }

        if buffer.map.has_persistent_storage() {
            buffer.propagate_persistent(gl, name, range.clone());
        } else if capturing {
            write_through(gl, name, range.start, &data);
        }

        if !capturing {
            return None;
        }
        Some(Chunk::new(
            ChunkOp::FlushMap,
            &mut params::FlushMap {
                buffer: id,
                offset: range.start as u64,
                data,
            },
        ))
    }

    /// The coherently mapped buffers the application has written since they
    /// were last propagated.
    pub fn pending_coherent(&self, manager: &ResourceManager) -> Vec<ResourceId> {
        pending_writes(manager, &self.coherent)
    }

    /// Like `pending_coherent`, for every persistent map.
    pub fn pending_persistent(&self, manager: &ResourceManager) -> Vec<ResourceId> {
        pending_writes(manager, &self.persistent)
    }

    /// Propagate application writes to every coherent map. Call this before
    /// any GL call that could observe a mapped buffer's contents.
    pub fn coherent_barrier<H: GlHooks>(&mut self, gl: &H, manager: &mut ResourceManager)
                                        -> Vec<(ResourceId, Chunk)>
    {
        let ids: Vec<ResourceId> = self.coherent.iter().copied().collect();
        self.barrier(gl, manager, &ids)
    }

    /// Propagate application writes to every persistent map, for
    /// `glMemoryBarrier(GL_CLIENT_MAPPED_BUFFER_BARRIER_BIT)`.
    pub fn persistent_barrier<H: GlHooks>(&mut self, gl: &H, manager: &mut ResourceManager)
                                          -> Vec<(ResourceId, Chunk)>
    {
        let ids: Vec<ResourceId> = self.persistent.iter().copied().collect();
        self.barrier(gl, manager, &ids)
    }

    fn barrier<H: GlHooks>(&mut self, gl: &H, manager: &mut ResourceManager, ids: &[ResourceId])
                           -> Vec<(ResourceId, Chunk)>
    {
        let capturing = manager.is_capturing();
        let mut chunks = vec![];
        let mut dirtied = vec![];
        for &id in ids {
            let record = match manager.record_mut(id) {
                Some(record) => record,
                None => continue,
            };
            let name = record.resource.name;
            let buffer = match record.buffer_mut() {
                Some(buffer) => buffer,
                None => continue,
            };
            let changed = match buffer.map.shadow.as_ref() {
                Some(shadow) => find_diff_range(&shadow.current, &shadow.comparison),
                None => None,
            };
            let changed = match changed {
                Some(changed) => changed,
                None => continue,
            };
            if let Some(shadow) = buffer.map.shadow.as_mut() {
                shadow.settle(changed.clone());
            }
            if let Some(chunk) = self.flush_range(gl, buffer, id, name, changed, capturing) {
                chunks.push((id, chunk));
            }
            dirtied.push(id);
        }
        if !capturing {
            for id in dirtied {
                manager.mark_dirty(id);
            }
        }
        chunks
    }

    /// Tear down mapping state for a buffer that is being deleted.
    pub fn release<H: GlHooks>(&mut self, gl: &H, id: ResourceId, name: GLuint, buffer: &mut BufferData) {
        if buffer.map.status == MapStatus::MappedPassthrough || buffer.map.persistent.is_some() {
            gl.unmap_buffer(name);
        }
        buffer.map = MappedRegion::default();
        self.persistent.remove(&id);
        self.coherent.remove(&id);
    }

    /// Free shadow storage that only existed for the frame just captured, so
    /// a later capture doesn't diff against stale contents.
    pub fn end_frame(&mut self, manager: &mut ResourceManager) {
        for record in manager.records_mut() {
            if let Some(buffer) = record.buffer_mut() {
                if !buffer.map.has_persistent_storage() && !buffer.map.is_mapped() {
                    buffer.map.shadow = None;
                }
            }
        }
    }
}

fn pending_writes(manager: &ResourceManager, ids: &BTreeSet<ResourceId>) -> Vec<ResourceId> {
    ids.iter()
        .copied()
        .filter(|&id| {
            manager
                .record(id)
                .and_then(|record| record.buffer())
                .and_then(|buffer| buffer.map.shadow.as_ref())
                .map_or(false, |shadow| shadow.current != shadow.comparison)
        })
        .collect()
}

fn fill(slice: &mut [u8]) {
    for byte in slice {
        *byte = UNINITIALISED_FILL;
    }
}

/// Work out which part of a captured write map to serialize, and bring the
/// comparison shadow up to date. Return the offset in the buffer where the
/// data goes, and the data.
fn diffed_unmap(buffer: &mut BufferData, threshold: usize, bytes_saved: &mut usize)
                -> (usize, Vec<u8>)
{
    let map_range = buffer.map.range();
    let whole_buffer = map_range.start == 0 && map_range.len() == buffer.size;
    let mut changed = 0..map_range.len();

    let diffable = map_range.len() > threshold && whole_buffer && !buffer.map.invalidate;
    if let (true, Some(shadow)) = (diffable, buffer.map.shadow.as_ref()) {
        match find_diff_range(&shadow.current[map_range.clone()], &shadow.comparison[map_range.clone()]) {
            Some(diff) => changed = diff,
            None => changed = 0..0,
        }
        *bytes_saved += map_range.len() - changed.len();
        log::debug!("mapped buffer of {} bytes changed {}..{}; {} bytes saved so far",
                    map_range.len(), changed.start, changed.end, bytes_saved);
    }

    let absolute = map_range.start + changed.start..map_range.start + changed.end;
    if let Some(shadow) = buffer.map.shadow.as_mut() {
        shadow.settle(absolute.clone());
    }
    let data = buffer
        .client_range()
        .map(|slice| slice[changed].to_vec())
        .unwrap_or_default();
    (absolute.start, data)
}
