//! The resource manager: every tracked object's record, and the bookkeeping
//! that decides what a frame capture must include.
//!
//! Outside a capture, each object's record accumulates the chunks that recreate
//! it. When a capture starts, the manager notes where the frame begins, both in
//! id order (objects with later ids were created inside the frame) and in chunk
//! serial order. As the frame references objects, the manager fetches a
//! snapshot of each pre-existing one the first time it's used. At the end of
//! the frame it assembles:
//!
//! - the setup chunks: the recorded history of every referenced pre-existing
//!   object and everything it depends on, in the order the calls were made;
//!
//! - the initial-state chunks, one per snapshot.
//!
//! A record whose history is not trusted to reproduce the object's contents is
//! "dirty"; its content updates are left out of the setup chunks, and the
//! snapshot supplies the contents instead. Objects mutated during a capture
//! become dirty only once the capture completes, so an aborted capture leaves
//! no trace.

use crate::chunk::{Chunk, ChunkOp};
use crate::error::{CaptureWarning, IdentityError, ReplayError, SerialError};
use crate::hooks::{GlHooks, DYNAMIC_STORAGE_BIT};
use crate::initstate::{self, InitialContents, InitialState};
use crate::params;
use crate::record::{next_serial, FrameRefType, RecordedChunk, ResourceRecord};
use crate::resource::{GlContext, GlResource, ResourceId, ResourceIdentity, ResourceKind, Role};

use std::collections::{BTreeMap, BTreeSet};

/// Bookkeeping for the frame being captured.
#[derive(Debug)]
struct FrameCapture {
    /// Objects with ids at or after this were created during the frame.
    first_local_id: ResourceId,

    /// Chunks with serials before this were recorded before the frame.
    start_serial: u64,

    referenced: BTreeMap<ResourceId, FrameRefType>,

    /// Snapshots taken so far. Objects that need none are present with `None`.
    initial: BTreeMap<ResourceId, Option<InitialContents>>,

    /// Objects whose snapshot must wait until their context is current.
    deferred: BTreeSet<ResourceId>,

    /// The dirty set as of the start of the frame.
    dirty_at_start: BTreeSet<ResourceId>,

    /// Objects mutated during the frame.
    pending_dirty: BTreeSet<ResourceId>,

    /// Objects deleted during the frame. Their records stay until the frame
    /// ends, since their history may still be needed.
    released: BTreeSet<ResourceId>,

    warnings: Vec<CaptureWarning>,
}

/// What the manager contributes to a completed frame capture.
#[derive(Debug, Default)]
pub struct CapturedResources {
    pub setup: Vec<Chunk>,
    pub initial: Vec<Chunk>,
    pub warnings: Vec<CaptureWarning>,
}

pub struct ResourceManager {
    identity: ResourceIdentity,
    records: BTreeMap<ResourceId, ResourceRecord>,
    dirty: BTreeSet<ResourceId>,
    high_traffic: BTreeSet<ResourceId>,
    frame: Option<FrameCapture>,

    /// Replay: initial contents decoded from the capture, by logged id.
    initial_contents: BTreeMap<ResourceId, InitialContents>,
}

impl ResourceManager {
    pub fn new(role: Role) -> ResourceManager {
        ResourceManager {
            identity: ResourceIdentity::new(role),
            records: BTreeMap::new(),
            dirty: BTreeSet::new(),
            high_traffic: BTreeSet::new(),
            frame: None,
            initial_contents: BTreeMap::new(),
        }
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    pub fn identity_mut(&mut self) -> &mut ResourceIdentity {
        &mut self.identity
    }

    /// Register the newly created object `handle`, and give it a record.
    pub fn register(&mut self, handle: GlResource) -> Result<ResourceId, IdentityError> {
        let id = self.identity.register(handle)?;
        self.add_resource_record(id, handle)?;
        Ok(id)
    }

    pub fn add_resource_record(&mut self, id: ResourceId, handle: GlResource)
                               -> Result<&mut ResourceRecord, IdentityError>
    {
        use std::collections::btree_map::Entry;
        match self.records.entry(id) {
            Entry::Occupied(_) => Err(IdentityError::DuplicateRecord(id)),
            Entry::Vacant(entry) => Ok(entry.insert(ResourceRecord::new(id, handle))),
        }
    }

    pub fn record(&self, id: ResourceId) -> Option<&ResourceRecord> {
        self.records.get(&id)
    }

    pub fn record_mut(&mut self, id: ResourceId) -> Option<&mut ResourceRecord> {
        self.records.get_mut(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.records.values()
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut ResourceRecord> {
        self.records.values_mut()
    }

    /// Return the id of the object `handle` names, if it's registered.
    pub fn id_for(&self, handle: &GlResource) -> Option<ResourceId> {
        self.identity.id_for(handle)
    }

    /// Forget the deleted object `id`. Its native name may be reused at once;
    /// the id never is.
    pub fn release(&mut self, id: ResourceId) -> Option<GlResource> {
        let handle = self.identity.release(id)?;
        match self.frame.as_mut() {
            Some(frame) => {
                frame.released.insert(id);
            }
            None => self.forget(id),
        }
        Some(handle)
    }

    fn forget(&mut self, id: ResourceId) {
        self.records.remove(&id);
        self.dirty.remove(&id);
        self.high_traffic.remove(&id);
    }

    /// Every texture sharing storage with `id`: the texture it views, and the
    /// views of it.
    fn storage_aliases(&self, id: ResourceId) -> Vec<ResourceId> {
        let viewed = self
            .record(id)
            .and_then(|record| record.texture())
            .and_then(|texture| texture.view_of);
        self.records
            .values()
            .filter(|record| {
                let view_of = record.texture().and_then(|texture| texture.view_of);
                view_of == Some(id) || (viewed.is_some() && Some(record.id) == viewed)
            })
            .map(|record| record.id)
            .collect()
    }

    /// Note that `id`'s recorded history no longer reproduces its contents.
    /// During a capture this takes effect when the capture completes.
    pub fn mark_dirty(&mut self, id: ResourceId) {
        if id.is_null() {
            return;
        }
        let mut ids = self.storage_aliases(id);
        ids.push(id);
        for id in ids {
            if let Some(record) = self.records.get_mut(&id) {
                if let Some(texture) = record.texture_mut() {
                    texture.payload_cache.clear();
                }
            }
            match self.frame.as_mut() {
                Some(frame) => {
                    frame.pending_dirty.insert(id);
                }
                None => {
                    if self.dirty.insert(id) {
                        log::trace!("{} is now dirty", id);
                    }
                }
            }
        }
    }

    /// Note that `id`'s record once again reproduces its contents.
    pub fn mark_clean(&mut self, id: ResourceId) {
        self.dirty.remove(&id);
        if let Some(frame) = self.frame.as_mut() {
            frame.pending_dirty.remove(&id);
        }
    }

    pub fn is_dirty(&self, id: ResourceId) -> bool {
        self.dirty.contains(&id)
    }

    /// Stop tracking `id`'s history: it is dirty for good, and re-fetched at
    /// every capture.
    pub fn mark_high_traffic(&mut self, id: ResourceId) {
        if self.high_traffic.insert(id) {
            log::debug!("{} is high-traffic", id);
        }
        self.mark_dirty(id);
    }

    pub fn is_high_traffic(&self, id: ResourceId) -> bool {
        self.high_traffic.contains(&id)
    }

    /// True if `id`'s history should be recorded on its own record: it's not
    /// being re-fetched at every capture anyway.
    pub fn tracks_history(&self, id: ResourceId) -> bool {
        !self.dirty.contains(&id) && !self.high_traffic.contains(&id)
    }

    pub fn is_capturing(&self) -> bool {
        self.frame.is_some()
    }

    /// True if `id` was created during the frame being captured.
    pub fn is_local(&self, id: ResourceId) -> bool {
        match &self.frame {
            Some(frame) => id >= frame.first_local_id,
            None => false,
        }
    }

    pub fn frame_ref(&self, id: ResourceId) -> Option<FrameRefType> {
        self.frame.as_ref()?.referenced.get(&id).copied()
    }

    /// Start bookkeeping for a frame capture.
    pub fn begin_frame(&mut self) {
        debug_assert!(self.frame.is_none(), "frame capture already in progress");
        log::debug!("resource manager: frame capture begins with {} records", self.records.len());
        self.frame = Some(FrameCapture {
            first_local_id: ResourceId::peek_next(),
            start_serial: next_serial(),
            referenced: BTreeMap::new(),
            initial: BTreeMap::new(),
            deferred: BTreeSet::new(),
            dirty_at_start: self.dirty.clone(),
            pending_dirty: BTreeSet::new(),
            released: BTreeSet::new(),
            warnings: vec![],
        });
    }

    /// Accumulate a reference to `id` by the frame being captured. The first
    /// reference to a pre-existing object takes its snapshot, and marks the
    /// objects it depends on as read.
    pub fn mark_frame_referenced<H: GlHooks>(
        &mut self,
        gl: &H,
        ctx: &GlContext,
        id: ResourceId,
        reference: FrameRefType,
    ) {
        if id.is_null() {
            return;
        }
        let mut work = vec![(id, reference)];
        while let Some((id, reference)) = work.pop() {
            if !self.records.contains_key(&id) {
                // A parent deleted before the frame began.
                log::trace!("{} has no record; not referencing it", id);
                continue;
            }
            let frame = match self.frame.as_mut() {
                Some(frame) => frame,
                None => return,
            };
            let first = !frame.referenced.contains_key(&id);
            let accumulated = frame.referenced.entry(id).or_insert(FrameRefType::Unknown);
            *accumulated = accumulated.combine(reference);
            if !first {
                continue;
            }
            if let Some(record) = self.records.get(&id) {
                work.extend(record.parents().map(|parent| (parent, FrameRefType::Read)));
            }
            if !self.is_local(id) {
                self.prepare_initial_state(gl, ctx, id);
            }
        }
    }

    /// Fetch `id`'s snapshot for the frame being captured, unless it has one
    /// already. If `ctx` can't reach the object, queue the fetch until a
    /// context that can is made current, and return false.
    pub fn prepare_initial_state<H: GlHooks>(&mut self, gl: &H, ctx: &GlContext, id: ResourceId)
                                             -> bool
    {
        let use_cache = !self.dirty.contains(&id);
        let high_traffic = self.high_traffic.contains(&id);
        let frame = match self.frame.as_mut() {
            Some(frame) => frame,
            None => return false,
        };
        if frame.initial.contains_key(&id) {
            return true;
        }
        let record = match self.records.get_mut(&id) {
            Some(record) => record,
            None => {
                log::error!("initial state requested for {}, which has no record", id);
                debug_assert!(false, "initial state requested for unrecorded {}", id);
                return false;
            }
        };
        if !ctx.can_access(&record.resource) {
            log::debug!("{} belongs to another context; deferring its initial state", id);
            frame.deferred.insert(id);
            return false;
        }
        frame.deferred.remove(&id);

        let contents = initstate::fetch(gl, ctx, &self.identity, record, use_cache);
        match &contents {
            Some(InitialContents::Undefined { reason }) => {
                log::warn!("{}: initial contents undefined: {}", id, reason);
                frame.warnings.push(CaptureWarning::InitialStateUnsupported {
                    id,
                    reason: reason.clone(),
                });
            }
            Some(other) => {
                log::debug!("{}: fetched {} bytes of initial contents", id, other.payload_len());
            }
            None => {}
        }

        // A fresh snapshot of a buffer can stand in for its whole content
        // history.
        if let (Some(InitialContents::Buffer { data }), false) = (&contents, high_traffic) {
            collapse_buffer_history(record, data);
            self.dirty.remove(&id);
        }

        frame.initial.insert(id, contents);
        true
    }

    /// Take the snapshots deferred until a context able to reach them became
    /// current.
    pub fn drain_deferred<H: GlHooks>(&mut self, gl: &H, ctx: &GlContext) {
        let deferred: Vec<ResourceId> = match &self.frame {
            Some(frame) => frame.deferred.iter().copied().collect(),
            None => return,
        };
        for id in deferred {
            let reachable = self
                .records
                .get(&id)
                .map_or(false, |record| ctx.can_access(&record.resource));
            if reachable {
                self.prepare_initial_state(gl, ctx, id);
            }
        }
    }

    /// Build the chunk carrying `id`'s snapshot for the frame being captured.
    pub fn serialise_initial_state(&self, id: ResourceId) -> Option<Chunk> {
        let contents = self.frame.as_ref()?.initial.get(&id)?.as_ref()?;
        Some(Chunk::new(
            ChunkOp::InitialContents,
            &mut InitialState {
                id,
                contents: contents.clone(),
            },
        ))
    }

    /// End the frame capture, returning its setup and initial-state chunks.
    /// Objects mutated during the frame become dirty.
    pub fn finish_frame(&mut self) -> CapturedResources {
        let mut frame = match self.frame.take() {
            Some(frame) => frame,
            None => return CapturedResources::default(),
        };

        for id in std::mem::take(&mut frame.deferred) {
            log::warn!("{}: context never made current; initial contents missed", id);
            frame.warnings.push(CaptureWarning::InitialStateMissed(id));
            frame.initial.insert(
                id,
                Some(InitialContents::Undefined {
                    reason: "owning context was not made current during the capture".to_string(),
                }),
            );
        }

        let mut setup: Vec<RecordedChunk> = vec![];
        for &id in frame.referenced.keys() {
            if id >= frame.first_local_id {
                continue;
            }
            if let Some(record) = self.records.get(&id) {
                let skip_contents = frame.dirty_at_start.contains(&id);
                setup.extend(record.chunks_before(frame.start_serial, skip_contents));
            }
        }
        setup.sort_by_key(|recorded| recorded.serial);
        setup.dedup_by_key(|recorded| recorded.serial);

        let initial = frame
            .initial
            .iter()
            .filter_map(|(&id, contents)| {
                let contents = contents.as_ref()?.clone();
                Some(Chunk::new(ChunkOp::InitialContents, &mut InitialState { id, contents }))
            })
            .collect();

        for id in frame.pending_dirty {
            self.dirty.insert(id);
        }
        for id in frame.released {
            self.forget(id);
        }
        log::debug!("resource manager: frame capture complete, {} setup chunks, {} objects referenced",
                    setup.len(), frame.referenced.len());

        CapturedResources {
            setup: setup.into_iter().map(|recorded| recorded.chunk).collect(),
            initial,
            warnings: frame.warnings,
        }
    }

    /// Abandon the frame capture, and with it the dirtiness the frame
    /// accumulated.
    pub fn abort_frame(&mut self) {
        let frame = match self.frame.take() {
            Some(frame) => frame,
            None => return,
        };
        log::debug!("resource manager: frame capture aborted");
        for id in frame.released {
            self.forget(id);
        }
    }

    /// Decode an initial-state chunk read from a capture, and hold its
    /// contents for `apply_initial_contents`.
    pub fn create_initial_state(&mut self, chunk: &Chunk) -> Result<ResourceId, SerialError> {
        let state: InitialState = chunk.read()?;
        self.initial_contents.insert(state.id, state.contents);
        Ok(state.id)
    }

    pub fn initial_contents(&self) -> impl Iterator<Item = (ResourceId, &InitialContents)> {
        self.initial_contents.iter().map(|(&id, contents)| (id, contents))
    }

    /// Push every decoded snapshot into its live object.
    pub fn apply_initial_contents<H: GlHooks>(&self, gl: &H) -> Result<(), ReplayError> {
        for (&id, contents) in &self.initial_contents {
            initstate::apply(gl, &self.identity, id, contents)?;
        }
        Ok(())
    }

    pub fn clear_initial_contents(&mut self) {
        self.initial_contents.clear();
    }

    /// The number of records per kind, for diagnostics.
    pub fn census(&self) -> BTreeMap<ResourceKind, usize> {
        let mut counts = BTreeMap::new();
        for record in self.records.values() {
            *counts.entry(record.kind()).or_insert(0) += 1;
        }
        counts
    }
}

/// Replace `record`'s content history with one upload of `data`.
///
/// Immutable storage without `DYNAMIC_STORAGE_BIT` refuses `BufferSubData`,
/// so its upload is recorded as an `Unmap`, which replays through a staging
/// copy.
fn collapse_buffer_history(record: &mut ResourceRecord, data: &[u8]) {
    let dropped = record.respecify(|chunk| chunk.op().writes_contents());
    let id = record.id;
    let sub_data_allowed = record
        .buffer()
        .map_or(true, |buffer| !buffer.immutable || buffer.storage_flags & DYNAMIC_STORAGE_BIT != 0);
    let chunk = if sub_data_allowed {
        Chunk::new(
            ChunkOp::BufferSubData,
            &mut params::BufferSubData {
                buffer: id,
                offset: 0,
                data: data.to_vec(),
            },
        )
    } else {
        Chunk::new(
            ChunkOp::Unmap,
            &mut params::Unmap {
                buffer: id,
                offset: 0,
                data: data.to_vec(),
            },
        )
    };
    record.add_chunk(chunk);
    if let Some(buffer) = record.buffer_mut() {
        if buffer.backing.len() == data.len() {
            buffer.backing.copy_from_slice(data);
            buffer.backing_valid = true;
        }
    }
    log::trace!("{}: history collapsed, {} content chunks dropped", id, dropped);
}
