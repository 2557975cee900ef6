//! The capture layer: a GL front end that records what it's asked to do.
//!
//! `GlCapture` has one method per supported GL entry point. Each method calls
//! through to the real driver, and decides what to record based on whether a
//! frame is being captured:
//!
//! - While idle, calls that define or update an object are appended to that
//!   object's own record, so that its history is on hand if a later frame
//!   uses it. Content updates to dirty objects are dropped, since those get
//!   snapshotted at capture time anyway.
//!
//! - While capturing, every call goes into the frame's chunk list, and every
//!   object it touches is marked as referenced by the frame. Calls that define
//!   objects are also copied to the object's record, so objects created during
//!   the frame can be recreated for later captures.
//!
//! The methods take GL names as the application sees them. Objects are tracked
//! by `ResourceId`, and chunks only ever mention ids.
//!
//! The per-entry-point methods are split across submodules by object kind.

mod buffer_funcs;
mod draw_funcs;
mod object_funcs;
mod state;
mod texture_funcs;

#[cfg(test)]
mod tests;

pub use state::RenderStateTracker;

use crate::capture_file::{CapturedFrame, Recording};
use crate::chunk::Chunk;
use crate::error::{CaptureFailure, CaptureWarning};
use crate::hooks::GlHooks;
use crate::manager::ResourceManager;
use crate::mapping::{BufferMapEmulator, MapEffects, DIFF_THRESHOLD};
use crate::params;
use crate::record::FrameRefType;
use crate::resource::{GlContext, ResourceId, ResourceKind, Role};

use gleam::gl::GLuint;

/// Tuning for the capture layer.
#[derive(Clone, Debug)]
pub struct CaptureOptions {
    /// How many later frames a failed triggered capture is retried on.
    pub capture_retries: u32,

    /// Write maps no longer than this are serialized whole at unmap, rather
    /// than diffed against their previous contents.
    pub diff_threshold: usize,
}

impl Default for CaptureOptions {
    fn default() -> CaptureOptions {
        CaptureOptions {
            capture_retries: 3,
            diff_threshold: DIFF_THRESHOLD,
        }
    }
}

/// What a capture or replay session is doing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    CapturingFrame,
    /// Decoding a capture without executing it.
    Reading,
    /// Executing a decoded capture.
    Executing,
}

/// The frame being captured.
struct FrameLog {
    frame_number: u64,
    render_state: params::RenderState,
    chunks: Vec<Chunk>,
    warnings: Vec<CaptureWarning>,
}

pub struct GlCapture<H: GlHooks> {
    gl: H,
    options: CaptureOptions,
    ctx: GlContext,
    manager: ResourceManager,
    maps: BufferMapEmulator,
    render: RenderStateTracker,
    frame: Option<FrameLog>,

    /// Why the frame being captured can't be used, if it can't.
    failure: Option<CaptureFailure>,

    frame_number: u64,
    trigger_armed: bool,
    retries_left: u32,
    driver: params::DriverInit,
    captures: Vec<CapturedFrame>,
}

impl<H: GlHooks> GlCapture<H> {
    pub fn new(gl: H, ctx: GlContext, options: CaptureOptions) -> GlCapture<H> {
        let maps = BufferMapEmulator::new(options.diff_threshold);
        GlCapture {
            gl,
            options,
            ctx,
            manager: ResourceManager::new(Role::Capture),
            maps,
            render: RenderStateTracker::default(),
            frame: None,
            failure: None,
            frame_number: 0,
            trigger_armed: false,
            retries_left: 0,
            driver: params::DriverInit {
                version: u32::from(crate::capture_file::VERSION),
                vendor: String::new(),
                renderer: String::new(),
            },
            captures: vec![],
        }
    }

    /// Describe the driver, for the capture file's `DriverInit` chunk.
    pub fn set_driver_info(&mut self, vendor: &str, renderer: &str) {
        self.driver.vendor = vendor.to_string();
        self.driver.renderer = renderer.to_string();
    }

    pub fn gl(&self) -> &H {
        &self.gl
    }

    pub fn state(&self) -> CaptureState {
        if self.frame.is_some() {
            CaptureState::CapturingFrame
        } else {
            CaptureState::Idle
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.frame.is_some()
    }

    pub fn context(&self) -> GlContext {
        self.ctx
    }

    pub fn manager(&self) -> &ResourceManager {
        &self.manager
    }

    pub fn map_emulator(&self) -> &BufferMapEmulator {
        &self.maps
    }

    pub fn render_state(&self) -> &RenderStateTracker {
        &self.render
    }

    /// The number of the frame the application is drawing.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Return the id of the object of type `kind` the current context calls
    /// `name`.
    pub fn resource_id(&self, kind: ResourceKind, name: GLuint) -> Option<ResourceId> {
        self.manager.id_for(&self.ctx.resource(kind, name))
    }

    /// Make `ctx` the current context. Snapshots that were waiting for it are
    /// taken now.
    pub fn make_current(&mut self, ctx: GlContext) {
        self.ctx = ctx;
        self.manager.drain_deferred(&self.gl, &ctx);
    }

    pub fn begin_frame_capture(&mut self) {
        if self.frame.is_some() {
            log::warn!("frame {} is already being captured", self.frame_number);
            return;
        }
        log::debug!("beginning capture of frame {}", self.frame_number);

        // Bring the driver's copy of coherent maps up to date first, so those
        // writes belong to the buffers' initial contents.
        self.sync_coherent_maps();

        self.manager.begin_frame();
        self.failure = None;
        self.frame = Some(FrameLog {
            frame_number: self.frame_number,
            render_state: self.render.to_params(),
            chunks: vec![],
            warnings: vec![],
        });
        for id in self.render.bound_objects() {
            self.use_resource(id, FrameRefType::Unknown);
        }
    }

    /// Finish the frame capture. If something made the frame unusable, discard
    /// it and return the reason.
    pub fn end_frame_capture(&mut self) -> Result<&CapturedFrame, CaptureFailure> {
        if self.frame.is_none() {
            return Err(CaptureFailure::NotCapturing);
        }
        self.sync_coherent_maps();
        let frame = match self.frame.take() {
            Some(frame) => frame,
            None => return Err(CaptureFailure::NotCapturing),
        };

        if let Some(failure) = self.failure.take() {
            log::error!("failed to capture frame {}: {}", frame.frame_number, failure);
            self.manager.abort_frame();
            self.maps.end_frame(&mut self.manager);
            return Err(failure);
        }

        let resources = self.manager.finish_frame();
        self.maps.end_frame(&mut self.manager);

        let mut warnings = frame.warnings;
        warnings.extend(resources.warnings);
        let captured = CapturedFrame {
            frame_number: frame.frame_number,
            render_state: frame.render_state,
            setup: resources.setup,
            initial: resources.initial,
            chunks: frame.chunks,
            warnings,
        };
        log::debug!(
            "captured frame {}: {} setup chunks, {} initial states, {} frame chunks, {} warnings",
            captured.frame_number,
            captured.setup.len(),
            captured.initial.len(),
            captured.chunks.len(),
            captured.warnings.len()
        );
        self.captures.push(captured);
        self.captures.last().ok_or(CaptureFailure::NotCapturing)
    }

    /// Discard the frame being captured.
    pub fn abort_frame_capture(&mut self) {
        if let Some(frame) = self.frame.take() {
            log::debug!("capture of frame {} aborted", frame.frame_number);
            self.failure = None;
            self.manager.abort_frame();
            self.maps.end_frame(&mut self.manager);
        }
    }

    /// Capture the next frame presented.
    pub fn trigger_capture(&mut self) {
        self.trigger_armed = true;
        self.retries_left = self.options.capture_retries;
    }

    /// Note that the application presented a frame. This ends any capture in
    /// progress, and starts a triggered one.
    pub fn swap_buffers(&mut self) {
        if self.frame.is_some() {
            if let Err(failure) = self.end_frame_capture() {
                if self.retries_left > 0 {
                    self.retries_left -= 1;
                    self.trigger_armed = true;
                    log::warn!("capture failed ({}); retrying on the next frame, {} retries left",
                               failure, self.retries_left);
                } else {
                    log::error!("capture failed ({}); giving up", failure);
                }
            }
        }
        self.frame_number += 1;
        if self.trigger_armed {
            self.trigger_armed = false;
            self.begin_frame_capture();
        }
    }

    /// The frames captured so far.
    pub fn captures(&self) -> &[CapturedFrame] {
        &self.captures
    }

    /// Package the frames captured so far as a capture file.
    pub fn recording(&self) -> Recording {
        Recording {
            driver: self.driver.clone(),
            frames: self.captures.clone(),
        }
    }

    /// Like `recording`, but hand over the captured frames rather than copy
    /// them.
    pub fn take_recording(&mut self) -> Recording {
        Recording {
            driver: self.driver.clone(),
            frames: std::mem::take(&mut self.captures),
        }
    }

    /// Look up the id for `name`. Zero is `ResourceId::NULL`.
    fn id_of(&self, kind: ResourceKind, name: GLuint) -> ResourceId {
        if name == 0 {
            return ResourceId::NULL;
        }
        match self.resource_id(kind, name) {
            Some(id) => id,
            None => {
                log::error!("{:?} {} was not created through the capture layer", kind, name);
                ResourceId::NULL
            }
        }
    }

    /// Register the object the driver just created.
    fn create(&mut self, kind: ResourceKind, name: GLuint) -> ResourceId {
        match self.manager.register(self.ctx.resource(kind, name)) {
            Ok(id) => {
                log::trace!("{:?} {} is {}", kind, name, id);
                id
            }
            Err(err) => {
                log::error!("registering {:?} {}: {}", kind, name, err);
                debug_assert!(false, "registering {:?} {}: {}", kind, name, err);
                ResourceId::NULL
            }
        }
    }

    /// Note that the call being made uses `id`.
    fn use_resource(&mut self, id: ResourceId, reference: FrameRefType) {
        if self.frame.is_some() && !id.is_null() {
            self.manager.mark_frame_referenced(&self.gl, &self.ctx, id, reference);
        }
    }

    /// Record `chunk`, which describes a call affecting `id`, or no particular
    /// object if `id` is null.
    fn record_call(&mut self, id: ResourceId, chunk: Chunk) {
        let op = chunk.op();

        if let Some(frame) = self.frame.as_mut() {
            log::trace!("frame {}: {}", frame.frame_number, op.name());
            if !id.is_null() {
                if op.writes_contents() {
                    self.manager.mark_dirty(id);
                } else if let Some(record) = self.manager.record(id) {
                    record.add_chunk(chunk.clone());
                }
            }
            frame.chunks.push(chunk);
            return;
        }

        if id.is_null() {
            return;
        }
        if op.writes_contents() {
            if !self.manager.tracks_history(id) {
                return;
            }
            let (updates, threshold) = match self.manager.record_mut(id) {
                Some(record) => (record.note_update(), record.kind().high_traffic_threshold()),
                None => return,
            };
            if updates > threshold {
                log::debug!("{} updated {} times; no longer tracking its history", id, updates);
                self.manager.mark_high_traffic(id);
                return;
            }
        }
        if let Some(record) = self.manager.record(id) {
            record.add_chunk(chunk);
        }
    }

    /// Drop chunks from `id`'s record that a new call supersedes. Only done
    /// while idle: during a capture, the frame's setup still needs them.
    fn respecify<F>(&self, id: ResourceId, superseded: F)
    where
        F: FnMut(&Chunk) -> bool,
    {
        if self.frame.is_some() {
            return;
        }
        if let Some(record) = self.manager.record(id) {
            let dropped = record.respecify(superseded);
            if dropped > 0 {
                log::trace!("{}: {} superseded chunks dropped", id, dropped);
            }
        }
    }

    fn fail(&mut self, failure: CaptureFailure) {
        if self.frame.is_some() && self.failure.is_none() {
            self.failure = Some(failure);
        }
    }

    fn warn(&mut self, warning: CaptureWarning) {
        if let Some(frame) = self.frame.as_mut() {
            frame.warnings.push(warning);
        }
    }

    fn apply_map_effects(&mut self, id: ResourceId, effects: MapEffects) {
        if let Some(failure) = effects.failure {
            self.fail(failure);
        }
        if let Some(warning) = effects.warning {
            self.warn(warning);
        }
        if effects.dirtied {
            self.manager.mark_dirty(id);
        }
        if let Some(chunk) = effects.chunk {
            self.record_call(id, chunk);
        }
    }

    /// Propagate application writes to coherent maps before a call that might
    /// observe them.
    fn sync_coherent_maps(&mut self) {
        if !self.maps.has_coherent_maps() {
            return;
        }
        // Snapshot first: the writes belong to the frame, not to the
        // buffers' initial contents.
        for id in self.maps.pending_coherent(&self.manager) {
            self.use_resource(id, FrameRefType::ReadBeforeWrite);
        }
        let flushed = self.maps.coherent_barrier(&self.gl, &mut self.manager);
        for (id, chunk) in flushed {
            self.record_call(id, chunk);
        }
    }
}
