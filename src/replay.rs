//! Replaying a captured frame.
//!
//! Opening a frame for replay first decodes every chunk, which catches a
//! malformed capture before anything runs, and builds the list of events a
//! tool can step through: one per frame chunk, except that a
//! `MultiDrawArrays` chunk contributes one event per draw it makes. Event ids
//! count from 1.
//!
//! Replaying then recreates the frame's starting state (the setup chunks,
//! then the initial contents, then the bindings) and runs the frame's events
//! up to a chosen one. Object ids in the capture are resolved to the objects
//! this replay created for them.

use crate::capture_file::{CapturedFrame, Recording};
use crate::chunk::{Chunk, ChunkOp};
use crate::driver::{CaptureState, RenderStateTracker};
use crate::error::{ReplayError, SerialError};
use crate::hooks::GlHooks;
use crate::initstate::bytes_per_pixel;
use crate::manager::ResourceManager;
use crate::params;
use crate::resource::{GlContext, ResourceId, ResourceIdentity, ResourceKind, Role};

use gleam::gl::{self, GLuint};

use std::convert::TryFrom;
use std::ops::Range;

macro_rules! calls {
    ( $( $op:ident, )* ) => {
        /// A decoded frame chunk. Each variant carries the parameters of the
        /// chunk op of the same name.
        #[derive(Clone, Debug, PartialEq)]
        pub enum Call {
            $( $op(params::$op), )*
        }

        impl Call {
            pub fn decode(chunk: &Chunk) -> Result<Call, ReplayError> {
                Ok(match chunk.op() {
                    $( ChunkOp::$op => Call::$op(chunk.read()?), )*
                    op => return Err(ReplayError::UnexpectedChunk(op)),
                })
            }

            pub fn op(&self) -> ChunkOp {
                match self {
                    $( Call::$op(_) => ChunkOp::$op, )*
                }
            }
        }
    }
}

calls! {
    CreateBuffer,
    BufferData,
    BufferStorage,
    BufferSubData,
    CopyBufferSubData,
    Unmap,
    FlushMap,
    CreateTexture,
    TexImage2D,
    TexSubImage2D,
    TexParameter,
    TextureView,
    BindTextureUnit,
    CreateSampler,
    SamplerParameterI,
    SamplerParameterF,
    BindSampler,
    CreateFramebuffer,
    FramebufferTexture,
    FramebufferRenderbuffer,
    BindFramebuffer,
    CreateRenderbuffer,
    RenderbufferStorage,
    CreateVertexArray,
    VertexAttribPointer,
    EnableVertexAttrib,
    VertexArrayElementBuffer,
    BindVertexArray,
    CreateTransformFeedback,
    TransformFeedbackBuffer,
    BindTransformFeedback,
    CreateProgramPipeline,
    UseProgramStages,
    BindProgramPipeline,
    CreateShader,
    ShaderSource,
    CompileShader,
    CreateProgram,
    AttachShader,
    LinkProgram,
    UseProgram,
    CreateQuery,
    BeginQuery,
    EndQuery,
    FenceSync,
    DeleteResource,
    ClearColor,
    Clear,
    Viewport,
    MemoryBarrier,
    DrawArrays,
    DrawElements,
    MultiDrawArrays,
    DispatchCompute,
    ReadPixels,
}

impl Call {
    /// If this call creates an object, the object's id.
    pub fn created(&self) -> Option<ResourceId> {
        use Call::*;
        Some(match self {
            CreateBuffer(p) => p.buffer,
            CreateTexture(p) => p.texture,
            TextureView(p) => p.texture,
            CreateSampler(p) => p.sampler,
            CreateFramebuffer(p) => p.framebuffer,
            CreateRenderbuffer(p) => p.renderbuffer,
            CreateVertexArray(p) => p.vertex_array,
            CreateTransformFeedback(p) => p.transform_feedback,
            CreateProgramPipeline(p) => p.pipeline,
            CreateShader(p) => p.shader,
            CreateProgram(p) => p.program,
            CreateQuery(p) => p.query,
            FenceSync(p) => p.sync,
            _ => return None,
        })
    }

    /// A one-line description, for event lists.
    pub fn describe(&self) -> String {
        use Call::*;
        match self {
            Clear(p) => format!("Clear(0x{:x})", p.mask),
            DrawArrays(p) => format!("DrawArrays({} vertices from {})", p.count, p.first),
            DrawElements(p) => format!("DrawElements({} indices at offset {})", p.count, p.offset),
            MultiDrawArrays(p) => format!("MultiDrawArrays({} draws)", p.counts.len()),
            DispatchCompute(p) => format!("DispatchCompute({}, {}, {})", p.x, p.y, p.z),
            ReadPixels(p) => format!("ReadPixels({}x{} at {}, {})", p.width, p.height, p.x, p.y),
            other => other.op().name().to_string(),
        }
    }
}

/// How `GlReplay::replay_log` treats the events before `first`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReplayMode {
    /// Start from the frame's initial state and run every event up to `last`.
    Full,
    /// Start from the frame's initial state, but skip the drawcalls before
    /// `first`. Other events before `first` still run, since later events
    /// depend on the objects and bindings they set up.
    DiscardBeforeFirst,
    /// Carry on from wherever the last replay stopped, running `first` to
    /// `last`.
    StopAfterLast,
}

/// One step of a frame, as a tool lists it.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub event_id: u32,
    /// The index of the event's chunk in the frame's chunk list.
    pub chunk_index: usize,
    pub op: ChunkOp,
    /// For a `MultiDrawArrays` chunk, which of its draws this event is.
    pub sub_draw: Option<usize>,
}

/// An event that draws, dispatches, clears or reads back.
#[derive(Clone, Debug, PartialEq)]
pub struct Drawcall {
    pub event_id: u32,
    pub op: ChunkOp,
    pub name: String,
    /// Vertices or indices drawn; zero for anything else.
    pub count: i32,
}

pub struct GlReplay<H: GlHooks> {
    gl: H,
    ctx: GlContext,
    manager: ResourceManager,
    frame: CapturedFrame,
    state: CaptureState,
    setup: Vec<Call>,
    calls: Vec<Call>,
    events: Vec<Event>,
    drawcalls: Vec<Drawcall>,

    /// The last event executed, if the frame has been started.
    replayed_to: Option<u32>,
}

impl<H: GlHooks> GlReplay<H> {
    /// Decode frame `index` of `recording` for replay on `gl`.
    pub fn new(gl: H, ctx: GlContext, recording: &Recording, index: usize)
               -> Result<GlReplay<H>, ReplayError>
    {
        let frame = recording.frames.get(index).cloned().ok_or(ReplayError::NoFrame(index))?;
        let mut replay = GlReplay {
            gl,
            ctx,
            manager: ResourceManager::new(Role::Replay),
            frame,
            state: CaptureState::Reading,
            setup: vec![],
            calls: vec![],
            events: vec![],
            drawcalls: vec![],
            replayed_to: None,
        };
        replay.read()?;
        Ok(replay)
    }

    /// Decode every chunk of the frame, declare the ids it creates, and build
    /// the event and drawcall lists.
    fn read(&mut self) -> Result<(), ReplayError> {
        self.setup = self.frame.setup.iter().map(Call::decode).collect::<Result<_, _>>()?;
        self.calls = self.frame.chunks.iter().map(Call::decode).collect::<Result<_, _>>()?;
        for chunk in &self.frame.initial {
            if chunk.op() != ChunkOp::InitialContents {
                return Err(ReplayError::UnexpectedChunk(chunk.op()));
            }
            let id = self.manager.create_initial_state(chunk)?;
            log::trace!("initial contents for {}", id);
        }

        for call in self.setup.iter().chain(&self.calls) {
            if let Some(id) = call.created() {
                self.manager.identity_mut().declare(id);
            }
        }

        let mut events = vec![];
        let mut drawcalls = vec![];
        for (chunk_index, call) in self.calls.iter().enumerate() {
            let op = call.op();
            let mut add = |sub_draw: Option<usize>, count: i32, name: String| {
                let event_id = events.len() as u32 + 1;
                events.push(Event {
                    event_id,
                    chunk_index,
                    op,
                    sub_draw,
                });
                if op.is_drawcall() {
                    drawcalls.push(Drawcall {
                        event_id,
                        op,
                        name,
                        count,
                    });
                }
            };
            match call {
                Call::MultiDrawArrays(p) if !p.counts.is_empty() => {
                    for (sub_draw, (&first, &count)) in p.firsts.iter().zip(&p.counts).enumerate() {
                        add(Some(sub_draw), count,
                            format!("MultiDrawArrays[{}]({} vertices from {})", sub_draw, count, first));
                    }
                }
                Call::DrawArrays(p) => add(None, p.count, call.describe()),
                Call::DrawElements(p) => add(None, p.count, call.describe()),
                _ => add(None, 0, call.describe()),
            }
        }
        log::debug!("frame {}: {} setup calls, {} events, {} drawcalls",
                    self.frame.frame_number, self.setup.len(), events.len(), drawcalls.len());
        self.events = events;
        self.drawcalls = drawcalls;
        Ok(())
    }

    pub fn gl(&self) -> &H {
        &self.gl
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn frame(&self) -> &CapturedFrame {
        &self.frame
    }

    pub fn manager(&self) -> &ResourceManager {
        &self.manager
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn drawcalls(&self) -> &[Drawcall] {
        &self.drawcalls
    }

    pub fn get_event(&self, event_id: u32) -> Option<&Event> {
        let index = usize::try_from(event_id.checked_sub(1)?).ok()?;
        self.events.get(index)
    }

    pub fn get_drawcall(&self, event_id: u32) -> Option<&Drawcall> {
        self.drawcalls.iter().find(|drawcall| drawcall.event_id == event_id)
    }

    /// The last event executed, or `None` if nothing has run yet.
    pub fn replayed_to(&self) -> Option<u32> {
        self.replayed_to
    }

    /// The name of the object replay created for the captured `id`.
    pub fn live_name(&self, id: ResourceId) -> Result<GLuint, ReplayError> {
        Ok(self.manager.identity().resolve_name(id)?)
    }

    /// Delete everything earlier replays created, and recreate the frame's
    /// starting state.
    pub fn reset(&mut self) -> Result<(), ReplayError> {
        self.state = CaptureState::Executing;
        let mut live: Vec<_> = self.manager.identity().entries().collect();
        live.sort_by_key(|&(id, _)| std::cmp::Reverse(id));
        for (id, handle) in live {
            self.gl.delete_object(handle.kind, handle.name);
            self.manager.identity_mut().erase_live(id);
        }
        self.replayed_to = None;

        for index in 0..self.setup.len() {
            let GlReplay { gl, ctx, manager, setup, .. } = self;
            run_call(gl, ctx, manager.identity_mut(), &setup[index], None)?;
        }
        self.manager.apply_initial_contents(&self.gl)?;
        self.apply_render_state()?;
        self.replayed_to = Some(0);
        Ok(())
    }

    fn apply_render_state(&mut self) -> Result<(), ReplayError> {
        let state = RenderStateTracker::from_params(&self.frame.render_state);
        let identity = self.manager.identity();
        let gl = &self.gl;
        gl.use_program(identity.resolve_name(state.program)?);
        gl.bind_program_pipeline(identity.resolve_name(state.pipeline)?);
        gl.bind_vertex_array(identity.resolve_name(state.vertex_array)?);
        gl.bind_framebuffer(gl::DRAW_FRAMEBUFFER, identity.resolve_name(state.draw_framebuffer)?);
        gl.bind_framebuffer(gl::READ_FRAMEBUFFER, identity.resolve_name(state.read_framebuffer)?);
        gl.bind_transform_feedback(identity.resolve_name(state.transform_feedback)?);
        for (&unit, &texture) in &state.textures {
            gl.bind_texture_unit(unit, identity.resolve_name(texture)?);
        }
        for (&unit, &sampler) in &state.samplers {
            gl.bind_sampler(unit, identity.resolve_name(sampler)?);
        }
        let [red, green, blue, alpha] = state.clear_color;
        gl.clear_color(red, green, blue, alpha);
        let [x, y, width, height] = state.viewport;
        gl.viewport(x, y, width, height);
        Ok(())
    }

    /// Replay the frame's events from `first` to `last` inclusive, as `mode`
    /// directs.
    pub fn replay_log(&mut self, first: u32, last: u32, mode: ReplayMode) -> Result<(), ReplayError> {
        let count = self.events.len() as u32;
        if last == 0 || last > count {
            return Err(ReplayError::EventOutOfRange(last));
        }
        if mode != ReplayMode::Full && (first == 0 || first > last) {
            return Err(ReplayError::EventOutOfRange(first));
        }

        let start = match mode {
            ReplayMode::Full => {
                self.reset()?;
                1
            }
            ReplayMode::DiscardBeforeFirst => {
                self.reset()?;
                for index in 0..first as usize - 1 {
                    if !self.events[index].op.is_drawcall() {
                        self.run_events(index..index + 1)?;
                    }
                }
                first
            }
            ReplayMode::StopAfterLast => {
                match self.replayed_to {
                    None => {
                        self.reset()?;
                        self.run_events(0..first as usize - 1)?;
                    }
                    Some(done) if done + 1 != first => {
                        log::warn!("replaying events {}..={} after stopping at event {}", first, last, done);
                    }
                    Some(_) => {}
                }
                first
            }
        };

        self.run_events(start as usize - 1..last as usize)?;
        self.replayed_to = Some(last);
        log::debug!("replayed frame {} through event {}", self.frame.frame_number, last);
        Ok(())
    }

    /// Execute the events at `range` in the event list. Consecutive events of
    /// one `MultiDrawArrays` chunk run as one call covering just those draws.
    fn run_events(&mut self, range: Range<usize>) -> Result<(), ReplayError> {
        let mut index = range.start;
        while index < range.end {
            let event = &self.events[index];
            let chunk_index = event.chunk_index;
            let mut end = index + 1;
            let sub_draws = match event.sub_draw {
                Some(first) => {
                    while end < range.end && self.events[end].chunk_index == chunk_index {
                        end += 1;
                    }
                    let last = self.events[end - 1].sub_draw.unwrap_or(first);
                    Some(first..last + 1)
                }
                None => None,
            };
            let GlReplay { gl, ctx, manager, calls, .. } = self;
            run_call(gl, ctx, manager.identity_mut(), &calls[chunk_index], sub_draws)?;
            index = end;
        }
        Ok(())
    }
}

/// The most pixel data a replayed `ReadPixels` may read back.
const MAX_READBACK_BYTES: usize = 1 << 30;

/// Upload `data` into `buffer` at `offset` through a staging buffer, which
/// works whatever kind of storage `buffer` has.
fn upload<H: GlHooks>(gl: &H, buffer: GLuint, offset: usize, data: &[u8]) {
    if data.is_empty() {
        return;
    }
    let staging = gl.gen_buffer();
    gl.buffer_data(staging, data.len(), Some(data), gl::STREAM_COPY);
    gl.copy_buffer_sub_data(staging, buffer, 0, offset, data.len());
    gl.delete_object(ResourceKind::Buffer, staging);
}

fn optional(has_data: bool, data: &[u8]) -> Option<&[u8]> {
    if has_data {
        Some(data)
    } else {
        None
    }
}

/// Execute one call. `sub_draws` limits a `MultiDrawArrays` call to some of
/// its draws.
fn run_call<H: GlHooks>(
    gl: &H,
    ctx: &GlContext,
    identity: &mut ResourceIdentity,
    call: &Call,
    sub_draws: Option<Range<usize>>,
) -> Result<(), ReplayError> {
    use Call::*;
    log::trace!("replay: {}", call.describe());

    let new_object = match call {
        CreateBuffer(p) => Some((p.buffer, ResourceKind::Buffer, gl.gen_buffer())),
        CreateTexture(p) => Some((p.texture, ResourceKind::Texture, gl.create_texture(p.target))),
        CreateSampler(p) => Some((p.sampler, ResourceKind::Sampler, gl.create_sampler())),
        CreateFramebuffer(p) => {
            Some((p.framebuffer, ResourceKind::Framebuffer, gl.create_framebuffer()))
        }
        CreateRenderbuffer(p) => {
            Some((p.renderbuffer, ResourceKind::Renderbuffer, gl.create_renderbuffer()))
        }
        CreateVertexArray(p) => {
            Some((p.vertex_array, ResourceKind::VertexArray, gl.create_vertex_array()))
        }
        CreateTransformFeedback(p) => Some((p.transform_feedback, ResourceKind::TransformFeedback,
                                            gl.create_transform_feedback())),
        CreateProgramPipeline(p) => {
            Some((p.pipeline, ResourceKind::ProgramPipeline, gl.create_program_pipeline()))
        }
        CreateShader(p) => Some((p.shader, ResourceKind::Shader, gl.create_shader(p.kind))),
        CreateProgram(p) => Some((p.program, ResourceKind::Program, gl.create_program())),
        CreateQuery(p) => Some((p.query, ResourceKind::Query, gl.create_query())),
        FenceSync(p) => Some((p.sync, ResourceKind::Sync, gl.fence_sync(p.condition))),
        _ => None,
    };
    if let Some((id, kind, name)) = new_object {
        identity.add_live(id, ctx.resource(kind, name));
        return Ok(());
    }

    match call {
        TextureView(p) => {
            let original = identity.resolve_name(p.original)?;
            let name = gl.create_texture(p.target);
            gl.texture_view(name, p.target, original, p.internal_format,
                            p.min_level, p.num_levels, p.min_layer, p.num_layers);
            identity.add_live(p.texture, ctx.resource(ResourceKind::Texture, name));
        }
        CreateBuffer(_) | CreateTexture(_) | CreateSampler(_) | CreateFramebuffer(_)
        | CreateRenderbuffer(_) | CreateVertexArray(_) | CreateTransformFeedback(_)
        | CreateProgramPipeline(_) | CreateShader(_) | CreateProgram(_) | CreateQuery(_)
        | FenceSync(_) => {}
        DeleteResource(p) => {
            let handle = identity.resolve(p.resource)?;
            gl.delete_object(handle.kind, handle.name);
            identity.erase_live(p.resource);
        }

        BufferData(p) => {
            let buffer = identity.resolve_name(p.buffer)?;
            gl.buffer_data(buffer, p.size as usize, optional(p.has_data, &p.data), p.usage);
        }
        BufferStorage(p) => {
            let buffer = identity.resolve_name(p.buffer)?;
            gl.buffer_storage(buffer, p.size as usize, optional(p.has_data, &p.data), p.flags);
        }
        BufferSubData(p) => {
            let buffer = identity.resolve_name(p.buffer)?;
            gl.buffer_sub_data(buffer, p.offset as usize, &p.data);
        }
        CopyBufferSubData(p) => {
            let read = identity.resolve_name(p.read)?;
            let write = identity.resolve_name(p.write)?;
            gl.copy_buffer_sub_data(read, write, p.read_offset as usize, p.write_offset as usize,
                                    p.size as usize);
        }
        Unmap(p) => upload(gl, identity.resolve_name(p.buffer)?, p.offset as usize, &p.data),
        FlushMap(p) => upload(gl, identity.resolve_name(p.buffer)?, p.offset as usize, &p.data),

        TexImage2D(p) => {
            let texture = identity.resolve_name(p.texture)?;
            gl.tex_image_2d(texture, p.target, p.level, p.internal_format, p.width, p.height,
                            p.format, p.ty, optional(p.has_data, &p.data));
        }
        TexSubImage2D(p) => {
            let texture = identity.resolve_name(p.texture)?;
            gl.tex_sub_image_2d(texture, p.target, p.level, p.x, p.y, p.width, p.height,
                                p.format, p.ty, &p.data);
        }
        TexParameter(p) => gl.tex_parameter_i(identity.resolve_name(p.texture)?, p.pname, p.value),
        BindTextureUnit(p) => gl.bind_texture_unit(p.unit, identity.resolve_name(p.texture)?),

        SamplerParameterI(p) => {
            gl.sampler_parameter_i(identity.resolve_name(p.sampler)?, p.pname, p.value)
        }
        SamplerParameterF(p) => {
            gl.sampler_parameter_f(identity.resolve_name(p.sampler)?, p.pname, p.value)
        }
        BindSampler(p) => gl.bind_sampler(p.unit, identity.resolve_name(p.sampler)?),

        FramebufferTexture(p) => {
            let framebuffer = identity.resolve_name(p.framebuffer)?;
            let texture = identity.resolve_name(p.texture)?;
            gl.framebuffer_texture(framebuffer, p.attachment, texture, p.level);
        }
        FramebufferRenderbuffer(p) => {
            let framebuffer = identity.resolve_name(p.framebuffer)?;
            let renderbuffer = identity.resolve_name(p.renderbuffer)?;
            gl.framebuffer_renderbuffer(framebuffer, p.attachment, renderbuffer);
        }
        BindFramebuffer(p) => gl.bind_framebuffer(p.target, identity.resolve_name(p.framebuffer)?),
        RenderbufferStorage(p) => {
            let renderbuffer = identity.resolve_name(p.renderbuffer)?;
            gl.renderbuffer_storage(renderbuffer, p.internal_format, p.samples, p.width, p.height);
        }

        VertexAttribPointer(p) => {
            let vertex_array = identity.resolve_name(p.vertex_array)?;
            let buffer = identity.resolve_name(p.buffer)?;
            gl.vertex_attrib_pointer(vertex_array, p.index, buffer, p.size, p.ty, p.normalized,
                                     p.stride, p.offset as usize);
        }
        EnableVertexAttrib(p) => {
            gl.enable_vertex_attrib(identity.resolve_name(p.vertex_array)?, p.index, p.enabled)
        }
        VertexArrayElementBuffer(p) => {
            let vertex_array = identity.resolve_name(p.vertex_array)?;
            gl.vertex_array_element_buffer(vertex_array, identity.resolve_name(p.buffer)?);
        }
        BindVertexArray(p) => gl.bind_vertex_array(identity.resolve_name(p.vertex_array)?),

        TransformFeedbackBuffer(p) => {
            let transform_feedback = identity.resolve_name(p.transform_feedback)?;
            gl.transform_feedback_buffer(transform_feedback, p.index, identity.resolve_name(p.buffer)?);
        }
        BindTransformFeedback(p) => {
            gl.bind_transform_feedback(identity.resolve_name(p.transform_feedback)?)
        }
        UseProgramStages(p) => {
            let pipeline = identity.resolve_name(p.pipeline)?;
            gl.use_program_stages(pipeline, p.stages, identity.resolve_name(p.program)?);
        }
        BindProgramPipeline(p) => gl.bind_program_pipeline(identity.resolve_name(p.pipeline)?),

        ShaderSource(p) => gl.shader_source(identity.resolve_name(p.shader)?, &p.source),
        CompileShader(p) => gl.compile_shader(identity.resolve_name(p.shader)?),
        AttachShader(p) => {
            let program = identity.resolve_name(p.program)?;
            gl.attach_shader(program, identity.resolve_name(p.shader)?);
        }
        LinkProgram(p) => gl.link_program(identity.resolve_name(p.program)?),
        UseProgram(p) => gl.use_program(identity.resolve_name(p.program)?),

        BeginQuery(p) => gl.begin_query(p.target, identity.resolve_name(p.query)?),
        EndQuery(p) => gl.end_query(p.target),

        ClearColor(p) => gl.clear_color(p.red, p.green, p.blue, p.alpha),
        Clear(p) => gl.clear(p.mask),
        Viewport(p) => gl.viewport(p.x, p.y, p.width, p.height),
        MemoryBarrier(p) => gl.memory_barrier(p.barriers),
        DrawArrays(p) => gl.draw_arrays(p.mode, p.first, p.count),
        DrawElements(p) => gl.draw_elements(p.mode, p.count, p.ty, p.offset as usize),
        MultiDrawArrays(p) => {
            let range = sub_draws.unwrap_or(0..p.counts.len());
            match (p.firsts.get(range.clone()), p.counts.get(range)) {
                (Some(firsts), Some(counts)) if firsts.len() == counts.len() => {
                    gl.multi_draw_arrays(p.mode, firsts, counts)
                }
                _ => return Err(ReplayError::UnexpectedChunk(ChunkOp::MultiDrawArrays)),
            }
        }
        DispatchCompute(p) => gl.dispatch_compute(p.x, p.y, p.z),
        ReadPixels(p) => {
            let pixel = bytes_per_pixel(p.format, p.ty).unwrap_or(4);
            let size = pixel
                .checked_mul(p.width.max(0) as usize)
                .and_then(|row| row.checked_mul(p.height.max(0) as usize))
                .filter(|&size| size <= MAX_READBACK_BYTES)
                .ok_or(SerialError::OutOfRange("read_pixels size"))?;
            let mut out = vec![0; size];
            gl.read_pixels(p.x, p.y, p.width, p.height, p.format, p.ty, &mut out);
        }
    }
    Ok(())
}
