//! Parameter records for every chunk op.
//!
//! Each struct here is the body of one kind of chunk. Fields that name GL
//! objects hold `ResourceId`s, never native handles, so a chunk means the same
//! thing in the capture and replay processes. A `data` field left empty with
//! `has_data` false stands for a null data pointer.

use crate::resource::ResourceId;

serialised_struct! {
    pub struct DriverInit {
        version: u32,
        vendor: String,
        renderer: String,
    }

    pub struct BeginFrame {
        frame_number: u64,
        setup_chunks: u64,
        initial_states: u64,
        frame_chunks: u64,
    }

    pub struct EndFrame {
        frame_number: u64,
    }

    /// The bindings in effect when a frame capture begins.
    pub struct RenderState {
        program: ResourceId,
        pipeline: ResourceId,
        vertex_array: ResourceId,
        draw_framebuffer: ResourceId,
        read_framebuffer: ResourceId,
        transform_feedback: ResourceId,
        textures: Vec<ResourceId>,
        samplers: Vec<ResourceId>,
        clear_color: Vec<f32>,
        viewport: Vec<i32>,
    }

    pub struct CreateBuffer {
        buffer: ResourceId,
    }

    pub struct BufferData {
        buffer: ResourceId,
        size: u64,
        has_data: bool,
        data: Vec<u8>,
        usage: u32,
    }

    pub struct BufferStorage {
        buffer: ResourceId,
        size: u64,
        has_data: bool,
        data: Vec<u8>,
        flags: u32,
    }

    pub struct BufferSubData {
        buffer: ResourceId,
        offset: u64,
        data: Vec<u8>,
    }

    pub struct CopyBufferSubData {
        read: ResourceId,
        write: ResourceId,
        read_offset: u64,
        write_offset: u64,
        size: u64,
    }

    /// The bytes an unmap changed, starting `offset` bytes into the buffer.
    pub struct Unmap {
        buffer: ResourceId,
        offset: u64,
        data: Vec<u8>,
    }

    /// A flushed range of a mapped buffer, `offset` bytes into the buffer.
    pub struct FlushMap {
        buffer: ResourceId,
        offset: u64,
        data: Vec<u8>,
    }

    pub struct CreateTexture {
        texture: ResourceId,
        target: u32,
    }

    pub struct TexImage2D {
        texture: ResourceId,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        has_data: bool,
        data: Vec<u8>,
    }

    pub struct TexSubImage2D {
        texture: ResourceId,
        target: u32,
        level: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        data: Vec<u8>,
    }

    pub struct TexParameter {
        texture: ResourceId,
        pname: u32,
        value: i32,
    }

    pub struct TextureView {
        texture: ResourceId,
        target: u32,
        original: ResourceId,
        internal_format: u32,
        min_level: u32,
        num_levels: u32,
        min_layer: u32,
        num_layers: u32,
    }

    pub struct BindTextureUnit {
        unit: u32,
        texture: ResourceId,
    }

    pub struct CreateSampler {
        sampler: ResourceId,
    }

    pub struct SamplerParameterI {
        sampler: ResourceId,
        pname: u32,
        value: i32,
    }

    pub struct SamplerParameterF {
        sampler: ResourceId,
        pname: u32,
        value: f32,
    }

    pub struct BindSampler {
        unit: u32,
        sampler: ResourceId,
    }

    pub struct CreateFramebuffer {
        framebuffer: ResourceId,
    }

    pub struct FramebufferTexture {
        framebuffer: ResourceId,
        attachment: u32,
        texture: ResourceId,
        level: i32,
    }

    pub struct FramebufferRenderbuffer {
        framebuffer: ResourceId,
        attachment: u32,
        renderbuffer: ResourceId,
    }

    pub struct BindFramebuffer {
        target: u32,
        framebuffer: ResourceId,
    }

    pub struct CreateRenderbuffer {
        renderbuffer: ResourceId,
    }

    pub struct RenderbufferStorage {
        renderbuffer: ResourceId,
        internal_format: u32,
        samples: i32,
        width: i32,
        height: i32,
    }

    pub struct CreateVertexArray {
        vertex_array: ResourceId,
    }

    pub struct VertexAttribPointer {
        vertex_array: ResourceId,
        index: u32,
        buffer: ResourceId,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: u64,
    }

    pub struct EnableVertexAttrib {
        vertex_array: ResourceId,
        index: u32,
        enabled: bool,
    }

    pub struct VertexArrayElementBuffer {
        vertex_array: ResourceId,
        buffer: ResourceId,
    }

    pub struct BindVertexArray {
        vertex_array: ResourceId,
    }

    pub struct CreateTransformFeedback {
        transform_feedback: ResourceId,
    }

    pub struct TransformFeedbackBuffer {
        transform_feedback: ResourceId,
        index: u32,
        buffer: ResourceId,
    }

    pub struct BindTransformFeedback {
        transform_feedback: ResourceId,
    }

    pub struct CreateProgramPipeline {
        pipeline: ResourceId,
    }

    pub struct UseProgramStages {
        pipeline: ResourceId,
        stages: u32,
        program: ResourceId,
    }

    pub struct BindProgramPipeline {
        pipeline: ResourceId,
    }

    pub struct CreateShader {
        shader: ResourceId,
        kind: u32,
    }

    pub struct ShaderSource {
        shader: ResourceId,
        source: String,
    }

    pub struct CompileShader {
        shader: ResourceId,
    }

    pub struct CreateProgram {
        program: ResourceId,
    }

    pub struct AttachShader {
        program: ResourceId,
        shader: ResourceId,
    }

    pub struct LinkProgram {
        program: ResourceId,
    }

    pub struct UseProgram {
        program: ResourceId,
    }

    pub struct CreateQuery {
        query: ResourceId,
    }

    pub struct BeginQuery {
        target: u32,
        query: ResourceId,
    }

    pub struct EndQuery {
        target: u32,
    }

    pub struct FenceSync {
        sync: ResourceId,
        condition: u32,
    }

    pub struct DeleteResource {
        resource: ResourceId,
    }

    pub struct ClearColor {
        red: f32,
        green: f32,
        blue: f32,
        alpha: f32,
    }

    pub struct Clear {
        mask: u32,
    }

    pub struct Viewport {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    }

    pub struct MemoryBarrier {
        barriers: u32,
    }

    pub struct DrawArrays {
        mode: u32,
        first: i32,
        count: i32,
    }

    pub struct DrawElements {
        mode: u32,
        count: i32,
        ty: u32,
        offset: u64,
    }

    /// One event per element of `firsts` and `counts`, which have equal
    /// lengths.
    pub struct MultiDrawArrays {
        mode: u32,
        firsts: Vec<i32>,
        counts: Vec<i32>,
    }

    pub struct DispatchCompute {
        x: u32,
        y: u32,
        z: u32,
    }

    pub struct ReadPixels {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
    }
}
