//! Chunks: serialized records of single GL operations.
//!
//! A `Chunk` pairs an operation code with a body of named fields (see the
//! `serial` module). Chunks are immutable once built. In a stream, each chunk
//! is framed as its op code and body length, both unsigned LEB128, followed by
//! the body.

use crate::error::SerialError;
use crate::resource::ResourceKind;
use crate::serial::{self, DecodedField, Serialise};

use std::convert::TryFrom;
use std::io;

macro_rules! chunk_ops {
    ( $( $op:ident = $code:literal, )* ) => {
        /// The operation a chunk records.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum ChunkOp {
            $( $op = $code, )*
        }

        impl ChunkOp {
            pub fn code(self) -> u32 {
                self as u32
            }

            pub fn from_code(code: u32) -> Option<ChunkOp> {
                match code {
                    $( $code => Some(ChunkOp::$op), )*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( ChunkOp::$op => stringify!($op), )*
                }
            }
        }
    }
}

chunk_ops! {
    // Capture file structure.
    DriverInit = 1,
    BeginFrame = 2,
    RenderState = 3,
    InitialContents = 4,
    EndFrame = 5,

    CreateBuffer = 16,
    BufferData = 17,
    BufferStorage = 18,
    BufferSubData = 19,
    CopyBufferSubData = 20,
    Unmap = 21,
    FlushMap = 22,

    CreateTexture = 32,
    TexImage2D = 33,
    TexSubImage2D = 34,
    TexParameter = 35,
    TextureView = 36,
    BindTextureUnit = 37,

    CreateSampler = 48,
    SamplerParameterI = 49,
    SamplerParameterF = 50,
    BindSampler = 51,

    CreateFramebuffer = 64,
    FramebufferTexture = 65,
    FramebufferRenderbuffer = 66,
    BindFramebuffer = 67,
    CreateRenderbuffer = 68,
    RenderbufferStorage = 69,

    CreateVertexArray = 80,
    VertexAttribPointer = 81,
    EnableVertexAttrib = 82,
    VertexArrayElementBuffer = 83,
    BindVertexArray = 84,

    CreateTransformFeedback = 96,
    TransformFeedbackBuffer = 97,
    BindTransformFeedback = 98,
    CreateProgramPipeline = 99,
    UseProgramStages = 100,
    BindProgramPipeline = 101,

    CreateShader = 112,
    ShaderSource = 113,
    CompileShader = 114,
    CreateProgram = 115,
    AttachShader = 116,
    LinkProgram = 117,
    UseProgram = 118,

    CreateQuery = 128,
    BeginQuery = 129,
    EndQuery = 130,
    FenceSync = 131,
    DeleteResource = 132,

    ClearColor = 144,
    Clear = 145,
    Viewport = 146,
    MemoryBarrier = 147,
    DrawArrays = 148,
    DrawElements = 149,
    MultiDrawArrays = 150,
    DispatchCompute = 151,
    ReadPixels = 152,
}

impl ChunkOp {
    /// If this op creates an object, the kind of object it creates.
    pub fn creates(self) -> Option<ResourceKind> {
        use ChunkOp::*;
        Some(match self {
            CreateBuffer => ResourceKind::Buffer,
            CreateTexture | TextureView => ResourceKind::Texture,
            CreateSampler => ResourceKind::Sampler,
            CreateFramebuffer => ResourceKind::Framebuffer,
            CreateRenderbuffer => ResourceKind::Renderbuffer,
            CreateVertexArray => ResourceKind::VertexArray,
            CreateTransformFeedback => ResourceKind::TransformFeedback,
            CreateProgramPipeline => ResourceKind::ProgramPipeline,
            CreateShader => ResourceKind::Shader,
            CreateProgram => ResourceKind::Program,
            CreateQuery => ResourceKind::Query,
            FenceSync => ResourceKind::Sync,
            _ => return None,
        })
    }

    /// True if this op updates an object's contents incrementally. A dirty
    /// object's history skips these, since its initial contents supersede
    /// them.
    pub fn writes_contents(self) -> bool {
        use ChunkOp::*;
        match self {
            BufferSubData | CopyBufferSubData | Unmap | FlushMap | TexSubImage2D => true,
            _ => false,
        }
    }

    /// True if this op draws, dispatches or reads back: the events a replay
    /// tool lists as drawcalls.
    pub fn is_drawcall(self) -> bool {
        use ChunkOp::*;
        match self {
            Clear | DrawArrays | DrawElements | MultiDrawArrays | DispatchCompute | ReadPixels => {
                true
            }
            _ => false,
        }
    }

    /// True for the ops that structure a capture file, rather than record GL
    /// calls.
    pub fn is_structural(self) -> bool {
        use ChunkOp::*;
        match self {
            DriverInit | BeginFrame | RenderState | InitialContents | EndFrame => true,
            _ => false,
        }
    }
}

/// A serialized GL operation.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    op: ChunkOp,
    body: Vec<u8>,
}

impl Chunk {
    pub fn new<P: Serialise>(op: ChunkOp, params: &mut P) -> Chunk {
        Chunk {
            op,
            body: serial::to_bytes(params),
        }
    }

    pub fn op(&self) -> ChunkOp {
        self.op
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Decode this chunk's parameters, which must occupy the entire body.
    pub fn read<P: Serialise + Default>(&self) -> Result<P, SerialError> {
        let (params, trailing) = serial::from_bytes(&self.body)?;
        if trailing != 0 {
            return Err(SerialError::TrailingData(self.op, trailing));
        }
        Ok(params)
    }

    /// Decode this chunk's fields without knowing its parameter type.
    pub fn fields(&self) -> Result<Vec<DecodedField>, SerialError> {
        serial::decode_fields(&self.body)
    }

    /// The number of bytes `write` produces for this chunk.
    pub fn encoded_len(&self) -> usize {
        let mut header = Vec::with_capacity(16);
        self.write_header(&mut header);
        header.len() + self.body.len()
    }

    fn write_header(&self, out: &mut Vec<u8>) {
        // Writes to a `Vec` can't fail.
        let _ = leb128::write::unsigned(out, u64::from(self.op.code()));
        let _ = leb128::write::unsigned(out, self.body.len() as u64);
    }

    pub fn write<W: io::Write>(&self, stream: &mut W) -> io::Result<()> {
        let mut header = Vec::with_capacity(16);
        self.write_header(&mut header);
        stream.write_all(&header)?;
        stream.write_all(&self.body)
    }

    /// Read one framed chunk from the front of `buf`, advancing it.
    pub fn read_from(buf: &mut &[u8]) -> Result<Chunk, SerialError> {
        let code = read_uleb(buf)?;
        let code = u32::try_from(code).map_err(|_| SerialError::OutOfRange("chunk op"))?;
        let op = ChunkOp::from_code(code).ok_or(SerialError::UnknownChunk(code))?;
        let len = usize::try_from(read_uleb(buf)?)
            .map_err(|_| SerialError::OutOfRange("chunk length"))?;
        if buf.len() < len {
            return Err(SerialError::UnexpectedEof);
        }
        let (body, rest) = buf.split_at(len);
        *buf = rest;
        Ok(Chunk {
            op,
            body: body.to_vec(),
        })
    }
}

fn read_uleb(buf: &mut &[u8]) -> Result<u64, SerialError> {
    leb128::read::unsigned(buf).map_err(|err| match err {
        leb128::read::Error::Overflow => SerialError::Leb128Overflow,
        leb128::read::Error::IoError(_) => SerialError::UnexpectedEof,
    })
}
