//! Capture files: a sequence of captured frames, on disk.
//!
//! A capture file starts with an eight-byte header: the magic bytes `GLCP`, a
//! little-endian `u16` format version, and two reserved zero bytes. Then come
//! framed chunks (see `chunk`):
//!
//! - one `DriverInit` chunk describing the driver the capture was made on;
//!
//! - for each captured frame, a `BeginFrame` chunk giving the frame number and
//!   the length of each of the frame's three sections, a `RenderState` chunk,
//!   the setup chunks, the initial-state chunks, the frame's own chunks, and an
//!   `EndFrame` chunk.
//!
//! The setup chunks recreate every object the frame uses that existed before
//! it began; the initial-state chunks then restore those objects' contents.

use crate::chunk::{Chunk, ChunkOp};
use crate::error::{CaptureWarning, SerialError};
use crate::params;

use std::convert::TryFrom;
use std::io::{self, Write};
use std::path::Path;
use std::fs;

pub const MAGIC: [u8; 4] = *b"GLCP";
pub const VERSION: u16 = 1;
const HEADER_LEN: usize = 8;

/// Everything needed to replay one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CapturedFrame {
    pub frame_number: u64,
    pub render_state: params::RenderState,
    pub setup: Vec<Chunk>,
    pub initial: Vec<Chunk>,
    pub chunks: Vec<Chunk>,

    /// Degradations noted while capturing. These are not written to the file.
    pub warnings: Vec<CaptureWarning>,
}

impl CapturedFrame {
    pub fn chunk_count(&self) -> usize {
        self.setup.len() + self.initial.len() + self.chunks.len()
    }

    fn write<W: Write>(&self, stream: &mut W) -> io::Result<()> {
        let begin = Chunk::new(
            ChunkOp::BeginFrame,
            &mut params::BeginFrame {
                frame_number: self.frame_number,
                setup_chunks: self.setup.len() as u64,
                initial_states: self.initial.len() as u64,
                frame_chunks: self.chunks.len() as u64,
            },
        );
        begin.write(stream)?;
        Chunk::new(ChunkOp::RenderState, &mut self.render_state.clone()).write(stream)?;
        for chunk in self.setup.iter().chain(&self.initial).chain(&self.chunks) {
            chunk.write(stream)?;
        }
        let end = Chunk::new(
            ChunkOp::EndFrame,
            &mut params::EndFrame {
                frame_number: self.frame_number,
            },
        );
        end.write(stream)
    }

    fn read(buf: &mut &[u8]) -> Result<CapturedFrame, SerialError> {
        let begin: params::BeginFrame = expect(buf, ChunkOp::BeginFrame)?;
        let render_state: params::RenderState = expect(buf, ChunkOp::RenderState)?;

        let setup = read_section(buf, begin.setup_chunks, |op| !op.is_structural())?;
        let initial = read_section(buf, begin.initial_states, |op| op == ChunkOp::InitialContents)?;
        let chunks = read_section(buf, begin.frame_chunks, |op| !op.is_structural())?;

        let end: params::EndFrame = expect(buf, ChunkOp::EndFrame)?;
        if end.frame_number != begin.frame_number {
            return Err(SerialError::BadFile(format!(
                "frame {} ends with the marker for frame {}",
                begin.frame_number, end.frame_number
            )));
        }

        Ok(CapturedFrame {
            frame_number: begin.frame_number,
            render_state,
            setup,
            initial,
            chunks,
            warnings: vec![],
        })
    }
}

/// Read a chunk that must be `op`, and decode its parameters.
fn expect<P: crate::serial::Serialise + Default>(buf: &mut &[u8], op: ChunkOp) -> Result<P, SerialError> {
    let chunk = Chunk::read_from(buf)?;
    if chunk.op() != op {
        return Err(SerialError::BadFile(format!(
            "expected {} chunk, found {}",
            op.name(),
            chunk.op().name()
        )));
    }
    chunk.read()
}

fn read_section<F>(buf: &mut &[u8], count: u64, allowed: F) -> Result<Vec<Chunk>, SerialError>
where
    F: Fn(ChunkOp) -> bool,
{
    let count = usize::try_from(count).map_err(|_| SerialError::OutOfRange("section length"))?;
    // Every chunk takes at least two bytes, so this bounds the allocation.
    let mut chunks = Vec::with_capacity(count.min(buf.len() / 2));
    for _ in 0..count {
        let chunk = Chunk::read_from(buf)?;
        if !allowed(chunk.op()) {
            return Err(SerialError::BadFile(format!(
                "{} chunk out of place",
                chunk.op().name()
            )));
        }
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// The contents of a capture file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Recording {
    pub driver: params::DriverInit,
    pub frames: Vec<CapturedFrame>,
}

impl Recording {
    pub fn write<W: Write>(&self, stream: &mut W) -> io::Result<()> {
        let mut header = [0; HEADER_LEN];
        header[..4].copy_from_slice(&MAGIC);
        header[4..6].copy_from_slice(&VERSION.to_le_bytes());
        stream.write_all(&header)?;
        Chunk::new(ChunkOp::DriverInit, &mut self.driver.clone()).write(stream)?;
        for frame in &self.frames {
            frame.write(stream)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![];
        // Writes to a `Vec` can't fail.
        let _ = self.write(&mut bytes);
        bytes
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = io::BufWriter::new(fs::File::create(path)?);
        self.write(&mut file)?;
        file.flush()
    }

    pub fn read(bytes: &[u8]) -> Result<Recording, SerialError> {
        if bytes.len() < HEADER_LEN || bytes[..4] != MAGIC {
            return Err(SerialError::BadFile("missing GLCP header".to_string()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(SerialError::BadFile(format!(
                "unsupported capture format version {}",
                version
            )));
        }

        let mut buf = &bytes[HEADER_LEN..];
        let driver = expect(&mut buf, ChunkOp::DriverInit)?;
        let mut frames = vec![];
        while !buf.is_empty() {
            frames.push(CapturedFrame::read(&mut buf)?);
        }
        Ok(Recording { driver, frames })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Recording, SerialError> {
        let bytes = fs::read(path)?;
        Recording::read(&bytes)
    }
}
