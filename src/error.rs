//! Error types for capture and replay.
//!
//! Errors fall into four groups, which are handled differently:
//!
//! - `SerialError`: the chunk stream is malformed or truncated. Replay stops at
//!   the first one, since resource identities can't be trusted past that point.
//!
//! - `IdentityError`: the crate's own bookkeeping was misused. In capture paths
//!   these are logged and trip a `debug_assert!`.
//!
//! - `CaptureFailure`: the frame being captured can't be replayed faithfully.
//!   The frame is discarded and the capture is retried on a later frame.
//!
//! - `CaptureWarning`: one resource's initial contents couldn't be fetched. The
//!   capture proceeds, and replay leaves that resource's contents unspecified.

use crate::chunk::ChunkOp;
use crate::resource::{GlResource, ResourceId};

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("serialized chunk data truncated")]
    UnexpectedEof,

    #[error("field `{field}`: expected field tag {expected}, found {found}")]
    BadTag {
        field: &'static str,
        expected: u8,
        found: u8,
    },

    #[error("expected field `{expected}`, found field `{found}`")]
    FieldName {
        expected: &'static str,
        found: String,
    },

    #[error("serialized chunk data included bad UTF-8")]
    BadUtf8,

    #[error("field `{0}`: value out of range")]
    OutOfRange(&'static str),

    #[error("LEB128 value overflows 64 bits")]
    Leb128Overflow,

    #[error("unknown chunk op code {0}")]
    UnknownChunk(u32),

    #[error("{0:?} chunk has {1} unread trailing bytes")]
    TrailingData(ChunkOp, usize),

    #[error("bad capture file: {0}")]
    BadFile(String),

    #[error("error reading capture file: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IdentityError {
    #[error("{0} was never registered")]
    UnknownResource(ResourceId),

    #[error("{0} is not live yet: the chunk that creates it has not executed")]
    NotYetLive(ResourceId),

    #[error("{0} already has a resource record")]
    DuplicateRecord(ResourceId),

    #[error("native object {0:?} is already registered as {1}")]
    AlreadyRegistered(GlResource, ResourceId),
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Serial(#[from] SerialError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("capture has no frame {0}")]
    NoFrame(usize),

    #[error("unexpected {0:?} chunk in frame body")]
    UnexpectedChunk(ChunkOp),

    #[error("event {0} is out of range")]
    EventOutOfRange(u32),
}

/// Why a frame capture was discarded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureFailure {
    #[error("unmap or flush of {0}, whose map was not captured")]
    UncappedUnmap(ResourceId),

    #[error("capture aborted by caller")]
    Aborted,

    #[error("no frame capture in progress")]
    NotCapturing,
}

/// A degradation recorded against one resource during a capture.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureWarning {
    #[error("initial contents of {0} were never fetched: its context was not made current")]
    InitialStateMissed(ResourceId),

    #[error("initial contents of {id} are undefined: {reason}")]
    InitialStateUnsupported { id: ResourceId, reason: String },

    #[error("flush of {id} at {offset}+{length} clamped to the mapped range")]
    FlushClamped {
        id: ResourceId,
        offset: usize,
        length: usize,
    },
}
