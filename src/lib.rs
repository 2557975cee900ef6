//! Frame capture and replay for OpenGL.
//!
//! This crate sits between an application and its GL driver. The
//! application's calls go through a `GlCapture`, which passes each one on to
//! the real driver through a `GlHooks` implementation, and keeps track of what
//! every GL object would take to recreate. When asked, it captures one frame:
//! every call the frame makes, plus whatever is needed to put the objects
//! the frame uses back the way they were when it began. Captured frames are
//! saved as capture files (see `capture_file`).
//!
//! A `GlReplay` reads a frame back from a capture file, recreates its starting
//! state on another GL context, and replays its calls up to any event in the
//! frame. Objects are named in captures by `ResourceId`, never by native GL
//! name, so replay can map each one to whatever object it created in its
//! place.
//!
//! Mapped buffers need special care, since the application writes through a
//! pointer rather than calling GL. See `mapping` for how those writes are
//! caught.

#[macro_use]
pub mod serial;

pub mod capture_file;
pub mod chunk;
pub mod driver;
pub mod error;
pub mod hooks;
pub mod initstate;
pub mod manager;
pub mod mapping;
pub mod params;
pub mod record;
pub mod replay;
pub mod resource;
pub mod rle;
pub mod state_export;
pub mod write_image;

#[cfg(test)]
mod fake_gl;

pub use capture_file::{CapturedFrame, Recording};
pub use driver::{CaptureOptions, CaptureState, GlCapture};
pub use hooks::GlHooks;
pub use replay::{GlReplay, ReplayMode};
pub use resource::{GlContext, ResourceId, ResourceKind};
