//! A dump of the driver's object state, for comparing a capture session with a
//! replay of it.
//!
//! Objects are keyed by the native name the exporting side uses, and the state
//! is read back from the driver rather than from anything the capture layer
//! recorded, so that a capture and its replay can be diffed directly.

use crate::driver::{GlCapture, RenderStateTracker};
use crate::hooks::GlHooks;
use crate::initstate::ATTACHMENT_POINTS;
use crate::replay::GlReplay;
use crate::resource::{ResourceId, ResourceIdentity, ResourceKind};

use gleam::gl::{self, GLenum, GLint, GLsizei, GLuint};
use serde::Serialize;

use std::collections::BTreeMap;

/// Transform feedback binding points we report.
const TRANSFORM_FEEDBACK_BUFFERS: GLuint = 4;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttachmentExport {
    pub attachment: GLenum,
    pub object_type: GLenum,
    pub name: GLuint,
    pub level: GLint,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FramebufferExport {
    pub id: ResourceId,
    pub attachments: Vec<AttachmentExport>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttribExport {
    pub index: GLuint,
    pub enabled: bool,
    pub buffer: GLuint,
    pub size: GLint,
    pub ty: GLenum,
    pub normalized: bool,
    pub stride: GLsizei,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VertexArrayExport {
    pub id: ResourceId,
    pub element_buffer: GLuint,
    /// Only attributes that are enabled or have a buffer.
    pub attribs: Vec<AttribExport>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransformFeedbackExport {
    pub id: ResourceId,
    /// Bound buffers by binding index.
    pub buffers: BTreeMap<GLuint, GLuint>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StateExport {
    pub framebuffers: BTreeMap<GLuint, FramebufferExport>,
    pub vertex_arrays: BTreeMap<GLuint, VertexArrayExport>,
    pub transform_feedback: BTreeMap<GLuint, TransformFeedbackExport>,
    pub render_state: RenderStateTracker,
}

impl StateExport {
    /// Read back the state of every framebuffer, vertex array and transform
    /// feedback object `identity` knows a native name for.
    pub fn gather<H: GlHooks>(gl: &H, identity: &ResourceIdentity, render_state: &RenderStateTracker)
                              -> StateExport
    {
        let mut export = StateExport {
            framebuffers: BTreeMap::new(),
            vertex_arrays: BTreeMap::new(),
            transform_feedback: BTreeMap::new(),
            render_state: render_state.clone(),
        };

        for (id, handle) in identity.entries() {
            let name = handle.name;
            match handle.kind {
                ResourceKind::Framebuffer => {
                    let attachments = ATTACHMENT_POINTS
                        .iter()
                        .filter_map(|&attachment| {
                            let found = gl.get_framebuffer_attachment(name, attachment);
                            if found.object_type == gl::NONE || found.name == 0 {
                                return None;
                            }
                            Some(AttachmentExport {
                                attachment,
                                object_type: found.object_type,
                                name: found.name,
                                level: found.level,
                            })
                        })
                        .collect();
                    export.framebuffers.insert(name, FramebufferExport { id, attachments });
                }
                ResourceKind::VertexArray => {
                    let attribs = (0..gl.max_vertex_attribs())
                        .filter_map(|index| {
                            let attrib = gl.get_vertex_attrib(name, index);
                            if !attrib.enabled && attrib.buffer == 0 {
                                return None;
                            }
                            Some(AttribExport {
                                index,
                                enabled: attrib.enabled,
                                buffer: attrib.buffer,
                                size: attrib.size,
                                ty: attrib.ty,
                                normalized: attrib.normalized,
                                stride: attrib.stride,
                                offset: attrib.offset,
                            })
                        })
                        .collect();
                    export.vertex_arrays.insert(name, VertexArrayExport {
                        id,
                        element_buffer: gl.get_vertex_array_element_buffer(name),
                        attribs,
                    });
                }
                ResourceKind::TransformFeedback => {
                    let buffers = (0..TRANSFORM_FEEDBACK_BUFFERS)
                        .map(|index| (index, gl.get_transform_feedback_buffer(name, index)))
                        .filter(|&(_, buffer)| buffer != 0)
                        .collect();
                    export.transform_feedback.insert(name, TransformFeedbackExport { id, buffers });
                }
                _ => {}
            }
        }
        export
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl<H: GlHooks> GlCapture<H> {
    /// Dump the state of the objects the application has created.
    pub fn export_state(&self) -> StateExport {
        StateExport::gather(self.gl(), self.manager().identity(), self.render_state())
    }
}

impl<H: GlHooks> GlReplay<H> {
    /// Dump the state of the objects this replay has created, with the
    /// bindings the frame started with.
    pub fn export_state(&self) -> StateExport {
        let render_state = RenderStateTracker::from_params(&self.frame().render_state);
        StateExport::gather(self.gl(), self.manager().identity(), &render_state)
    }
}
