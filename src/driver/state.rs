//! The bindings a frame starts with.

use crate::params;
use crate::resource::ResourceId;

use gleam::gl::GLuint;
use serde::Serialize;

use std::collections::BTreeMap;

/// The context's object bindings and the few pieces of fixed state the
/// capture layer tracks, kept up to date as calls go by so that a capture can
/// record what was in effect when it began.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RenderStateTracker {
    pub program: ResourceId,
    pub pipeline: ResourceId,
    pub vertex_array: ResourceId,
    pub draw_framebuffer: ResourceId,
    pub read_framebuffer: ResourceId,
    pub transform_feedback: ResourceId,
    /// Texture bindings by unit.
    pub textures: BTreeMap<GLuint, ResourceId>,
    /// Sampler bindings by unit.
    pub samplers: BTreeMap<GLuint, ResourceId>,
    pub clear_color: [f32; 4],
    pub viewport: [i32; 4],
}

/// Expand a sparse unit map into a vector indexed by unit.
fn by_unit(units: &BTreeMap<GLuint, ResourceId>) -> Vec<ResourceId> {
    let len = units.keys().next_back().map_or(0, |&last| last as usize + 1);
    let mut dense = vec![ResourceId::NULL; len];
    for (&unit, &id) in units {
        dense[unit as usize] = id;
    }
    dense
}

fn from_units(dense: &[ResourceId]) -> BTreeMap<GLuint, ResourceId> {
    dense
        .iter()
        .enumerate()
        .filter(|(_, id)| !id.is_null())
        .map(|(unit, &id)| (unit as GLuint, id))
        .collect()
}

impl RenderStateTracker {
    pub fn to_params(&self) -> params::RenderState {
        params::RenderState {
            program: self.program,
            pipeline: self.pipeline,
            vertex_array: self.vertex_array,
            draw_framebuffer: self.draw_framebuffer,
            read_framebuffer: self.read_framebuffer,
            transform_feedback: self.transform_feedback,
            textures: by_unit(&self.textures),
            samplers: by_unit(&self.samplers),
            clear_color: self.clear_color.to_vec(),
            viewport: self.viewport.to_vec(),
        }
    }

    pub fn from_params(state: &params::RenderState) -> RenderStateTracker {
        let mut clear_color = [0.0; 4];
        for (slot, &value) in clear_color.iter_mut().zip(&state.clear_color) {
            *slot = value;
        }
        let mut viewport = [0; 4];
        for (slot, &value) in viewport.iter_mut().zip(&state.viewport) {
            *slot = value;
        }
        RenderStateTracker {
            program: state.program,
            pipeline: state.pipeline,
            vertex_array: state.vertex_array,
            draw_framebuffer: state.draw_framebuffer,
            read_framebuffer: state.read_framebuffer,
            transform_feedback: state.transform_feedback,
            textures: from_units(&state.textures),
            samplers: from_units(&state.samplers),
            clear_color,
            viewport,
        }
    }

    /// Every object currently bound, without duplicates.
    pub fn bound_objects(&self) -> Vec<ResourceId> {
        let mut ids = vec![
            self.program,
            self.pipeline,
            self.vertex_array,
            self.draw_framebuffer,
            self.read_framebuffer,
            self.transform_feedback,
        ];
        ids.extend(self.textures.values().copied());
        ids.extend(self.samplers.values().copied());
        ids.retain(|id| !id.is_null());
        ids.sort();
        ids.dedup();
        ids
    }

    /// Drop every binding of `id`, which is being deleted.
    pub fn unbind(&mut self, id: ResourceId) {
        for slot in [
            &mut self.program,
            &mut self.pipeline,
            &mut self.vertex_array,
            &mut self.draw_framebuffer,
            &mut self.read_framebuffer,
            &mut self.transform_feedback,
        ]
        .iter_mut()
        {
            if **slot == id {
                **slot = ResourceId::NULL;
            }
        }
        self.textures.retain(|_, bound| *bound != id);
        self.samplers.retain(|_, bound| *bound != id);
    }
}
