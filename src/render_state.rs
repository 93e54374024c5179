use bytemuck::{Pod, Zeroable};

use crate::ambient::AmbientCube;
use crate::level::LeafId;
use crate::material::StageRoles;
use crate::registry::CubemapTexture;

/// Lights lit at full intensity for one object.
pub const MAX_ACTIVE_LIGHTS: usize = 4;
/// Active lights plus the slots used for lights fading in or out.
pub const MAX_TOTAL_LIGHTS: usize = 8;

/// Lighting inputs composed for one object, ready for the shading stage.
#[derive(Debug, Clone, PartialEq)]
pub struct LightingRenderState {
    pub ambient_cube: AmbientCube,
    pub light_count: usize,
    pub active_lights: usize,
    pub light_types: [i32; MAX_TOTAL_LIGHTS],
    pub light_data: [[f32; 16]; MAX_TOTAL_LIGHTS],
    pub light_data2: [[f32; 16]; MAX_TOTAL_LIGHTS],
    pub light_ids: [i32; MAX_TOTAL_LIGHTS],
    /// Environment map injected for materials that ask for the level cubemap.
    pub cubemap: Option<CubemapTexture>,
    /// The nearest cubemap differs from the previous resolution; texture bindings need a refresh.
    pub cubemap_changed: bool,
    /// Stage roles after lighting inputs were added.
    pub stages: StageRoles,
    pub leaf: Option<LeafId>,
}

impl LightingRenderState {
    pub fn unlit(ambient: AmbientCube) -> Self {
        Self {
            ambient_cube: ambient,
            light_count: 0,
            active_lights: 0,
            light_types: [0; MAX_TOTAL_LIGHTS],
            light_data: [[0.0; 16]; MAX_TOTAL_LIGHTS],
            light_data2: [[0.0; 16]; MAX_TOTAL_LIGHTS],
            light_ids: [-1; MAX_TOTAL_LIGHTS],
            cubemap: None,
            cubemap_changed: false,
            stages: StageRoles::empty(),
            leaf: None,
        }
    }

    pub fn populated_ids(&self) -> &[i32] {
        &self.light_ids[..self.light_count]
    }

    pub fn to_uniform(&self) -> LightingUniform {
        LightingUniform {
            ambient_cube: self.ambient_cube.to_gpu(),
            counts: [self.light_count as i32, self.active_lights as i32, self.cubemap.is_some() as i32, 0],
            light_types: self.light_types,
            light_ids: self.light_ids,
            light_data: self.light_data,
            light_data2: self.light_data2,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LightingUniform {
    pub ambient_cube: [[f32; 4]; 6],
    /// light count, active lights, has cubemap, padding
    pub counts: [i32; 4],
    pub light_types: [i32; MAX_TOTAL_LIGHTS],
    pub light_ids: [i32; MAX_TOTAL_LIGHTS],
    pub light_data: [[f32; 16]; MAX_TOTAL_LIGHTS],
    pub light_data2: [[f32; 16]; MAX_TOTAL_LIGHTS],
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn uniform_is_tightly_packed() {
        let expected = 6 * 16 + 16 + 2 * MAX_TOTAL_LIGHTS * 4 + 2 * MAX_TOTAL_LIGHTS * 64;
        assert_eq!(std::mem::size_of::<LightingUniform>(), expected);
    }

    #[test]
    fn unlit_state_has_no_lights() {
        let state = LightingRenderState::unlit(AmbientCube::splat(Vec3::splat(0.1)));
        assert!(state.populated_ids().is_empty());
        let uniform = state.to_uniform();
        assert_eq!(uniform.counts, [0, 0, 0, 0]);
        assert!((uniform.ambient_cube[5][1] - 0.1).abs() < f32::EPSILON);
        assert_eq!(bytemuck::bytes_of(&uniform).len(), std::mem::size_of::<LightingUniform>());
    }
}
