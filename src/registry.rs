//! Arenas for the probes, lights and cubemaps of the loaded level.
//!
//! Other structures refer to entries through the stable indices handed out here.

use glam::{Vec3, Vec4};
use std::any::Any;
use std::sync::{Arc, Weak};

use crate::ambient::AmbientCube;
use crate::bake::BakedLighting;
use crate::error::LevelError;
use crate::level::LeafId;
use crate::light::{Light, LightId, LightKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProbeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CubemapId(pub u32);

/// Weak handle to whatever object produced a probe. Dead markers hide the probe.
#[derive(Clone)]
pub struct VisibilityMarker(Weak<dyn Any + Send + Sync>);

impl VisibilityMarker {
    pub fn new<T: Any + Send + Sync>(owner: &Arc<T>) -> Self {
        let weak: Weak<dyn Any + Send + Sync> = Arc::downgrade(owner) as Weak<dyn Any + Send + Sync>;
        Self(weak)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl std::fmt::Debug for VisibilityMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("VisibilityMarker").field(&self.is_alive()).finish()
    }
}

#[derive(Debug, Clone)]
pub struct AmbientProbe {
    pub id: ProbeId,
    pub leaf: LeafId,
    pub position: Vec3,
    pub cube: AmbientCube,
    pub visibility_marker: Option<VisibilityMarker>,
}

impl AmbientProbe {
    pub fn is_visible(&self) -> bool {
        self.visibility_marker.as_ref().map_or(true, VisibilityMarker::is_alive)
    }
}

/// Reference to a cube texture owned by the texture loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CubemapTexture {
    pub key: Arc<str>,
    pub captured: bool,
}

#[derive(Debug, Clone)]
pub struct Cubemap {
    pub id: CubemapId,
    pub leaf: LeafId,
    pub position: Vec3,
    pub texture: CubemapTexture,
}

#[derive(Debug, Default)]
pub struct LightingRegistry {
    probes: Vec<AmbientProbe>,
    lights: Vec<Light>,
    cubemaps: Vec<Cubemap>,
    sunlight: Option<LightId>,
}

impl LightingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates the arenas from baked data, checking every leaf reference against `leaf_count`.
    pub fn from_baked(baked: &BakedLighting, leaf_count: usize) -> Result<Self, LevelError> {
        let mut registry = Self::new();
        for probe in &baked.probes {
            let cube = AmbientCube(probe.cube.map(Vec3::from));
            registry.add_probe(probe.leaf, probe.position.into(), cube);
        }
        for data in &baked.lights {
            let id = registry.add_light(data.leaf, data.kind, data.position.into(), data.color.into());
            let light = &mut registry.lights[id.index()];
            let direction = Vec3::from(data.direction).normalize_or_zero();
            light.direction = if direction == Vec3::ZERO { Vec3::NEG_Z } else { direction };
            light.falloff = Vec4::from_array(data.falloff);
            light.falloff2 = Vec4::from_array(data.falloff2);
            light.falloff3 = Vec4::from_array(data.falloff3);
        }
        for cubemap in &baked.cubemaps {
            registry.add_cubemap(
                cubemap.leaf,
                cubemap.position.into(),
                CubemapTexture { key: Arc::from(cubemap.texture.as_str()), captured: cubemap.captured },
            );
        }
        registry.validate(leaf_count)?;
        Ok(registry)
    }

    pub fn validate(&self, leaf_count: usize) -> Result<(), LevelError> {
        let check = |kind: &'static str, index: usize, leaf: LeafId| {
            if leaf.index() >= leaf_count {
                Err(LevelError::UnknownLeaf { kind, index, leaf, leaf_count })
            } else {
                Ok(())
            }
        };
        for (index, probe) in self.probes.iter().enumerate() {
            check("probe", index, probe.leaf)?;
            if !probe.position.is_finite() {
                return Err(LevelError::NonFinite("probe"));
            }
        }
        for (index, light) in self.lights.iter().enumerate() {
            check("light", index, light.leaf)?;
            if !light.position.is_finite() {
                return Err(LevelError::NonFinite("light"));
            }
        }
        for (index, cubemap) in self.cubemaps.iter().enumerate() {
            check("cubemap", index, cubemap.leaf)?;
            if !cubemap.position.is_finite() {
                return Err(LevelError::NonFinite("cubemap"));
            }
        }
        Ok(())
    }

    pub fn add_probe(&mut self, leaf: LeafId, position: Vec3, cube: AmbientCube) -> ProbeId {
        let id = ProbeId(self.probes.len() as u32);
        self.probes.push(AmbientProbe { id, leaf, position, cube, visibility_marker: None });
        id
    }

    pub fn add_light(&mut self, leaf: LeafId, kind: LightKind, position: Vec3, color: Vec3) -> LightId {
        let id = LightId(self.lights.len() as u32);
        self.lights.push(Light::new(id, leaf, kind, position, color));
        if kind == LightKind::Sun && self.sunlight.is_none() {
            self.sunlight = Some(id);
        }
        id
    }

    pub fn add_cubemap(&mut self, leaf: LeafId, position: Vec3, texture: CubemapTexture) -> CubemapId {
        let id = CubemapId(self.cubemaps.len() as u32);
        self.cubemaps.push(Cubemap { id, leaf, position, texture });
        id
    }

    pub fn attach_probe_marker(&mut self, probe: ProbeId, marker: VisibilityMarker) -> bool {
        match self.probes.get_mut(probe.0 as usize) {
            Some(entry) => {
                entry.visibility_marker = Some(marker);
                true
            }
            None => false,
        }
    }

    pub fn probes(&self) -> &[AmbientProbe] {
        &self.probes
    }

    pub fn probe(&self, id: ProbeId) -> Option<&AmbientProbe> {
        self.probes.get(id.0 as usize)
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(id.index())
    }

    pub(crate) fn lights_mut(&mut self) -> &mut [Light] {
        &mut self.lights
    }

    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(id.index())
    }

    pub fn cubemaps(&self) -> &[Cubemap] {
        &self.cubemaps
    }

    pub fn cubemap(&self, id: CubemapId) -> Option<&Cubemap> {
        self.cubemaps.get(id.0 as usize)
    }

    pub fn sunlight(&self) -> Option<LightId> {
        self.sunlight
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty() && self.lights.is_empty() && self.cubemaps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::{LightData, ProbeData, Vec3Data};

    #[test]
    fn from_baked_rejects_unknown_leaves() {
        let baked = BakedLighting {
            probes: vec![ProbeData { leaf: LeafId(3), position: Vec3Data::default(), cube: [Vec3Data::default(); 6] }],
            ..Default::default()
        };
        let err = LightingRegistry::from_baked(&baked, 2).expect_err("leaf 3 is out of range");
        assert!(matches!(err, LevelError::UnknownLeaf { kind: "probe", index: 0, .. }));
    }

    #[test]
    fn first_sun_becomes_sunlight() {
        let baked = BakedLighting {
            lights: vec![
                LightData {
                    leaf: LeafId(0),
                    kind: LightKind::Point,
                    position: Vec3Data::default(),
                    direction: Vec3Data::default(),
                    color: Vec3Data { x: 1.0, y: 1.0, z: 1.0 },
                    falloff: [0.0, 0.0, 1.0, 0.0],
                    falloff2: [0.0; 4],
                    falloff3: [0.0; 4],
                },
                LightData {
                    leaf: LeafId(0),
                    kind: LightKind::Sun,
                    position: Vec3Data::default(),
                    direction: Vec3Data { x: 0.0, y: -1.0, z: 0.0 },
                    color: Vec3Data { x: 1.0, y: 1.0, z: 1.0 },
                    falloff: [0.0; 4],
                    falloff2: [0.0; 4],
                    falloff3: [0.0; 4],
                },
            ],
            ..Default::default()
        };
        let registry = LightingRegistry::from_baked(&baked, 1).expect("valid");
        assert_eq!(registry.sunlight(), Some(LightId(1)));
        assert_eq!(registry.light(LightId(1)).map(|l| l.direction), Some(Vec3::NEG_Y));
        assert_eq!(registry.light(LightId(0)).map(|l| l.direction), Some(Vec3::NEG_Z));
    }

    #[test]
    fn markers_hide_probes_once_owner_drops() {
        let mut registry = LightingRegistry::new();
        let id = registry.add_probe(LeafId(0), Vec3::ZERO, AmbientCube::ZERO);
        let owner = Arc::new(42u32);
        assert!(registry.attach_probe_marker(id, VisibilityMarker::new(&owner)));
        assert!(registry.probe(id).is_some_and(AmbientProbe::is_visible));
        drop(owner);
        assert!(!registry.probe(id).is_some_and(AmbientProbe::is_visible));
    }
}
