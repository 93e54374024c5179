//! The slice of material state the lighting resolver needs: which texture-stage roles are bound
//! and whether the environment cubemap should come from the nearest cubemap probe.

use bitflags::bitflags;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StageRoles: u16 {
        const BASE_TEXTURE = 1 << 0;
        const LIGHTMAP = 1 << 1;
        const BUMPED_LIGHTMAP = 1 << 2;
        const ENV_CUBEMAP = 1 << 3;
        const NORMAL_MAP = 1 << 4;
        const GLOSS_MAP = 1 << 5;
        const GLOW_MAP = 1 << 6;
        const HEIGHT_MAP = 1 << 7;
        const SPHERE_MAP = 1 << 8;
    }
}

impl StageRoles {
    pub fn is_lightmapped(self) -> bool {
        self.intersects(StageRoles::LIGHTMAP | StageRoles::BUMPED_LIGHTMAP)
    }
}

/// A named texture stage, optionally bound to a UV set.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TextureStage {
    pub name: String,
    pub uv_set: Option<String>,
    pub role: StageRoles,
}

/// Get-or-create pool of texture stages. One pool lives per loaded level.
#[derive(Default)]
pub struct StagePool {
    stages: Mutex<HashMap<String, Arc<TextureStage>>>,
}

impl StagePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stage named `name`, creating it on first use. The first caller fixes the UV set.
    pub fn get(&self, name: &str, uv_set: Option<&str>) -> Arc<TextureStage> {
        let mut stages = self.stages.lock();
        if let Some(stage) = stages.get(name) {
            return Arc::clone(stage);
        }
        let stage = Arc::new(TextureStage {
            name: name.to_string(),
            uv_set: uv_set.map(str::to_string),
            role: role_for_stage(name),
        });
        stages.insert(name.to_string(), Arc::clone(&stage));
        stage
    }

    pub fn base_texture(&self) -> Arc<TextureStage> {
        self.get("basetexture", Some("basetexture"))
    }

    pub fn lightmap(&self) -> Arc<TextureStage> {
        self.get("lightmap", Some("lightmap"))
    }

    pub fn bumped_lightmap(&self) -> Arc<TextureStage> {
        self.get("lightmap_bumped", Some("lightmap"))
    }

    pub fn cubemap(&self) -> Arc<TextureStage> {
        self.get("cubemap_tex", None)
    }

    pub fn len(&self) -> usize {
        self.stages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.stages.lock().clear();
    }
}

fn role_for_stage(name: &str) -> StageRoles {
    match name {
        "basetexture" => StageRoles::BASE_TEXTURE,
        "lightmap" => StageRoles::LIGHTMAP,
        "lightmap_bumped" => StageRoles::BUMPED_LIGHTMAP,
        "cubemap_tex" => StageRoles::ENV_CUBEMAP,
        "normalmap" => StageRoles::NORMAL_MAP,
        "glossmap" => StageRoles::GLOSS_MAP,
        "glowmap" => StageRoles::GLOW_MAP,
        "heightmap" => StageRoles::HEIGHT_MAP,
        "spheremap" => StageRoles::SPHERE_MAP,
        _ => StageRoles::empty(),
    }
}

/// Per-object material facts consumed by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaterialLighting {
    /// Roles bound on the object's render state before lighting inputs are added.
    pub stages: StageRoles,
    /// Material asks for the level's nearest environment cubemap.
    pub wants_env_cubemap: bool,
    /// Material ships its own environment texture.
    pub own_envmap: bool,
}

impl MaterialLighting {
    pub fn from_stages<'a, I>(stages: I) -> Self
    where
        I: IntoIterator<Item = &'a TextureStage>,
    {
        let roles = stages.into_iter().fold(StageRoles::empty(), |acc, stage| acc | stage.role);
        Self { stages: roles, ..Self::default() }
    }

    /// Reads the `$envmap` key: `env_cubemap` selects the nearest probe cubemap, anything else
    /// names a texture the material binds itself.
    pub fn with_keyvalues<'a, I>(mut self, keyvalues: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in keyvalues {
            if key.eq_ignore_ascii_case("$envmap") {
                let value = value.trim();
                self.wants_env_cubemap = value.eq_ignore_ascii_case("env_cubemap");
                self.own_envmap = !value.is_empty() && !self.wants_env_cubemap;
            }
        }
        self
    }

    pub fn injects_cubemap(&self) -> bool {
        self.wants_env_cubemap && !self.own_envmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_reuses_stages_by_name() {
        let pool = StagePool::new();
        let a = pool.lightmap();
        let b = pool.get("lightmap", Some("other_uv"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.uv_set.as_deref(), Some("lightmap"));
        assert_eq!(pool.bumped_lightmap().uv_set.as_deref(), Some("lightmap"));
        assert_eq!(pool.len(), 2);
        pool.clear();
        assert!(pool.is_empty());
    }

    #[test]
    fn env_cubemap_keyvalue_requests_injection() {
        let pool = StagePool::new();
        let lightmap = pool.lightmap();
        let material = MaterialLighting::from_stages([lightmap.as_ref()])
            .with_keyvalues([("$basetexture", "brick"), ("$envmap", "env_cubemap")]);
        assert!(material.stages.is_lightmapped());
        assert!(material.injects_cubemap());

        let own = MaterialLighting::default().with_keyvalues([("$envmap", "maps/chrome")]);
        assert!(!own.injects_cubemap());
        assert!(own.own_envmap);
        assert!(!MaterialLighting::default().injects_cubemap());
    }
}
