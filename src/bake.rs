use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::level::LeafId;
use crate::light::LightKind;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3Data {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeData {
    pub leaf: LeafId,
    pub position: Vec3Data,
    /// +X, -X, +Y, -Y, +Z, -Z irradiance.
    pub cube: [Vec3Data; 6],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightData {
    pub leaf: LeafId,
    pub kind: LightKind,
    pub position: Vec3Data,
    #[serde(default)]
    pub direction: Vec3Data,
    pub color: Vec3Data,
    #[serde(default = "LightData::default_falloff")]
    pub falloff: [f32; 4],
    #[serde(default)]
    pub falloff2: [f32; 4],
    #[serde(default)]
    pub falloff3: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CubemapData {
    pub leaf: LeafId,
    pub position: Vec3Data,
    pub texture: String,
    /// Captured at runtime rather than baked with the level.
    #[serde(default)]
    pub captured: bool,
}

/// Everything the level bake produced for indirect lighting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BakedLighting {
    #[serde(default)]
    pub probes: Vec<ProbeData>,
    #[serde(default)]
    pub lights: Vec<LightData>,
    #[serde(default)]
    pub cubemaps: Vec<CubemapData>,
}

impl LightData {
    /// Pure inverse-square falloff.
    const fn default_falloff() -> [f32; 4] {
        [0.0, 0.0, 1.0, 0.0]
    }
}

impl BakedLighting {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Reading baked lighting {}", path.display()))?;
        let baked = serde_json::from_slice::<BakedLighting>(&bytes)
            .with_context(|| format!("Parsing baked lighting {}", path.display()))?;
        Ok(baked)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating baked lighting directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json.as_bytes())
            .with_context(|| format!("Writing baked lighting {}", path.display()))?;
        Ok(())
    }

    #[cfg(feature = "binary_level")]
    pub fn load_binary(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Reading baked lighting {}", path.display()))?;
        let payload = lz4_flex::decompress_size_prepended(&bytes)
            .with_context(|| format!("Decompressing baked lighting {}", path.display()))?;
        let baked = bincode::deserialize(&payload)
            .with_context(|| format!("Decoding baked lighting {}", path.display()))?;
        Ok(baked)
    }

    #[cfg(feature = "binary_level")]
    pub fn save_binary(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating baked lighting directory {}", parent.display()))?;
        }
        let payload = bincode::serialize(self).context("Encoding baked lighting")?;
        let compressed = lz4_flex::compress_prepend_size(&payload);
        fs::write(path, compressed).with_context(|| format!("Writing baked lighting {}", path.display()))?;
        Ok(())
    }
}

impl From<glam::Vec3> for Vec3Data {
    fn from(value: glam::Vec3) -> Self {
        Self { x: value.x, y: value.y, z: value.z }
    }
}

impl From<Vec3Data> for glam::Vec3 {
    fn from(value: Vec3Data) -> Self {
        glam::Vec3::new(value.x, value.y, value.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn light_falloff_defaults_to_inverse_square() {
        let json = r#"{
            "lights": [
                { "leaf": 0, "kind": "point", "position": {"x": 1.0, "y": 2.0, "z": 3.0},
                  "color": {"x": 1.0, "y": 1.0, "z": 1.0} }
            ]
        }"#;
        let baked: BakedLighting = serde_json::from_str(json).expect("parse");
        assert!(baked.probes.is_empty());
        assert_eq!(baked.lights[0].falloff, [0.0, 0.0, 1.0, 0.0]);
        assert_eq!(baked.lights[0].kind, LightKind::Point);
    }

    #[test]
    fn json_save_and_load_keep_cubemaps() {
        let baked = BakedLighting {
            cubemaps: vec![CubemapData {
                leaf: LeafId(2),
                position: Vec3Data { x: 4.0, y: 0.5, z: -1.0 },
                texture: "materials/maps/cube_lobby".to_string(),
                captured: false,
            }],
            ..Default::default()
        };
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("lighting/level.json");
        baked.save_to_path(&path).expect("save");
        let loaded = BakedLighting::load_from_path(&path).expect("load");
        assert_eq!(loaded.cubemaps.len(), 1);
        assert_eq!(loaded.cubemaps[0].leaf, LeafId(2));
        assert_eq!(loaded.cubemaps[0].texture, "materials/maps/cube_lobby");
    }
}
