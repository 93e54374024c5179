use anyhow::{Context, Result};
use glam::Vec3;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::ambient::SmoothingCurve;

/// Tunables for probe resolution, light fading and cache upkeep.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub smoothing: SmoothingCurve,
    /// Multiplier applied after smoothing. 1.0 disables boosting.
    #[serde(default = "ProbeConfig::default_ambient_boost")]
    pub ambient_boost: f32,
    /// Ambient used when no probe applies.
    #[serde(default = "ProbeConfig::default_ambient")]
    pub default_ambient: [f32; 3],
    #[serde(default = "ProbeConfig::default_min_light_intensity")]
    pub min_light_intensity: f32,
    /// Lights below `min_light_intensity` but above this keep a fading slot.
    #[serde(default = "ProbeConfig::default_fade_light_intensity")]
    pub fade_light_intensity: f32,
    /// Fade weight change per second.
    #[serde(default = "ProbeConfig::default_light_fade_rate")]
    pub light_fade_rate: f32,
    #[serde(default = "ProbeConfig::default_occlusion_recheck_interval")]
    pub occlusion_recheck_interval: f32,
    #[serde(default = "ProbeConfig::default_gc_interval")]
    pub gc_interval: f64,
    #[serde(default = "ProbeConfig::default_gc_idle_threshold")]
    pub gc_idle_threshold: f64,
    #[serde(default = "ProbeConfig::default_transform_quantize")]
    pub transform_quantize: f32,
    #[serde(default = "ProbeConfig::default_probe_fallback_candidates")]
    pub probe_fallback_candidates: usize,
}

impl ProbeConfig {
    const fn default_ambient_boost() -> f32 {
        1.0
    }

    const fn default_ambient() -> [f32; 3] {
        [0.05, 0.05, 0.05]
    }

    const fn default_min_light_intensity() -> f32 {
        0.001
    }

    const fn default_fade_light_intensity() -> f32 {
        0.0001
    }

    const fn default_light_fade_rate() -> f32 {
        4.0
    }

    const fn default_occlusion_recheck_interval() -> f32 {
        0.25
    }

    const fn default_gc_interval() -> f64 {
        5.0
    }

    const fn default_gc_idle_threshold() -> f64 {
        10.0
    }

    const fn default_transform_quantize() -> f32 {
        1e-4
    }

    const fn default_probe_fallback_candidates() -> usize {
        4
    }

    pub fn default_ambient_color(&self) -> Vec3 {
        Vec3::from_array(self.default_ambient)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read probe config {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse probe config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("[probes] config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            smoothing: SmoothingCurve::default(),
            ambient_boost: Self::default_ambient_boost(),
            default_ambient: Self::default_ambient(),
            min_light_intensity: Self::default_min_light_intensity(),
            fade_light_intensity: Self::default_fade_light_intensity(),
            light_fade_rate: Self::default_light_fade_rate(),
            occlusion_recheck_interval: Self::default_occlusion_recheck_interval(),
            gc_interval: Self::default_gc_interval(),
            gc_idle_threshold: Self::default_gc_idle_threshold(),
            transform_quantize: Self::default_transform_quantize(),
            probe_fallback_candidates: Self::default_probe_fallback_candidates(),
        }
    }
}
