//! Per-object ambient probe, local light and cubemap resolution.
//!
//! Frame order: [`AmbientProbeManager::xform_lights`] once, then any number of
//! [`AmbientProbeManager::update_node`] calls, possibly from several threads. The light pass
//! takes `&mut self`, so it cannot overlap resolution.

mod resolve;
mod state;

pub use state::{LightSlot, LightSlots, LightingState, ObjectId};

use anyhow::{Context, Result};
use glam::Mat4;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::bake::BakedLighting;
use crate::config::ProbeConfig;
use crate::error::{Degradation, LevelError};
use crate::level::LevelVisibility;
use crate::material::MaterialLighting;
use crate::pvs::{LeafIndices, PvsStats};
use crate::registry::LightingRegistry;
use crate::render_state::LightingRenderState;

/// One resolution request.
#[derive(Debug, Clone, Copy)]
pub struct NodeUpdate {
    pub object: ObjectId,
    pub transform: Mat4,
    pub material: MaterialLighting,
    /// When false, a previously composed state is returned even if the object moved.
    pub should_update: bool,
}

impl NodeUpdate {
    pub fn new(object: ObjectId, transform: Mat4) -> Self {
        Self { object, transform, material: MaterialLighting::default(), should_update: true }
    }

    pub fn with_material(mut self, material: MaterialLighting) -> Self {
        self.material = material;
        self
    }

    pub fn with_should_update(mut self, should_update: bool) -> Self {
        self.should_update = should_update;
        self
    }
}

/// Result of [`AmbientProbeManager::update_node`].
#[derive(Debug, Clone)]
pub struct NodeLighting {
    pub state: Arc<LightingRenderState>,
    /// False when the cached state was reused without requerying probes, lights or cubemaps.
    pub recomputed: bool,
    pub degradation: Degradation,
}

#[derive(Default)]
struct ProbeCounters {
    cache_hits: AtomicU64,
    recomputes: AtomicU64,
    stale_resets: AtomicU64,
    invalid_leaf: AtomicU64,
    missing_data: AtomicU64,
    evictions: AtomicU64,
}

impl ProbeCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_degradation(&self, degradation: Degradation) {
        if degradation.contains(Degradation::INVALID_LEAF) {
            Self::bump(&self.invalid_leaf);
        }
        if degradation.contains(Degradation::MISSING_DATA) {
            Self::bump(&self.missing_data);
        }
        if degradation.contains(Degradation::STALE_CACHE) {
            Self::bump(&self.stale_resets);
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct ProbeMetrics {
    pub generation: u64,
    pub frame: u64,
    pub probes: usize,
    pub lights: usize,
    pub cubemaps: usize,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub recomputes: u64,
    pub stale_resets: u64,
    pub invalid_leaf: u64,
    pub missing_data: u64,
    pub evictions: u64,
    pub pvs: PvsStats,
}

#[derive(Clone, Copy, Debug, Default)]
struct FrameStamp {
    time: f64,
    index: u64,
}

type CacheEntry = Arc<Mutex<LightingState>>;

pub struct AmbientProbeManager {
    config: ProbeConfig,
    level: Option<Arc<dyn LevelVisibility>>,
    registry: LightingRegistry,
    indices: LeafIndices,
    processed: bool,
    generation: u64,
    frame: FrameStamp,
    eye_revision: u64,
    last_view: Option<Mat4>,
    last_garbage_collect: f64,
    cache: Mutex<HashMap<ObjectId, CacheEntry>>,
    counters: ProbeCounters,
}

impl AmbientProbeManager {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            level: None,
            registry: LightingRegistry::new(),
            indices: LeafIndices::default(),
            processed: false,
            generation: 0,
            frame: FrameStamp::default(),
            eye_revision: 0,
            last_view: None,
            last_garbage_collect: 0.0,
            cache: Mutex::new(HashMap::new()),
            counters: ProbeCounters::default(),
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Replaces the current level. Call [`Self::process_ambient_probes`] before resolving.
    pub fn load_level(&mut self, level: Arc<dyn LevelVisibility>, baked: &BakedLighting) -> Result<()> {
        if level.leaf_count() == 0 {
            return Err(LevelError::EmptyLevel).context("Loading level lighting");
        }
        let registry = LightingRegistry::from_baked(baked, level.leaf_count())
            .context("Loading baked lighting")?;
        self.install(level, registry);
        Ok(())
    }

    /// Like [`Self::load_level`] for a registry assembled in code.
    pub fn load_registry(&mut self, level: Arc<dyn LevelVisibility>, registry: LightingRegistry) -> Result<()> {
        if level.leaf_count() == 0 {
            return Err(LevelError::EmptyLevel).context("Loading level lighting");
        }
        registry.validate(level.leaf_count()).context("Validating lighting registry")?;
        self.install(level, registry);
        Ok(())
    }

    fn install(&mut self, level: Arc<dyn LevelVisibility>, registry: LightingRegistry) {
        self.level = Some(level);
        self.registry = registry;
        self.indices = LeafIndices::default();
        self.processed = false;
        self.last_view = None;
    }

    /// Builds the per-leaf probe trees, light PVS lists and the cubemap tree, then advances the
    /// level generation so cached object states from before are rebuilt.
    pub fn process_ambient_probes(&mut self) -> Result<PvsStats> {
        let level = self.level.clone().ok_or(LevelError::NoLevel).context("Processing ambient probes")?;
        self.indices = LeafIndices::build(&self.registry, level.as_ref());
        self.processed = true;
        self.generation = self.generation.wrapping_add(1);
        self.last_view = None;

        let stats = self.indices.stats();
        log::info!(
            "[probes] processed {} probe(s), {} light(s), {} cubemap(s) across {} leaves ({} with probes, {} light assignments)",
            self.registry.probes().len(),
            self.registry.lights().len(),
            self.registry.cubemaps().len(),
            stats.leaves,
            stats.leaves_with_probes,
            stats.light_assignments
        );
        if self.registry.probes().is_empty() {
            log::warn!("[probes] level has no ambient probes; objects will use the default ambient");
        } else if stats.leaves_with_probes < stats.leaves {
            log::warn!(
                "[probes] {} of {} leaves have no probes and will borrow from visible neighbours",
                stats.leaves - stats.leaves_with_probes,
                stats.leaves
            );
        }
        Ok(stats)
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn registry(&self) -> &LightingRegistry {
        &self.registry
    }

    /// Mutable access for attaching visibility markers. Changes after processing require
    /// another [`Self::process_ambient_probes`].
    pub fn registry_mut(&mut self) -> &mut LightingRegistry {
        self.processed = false;
        &mut self.registry
    }

    pub fn indices(&self) -> &LeafIndices {
        &self.indices
    }

    pub fn level(&self) -> Option<&Arc<dyn LevelVisibility>> {
        self.level.as_ref()
    }

    pub fn sunlight(&self) -> Option<crate::light::LightId> {
        self.registry.sunlight()
    }

    /// Per-frame light pass: moves every light into the camera's space and stamps the frame.
    /// Must run once per frame before the frame's resolver output is consumed.
    pub fn xform_lights(&mut self, view: &Mat4, now: f64) {
        self.frame.index = self.frame.index.wrapping_add(1);
        self.frame.time = now;
        for light in self.registry.lights_mut() {
            light.xform(view);
        }
        if self.last_view != Some(*view) {
            self.last_view = Some(*view);
            self.eye_revision = self.eye_revision.wrapping_add(1);
        }
        if now - self.last_garbage_collect >= self.config.gc_interval {
            self.collect_garbage(now);
        }
    }

    pub fn frame_index(&self) -> u64 {
        self.frame.index
    }

    pub fn frame_time(&self) -> f64 {
        self.frame.time
    }

    /// Evicts cache entries idle for longer than the configured threshold. Entries touched in the
    /// current or previous frame, and entries currently being resolved, always survive.
    pub fn collect_garbage(&mut self, now: f64) -> usize {
        self.last_garbage_collect = now;
        let idle = self.config.gc_idle_threshold;
        let frame = self.frame.index;
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|_, entry| {
            if Arc::strong_count(entry) > 1 {
                return true;
            }
            let Some(state) = entry.try_lock() else {
                return true;
            };
            let recent_frame = frame.saturating_sub(state.last_access_frame) <= 1;
            recent_frame || now - state.last_access <= idle
        });
        let evicted = before - cache.len();
        if evicted > 0 {
            self.counters.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            log::debug!("[probes] garbage collected {evicted} idle lighting state(s)");
        }
        evicted
    }

    /// Drops the cached state of a destroyed object.
    pub fn forget_node(&self, object: ObjectId) -> bool {
        self.cache.lock().remove(&object).is_some()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Copy of an object's cached state, mostly for inspection.
    pub fn node_state(&self, object: ObjectId) -> Option<LightingState> {
        let entry = self.cache.lock().get(&object).cloned()?;
        let state = entry.lock().clone();
        Some(state)
    }

    fn entry(&self, object: ObjectId) -> CacheEntry {
        let mut cache = self.cache.lock();
        let generation = self.generation;
        Arc::clone(cache.entry(object).or_insert_with(|| Arc::new(Mutex::new(LightingState::new(generation)))))
    }

    /// Level teardown: releases the registry, indices and every cached object state.
    pub fn cleanup(&mut self) {
        self.cache.lock().clear();
        self.registry = LightingRegistry::new();
        self.indices = LeafIndices::default();
        self.level = None;
        self.processed = false;
        self.last_view = None;
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn metrics(&self) -> ProbeMetrics {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        ProbeMetrics {
            generation: self.generation,
            frame: self.frame.index,
            probes: self.registry.probes().len(),
            lights: self.registry.lights().len(),
            cubemaps: self.registry.cubemaps().len(),
            cache_entries: self.cache_len(),
            cache_hits: load(&self.counters.cache_hits),
            recomputes: load(&self.counters.recomputes),
            stale_resets: load(&self.counters.stale_resets),
            invalid_leaf: load(&self.counters.invalid_leaf),
            missing_data: load(&self.counters.missing_data),
            evictions: load(&self.counters.evictions),
            pvs: self.indices.stats(),
        }
    }
}

impl Default for AmbientProbeManager {
    fn default() -> Self {
        Self::new(ProbeConfig::default())
    }
}

/// Cache key for a transform. Quantized in `f64` into `i64` so far-away objects keep distinct keys.
pub(crate) fn quantize_matrix(mat: &Mat4, step: f32) -> [i64; 16] {
    let step = if step > 0.0 { f64::from(step) } else { f64::from(f32::EPSILON) };
    let mut key = [0i64; 16];
    let cols = mat.to_cols_array();
    for (dst, value) in key.iter_mut().zip(cols.iter()) {
        *dst = (f64::from(*value) / step).round() as i64;
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn quantized_keys_stay_distinct_far_from_origin() {
        let a = quantize_matrix(&Mat4::from_translation(Vec3::new(300_000.0, 0.0, 0.0)), 1e-4);
        let b = quantize_matrix(&Mat4::from_translation(Vec3::new(400_000.0, 0.0, 0.0)), 1e-4);
        assert_ne!(a, b);
        assert_eq!(a, quantize_matrix(&Mat4::from_translation(Vec3::new(300_000.0, 0.0, 0.0)), 1e-4));
    }
}
