use bit_vec::BitVec;
use glam::Vec3;
use rayon::prelude::*;
use smallvec::SmallVec;
use std::sync::Arc;

use super::state::{LightSlot, LightingState};
use super::{quantize_matrix, AmbientProbeManager, NodeLighting, NodeUpdate, ProbeCounters};
use crate::ambient::{smooth_ambient, AmbientCube};
use crate::error::Degradation;
use crate::level::{LeafId, LevelVisibility};
use crate::light::LightId;
use crate::material::StageRoles;
use crate::registry::{AmbientProbe, ProbeId};
use crate::render_state::{LightingRenderState, MAX_ACTIVE_LIGHTS, MAX_TOTAL_LIGHTS};

#[derive(Clone, Copy, Debug)]
struct LightCandidate {
    light: LightId,
    distance: f32,
    intensity: f32,
}

impl AmbientProbeManager {
    /// Resolves lighting for one object and returns its composed render state.
    ///
    /// Objects whose transform and material match the previous call skip every probe, light and
    /// cubemap query. Their ambient blend and light fades keep advancing toward the cached
    /// targets, and once both have settled the identical cached state comes back.
    pub fn update_node(&self, update: &NodeUpdate) -> NodeLighting {
        let entry = self.entry(update.object);
        let mut state = entry.lock();
        let now = self.frame.time;
        let mut degradation = Degradation::empty();
        if state.generation != self.generation {
            state.reset(self.generation);
            degradation |= Degradation::STALE_CACHE;
        }
        state.touch(now, self.frame.index);

        let key = quantize_matrix(&update.transform, self.config.transform_quantize);
        if let Some(composed) = state.composed.clone() {
            let unchanged = state.transform_key == Some(key) && state.material == update.material;
            if unchanged || !update.should_update {
                let stepped = self.settle(&mut state, now);
                let composed = if stepped || state.eye_revision != self.eye_revision {
                    self.repack(&mut state)
                } else {
                    composed
                };
                ProbeCounters::bump(&self.counters.cache_hits);
                return NodeLighting { state: composed, recomputed: false, degradation: state.degradation };
            }
        }

        degradation |= self.resolve(&mut state, update, now);
        state.transform = Some(update.transform);
        state.transform_key = Some(key);
        state.material = update.material;
        state.degradation = degradation;
        let composed = self.compose(&mut state);
        ProbeCounters::bump(&self.counters.recomputes);
        self.counters.record_degradation(degradation);
        NodeLighting { state: composed, recomputed: true, degradation }
    }

    /// Resolves a batch of objects across the rayon pool.
    pub fn update_nodes(&self, updates: &[NodeUpdate]) -> Vec<NodeLighting> {
        updates.par_iter().map(|update| self.update_node(update)).collect()
    }

    /// Steps smoothing and fades of a cached state without requerying. Returns true if anything moved.
    fn settle(&self, state: &mut LightingState, now: f64) -> bool {
        let Some(last) = state.lighting_time else {
            return false;
        };
        let dt = (now - last).max(0.0) as f32;
        let settled = state.ambient_unboosted == state.ambient_target && state.slots.is_settled();
        if settled || dt <= 0.0 {
            return false;
        }
        let smoothed = smooth_ambient(
            Some(&state.ambient_unboosted),
            &state.ambient_target,
            dt,
            self.config.smoothing,
            self.config.ambient_boost,
        );
        state.ambient_unboosted = smoothed.unboosted;
        state.ambient_boosted = smoothed.boosted;
        state.slots.advance(self.config.light_fade_rate.max(0.0) * dt);
        state.lighting_time = Some(now);
        true
    }

    fn resolve(&self, state: &mut LightingState, update: &NodeUpdate, now: f64) -> Degradation {
        let mut degradation = Degradation::empty();
        let position = update.transform.w_axis.truncate();
        let level = if self.processed { self.level.as_deref() } else { None };
        let located = level.and_then(|level| level.leaf_for_point(position).map(|leaf| (level, leaf)));
        let first = state.lighting_time.is_none();
        let dt = state.lighting_time.map_or(0.0, |last| (now - last).max(0.0) as f32);

        let default_ambient = AmbientCube::splat(self.config.default_ambient_color());
        let target = match located {
            Some((level, leaf)) => match self.find_probe(level, leaf, position) {
                Some((probe, from_neighbor)) => {
                    if from_neighbor {
                        degradation |= Degradation::NEIGHBOR_PROBE;
                    }
                    state.probe = Some(probe);
                    self.registry.probe(probe).map_or(default_ambient, |probe| probe.cube)
                }
                None => {
                    degradation |= Degradation::MISSING_DATA;
                    state.probe = None;
                    default_ambient
                }
            },
            None => {
                degradation |= Degradation::INVALID_LEAF;
                state.probe = None;
                default_ambient
            }
        };
        let previous = if first { None } else { Some(state.ambient_unboosted) };
        let smoothed =
            smooth_ambient(previous.as_ref(), &target, dt, self.config.smoothing, self.config.ambient_boost);
        state.ambient_unboosted = smoothed.unboosted;
        state.ambient_boosted = smoothed.boosted;
        state.ambient_target = target;

        match located {
            Some((level, leaf)) => self.select_lights(state, level, leaf, position, now, dt),
            None => state.slots.clear(),
        }

        let cubemap = self.indices.cubemap_tree().nearest(position).copied();
        if cubemap.is_none() && update.material.injects_cubemap() {
            degradation |= Degradation::MISSING_DATA;
        }
        state.cubemap_changed = cubemap != state.cubemap;
        state.cubemap = cubemap;
        state.leaf = located.map(|(_, leaf)| leaf);
        state.lighting_time = Some(now);
        degradation
    }

    /// Nearest live probe in `leaf`, else the nearest one among the leaves visible from it.
    /// The flag is true when the probe came from a neighbouring leaf.
    fn find_probe(&self, level: &dyn LevelVisibility, leaf: LeafId, position: Vec3) -> Option<(ProbeId, bool)> {
        let width = self.config.probe_fallback_candidates.max(1);
        if let Some((probe, _)) = self.nearest_visible_probe(leaf, position, width) {
            return Some((probe, false));
        }
        let mut best: Option<(f32, ProbeId)> = None;
        for &neighbor in level.visible_leaves(leaf) {
            if neighbor == leaf {
                continue;
            }
            let Some((probe, distance_sq)) = self.nearest_visible_probe(neighbor, position, width) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((best_sq, best_id)) => distance_sq < best_sq || (distance_sq == best_sq && probe < best_id),
            };
            if better {
                best = Some((distance_sq, probe));
            }
        }
        best.map(|(_, probe)| (probe, true))
    }

    fn nearest_visible_probe(&self, leaf: LeafId, position: Vec3, width: usize) -> Option<(ProbeId, f32)> {
        let tree = self.indices.probe_tree(leaf)?;
        let live = |count: usize| {
            tree.neighbors(position, count)
                .into_iter()
                .find(|hit| self.registry.probe(*hit.payload).is_some_and(AmbientProbe::is_visible))
                .map(|hit| (*hit.payload, hit.distance_sq))
        };
        // Hidden markers can crowd the first candidates; fall back to the whole leaf.
        live(width).or_else(|| if tree.len() > width { live(tree.len()) } else { None })
    }

    fn select_lights(
        &self,
        state: &mut LightingState,
        level: &dyn LevelVisibility,
        leaf: LeafId,
        position: Vec3,
        now: f64,
        dt: f32,
    ) {
        let first = state.lighting_time.is_none();
        let light_total = self.registry.lights().len();
        let mut recheck = first
            || state
                .occlusion_checked_at
                .map_or(true, |checked| now - checked >= self.config.occlusion_recheck_interval as f64);
        if state.occluded.len() != light_total {
            state.occluded = BitVec::from_elem(light_total, false);
            recheck = true;
        }

        let mut candidates: SmallVec<[LightCandidate; 16]> = SmallVec::new();
        for &id in self.indices.light_pvs(leaf) {
            let Some(light) = self.registry.light(id) else {
                continue;
            };
            if recheck {
                let visible = if light.is_sun() {
                    level.sky_visible(position)
                } else {
                    level.line_of_sight(position, light.position)
                };
                state.occluded.set(id.index(), !visible);
            }
            if state.is_occluded(id) {
                continue;
            }
            let intensity = light.intensity_at(position);
            if intensity < self.config.fade_light_intensity {
                continue;
            }
            candidates.push(LightCandidate { light: id, distance: light.rank_distance(position), intensity });
        }
        if recheck {
            state.occlusion_checked_at = Some(now);
        }
        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.light.cmp(&b.light)));

        let active: SmallVec<[LightId; MAX_ACTIVE_LIGHTS]> = candidates
            .iter()
            .filter(|candidate| candidate.intensity >= self.config.min_light_intensity)
            .take(MAX_ACTIVE_LIGHTS)
            .map(|candidate| candidate.light)
            .collect();

        let step = if first { f32::INFINITY } else { self.config.light_fade_rate.max(0.0) * dt };
        let mut next: SmallVec<[LightSlot; MAX_TOTAL_LIGHTS]> = SmallVec::new();
        for &light in &active {
            let fade = state.slots.find(light).map_or(0.0, |slot| slot.fade);
            let mut slot = LightSlot { light, fade, target: 1.0 };
            slot.step(step);
            next.push(slot);
        }

        // Former active lights keep a slot while they fade out, as long as they still reach the
        // object or are merely occluded.
        let mut leaving: SmallVec<[LightSlot; MAX_TOTAL_LIGHTS]> = state
            .slots
            .iter()
            .filter(|slot| !active.contains(&slot.light))
            .filter(|slot| {
                state.is_occluded(slot.light) || candidates.iter().any(|candidate| candidate.light == slot.light)
            })
            .map(|slot| {
                let mut slot = LightSlot { target: 0.0, ..*slot };
                slot.step(step);
                slot
            })
            .filter(|slot| slot.fade > 0.0)
            .collect();
        leaving.sort_by(|a, b| b.fade.total_cmp(&a.fade).then(a.light.cmp(&b.light)));
        next.extend(leaving.into_iter().take(MAX_TOTAL_LIGHTS - next.len()));
        state.slots.replace(next);
    }

    fn compose(&self, state: &mut LightingState) -> Arc<LightingRenderState> {
        let mut out = LightingRenderState::unlit(state.ambient_boosted);
        let mut count = 0;
        for slot in state.slots.iter().take(MAX_TOTAL_LIGHTS) {
            let Some(light) = self.registry.light(slot.light) else {
                continue;
            };
            let (first, second) = light.pack(slot.fade);
            out.light_types[count] = light.kind.gpu_code();
            out.light_data[count] = first;
            out.light_data2[count] = second;
            out.light_ids[count] = light.id.0 as i32;
            if slot.is_active() {
                out.active_lights += 1;
            }
            count += 1;
        }
        out.light_count = count;
        out.stages = state.material.stages;
        if state.material.injects_cubemap() {
            out.cubemap = state.cubemap.and_then(|id| self.registry.cubemap(id)).map(|cubemap| cubemap.texture.clone());
            if out.cubemap.is_some() {
                out.stages |= StageRoles::ENV_CUBEMAP;
            }
        }
        out.cubemap_changed = state.cubemap_changed;
        out.leaf = state.leaf;

        let composed = Arc::new(out);
        state.composed = Some(Arc::clone(&composed));
        state.eye_revision = self.eye_revision;
        composed
    }

    /// The camera moved but the object did not: refresh the eye-space light columns only.
    fn repack(&self, state: &mut LightingState) -> Arc<LightingRenderState> {
        state.cubemap_changed = false;
        self.compose(state)
    }
}
