use bit_vec::BitVec;
use glam::Mat4;
use smallvec::SmallVec;
use std::sync::Arc;

use crate::ambient::AmbientCube;
use crate::error::Degradation;
use crate::level::LeafId;
use crate::light::LightId;
use crate::material::MaterialLighting;
use crate::registry::{CubemapId, ProbeId};
use crate::render_state::{LightingRenderState, MAX_TOTAL_LIGHTS};

/// Identity of a renderable object. Stable for the object's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSlot {
    pub light: LightId,
    /// Current contribution, 0..=1.
    pub fade: f32,
    /// 1 for active lights, 0 for lights on their way out.
    pub target: f32,
}

impl LightSlot {
    pub fn is_active(&self) -> bool {
        self.target >= 1.0
    }

    pub(crate) fn step(&mut self, amount: f32) {
        if self.fade < self.target {
            self.fade = (self.fade + amount).min(self.target);
        } else if self.fade > self.target {
            self.fade = (self.fade - amount).max(self.target);
        }
    }
}

/// The light slots of one object. Cloning copies the whole list, which instanced copies rely on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightSlots {
    slots: SmallVec<[LightSlot; MAX_TOTAL_LIGHTS]>,
}

impl LightSlots {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LightSlot> {
        self.slots.iter()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_active()).count()
    }

    pub fn find(&self, light: LightId) -> Option<&LightSlot> {
        self.slots.iter().find(|slot| slot.light == light)
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }

    /// Moves every fade toward its target and drops slots that finished fading out.
    pub(crate) fn advance(&mut self, amount: f32) {
        for slot in self.slots.iter_mut() {
            slot.step(amount);
        }
        self.slots.retain(|slot| slot.is_active() || slot.fade > 0.0);
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.slots.iter().all(|slot| slot.fade == slot.target)
    }

    pub(crate) fn replace(&mut self, slots: SmallVec<[LightSlot; MAX_TOTAL_LIGHTS]>) {
        debug_assert!(slots.len() <= MAX_TOTAL_LIGHTS);
        self.slots = slots;
    }
}

/// Cached lighting resolution for one object.
#[derive(Debug, Clone)]
pub struct LightingState {
    pub(crate) generation: u64,
    /// Time of the last smoothing step. `None` until the first resolution.
    pub(crate) lighting_time: Option<f64>,
    /// Smoothed ambient before boosting; the baseline the next blend starts from.
    pub(crate) ambient_unboosted: AmbientCube,
    pub(crate) ambient_boosted: AmbientCube,
    /// Cube of the resolved probe (or the default ambient) that smoothing converges on.
    pub(crate) ambient_target: AmbientCube,
    pub(crate) probe: Option<ProbeId>,
    pub(crate) leaf: Option<LeafId>,
    pub(crate) slots: LightSlots,
    pub(crate) occluded: BitVec,
    pub(crate) occlusion_checked_at: Option<f64>,
    pub(crate) cubemap: Option<CubemapId>,
    pub(crate) cubemap_changed: bool,
    pub(crate) material: MaterialLighting,
    pub(crate) transform: Option<Mat4>,
    pub(crate) transform_key: Option<[i64; 16]>,
    pub(crate) composed: Option<Arc<LightingRenderState>>,
    pub(crate) eye_revision: u64,
    pub(crate) degradation: Degradation,
    pub(crate) last_access: f64,
    pub(crate) last_access_frame: u64,
}

impl LightingState {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            lighting_time: None,
            ambient_unboosted: AmbientCube::ZERO,
            ambient_boosted: AmbientCube::ZERO,
            ambient_target: AmbientCube::ZERO,
            probe: None,
            leaf: None,
            slots: LightSlots::default(),
            occluded: BitVec::new(),
            occlusion_checked_at: None,
            cubemap: None,
            cubemap_changed: false,
            material: MaterialLighting::default(),
            transform: None,
            transform_key: None,
            composed: None,
            eye_revision: 0,
            degradation: Degradation::empty(),
            last_access: 0.0,
            last_access_frame: 0,
        }
    }

    /// Drops every reference into the previous level. Access stamps survive.
    pub(crate) fn reset(&mut self, generation: u64) {
        let last_access = self.last_access;
        let last_access_frame = self.last_access_frame;
        *self = Self::new(generation);
        self.last_access = last_access;
        self.last_access_frame = last_access_frame;
    }

    pub(crate) fn touch(&mut self, now: f64, frame: u64) {
        self.last_access = now;
        self.last_access_frame = frame;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn probe(&self) -> Option<ProbeId> {
        self.probe
    }

    pub fn leaf(&self) -> Option<LeafId> {
        self.leaf
    }

    pub fn slots(&self) -> &LightSlots {
        &self.slots
    }

    pub fn active_lights(&self) -> usize {
        self.slots.active_count()
    }

    pub fn cubemap(&self) -> Option<CubemapId> {
        self.cubemap
    }

    pub fn cubemap_changed(&self) -> bool {
        self.cubemap_changed
    }

    pub fn ambient_unboosted(&self) -> &AmbientCube {
        &self.ambient_unboosted
    }

    pub fn ambient_boosted(&self) -> &AmbientCube {
        &self.ambient_boosted
    }

    pub fn is_occluded(&self, light: LightId) -> bool {
        self.occluded.get(light.index()).unwrap_or(false)
    }

    pub fn last_transform(&self) -> Option<Mat4> {
        self.transform
    }

    pub fn composed(&self) -> Option<&Arc<LightingRenderState>> {
        self.composed.as_ref()
    }

    pub fn last_access(&self) -> f64 {
        self.last_access
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_step_moves_toward_target() {
        let mut slot = LightSlot { light: LightId(0), fade: 0.0, target: 1.0 };
        slot.step(0.3);
        assert!((slot.fade - 0.3).abs() < 1e-6);
        slot.step(5.0);
        assert_eq!(slot.fade, 1.0);
        slot.target = 0.0;
        slot.step(0.75);
        assert!((slot.fade - 0.25).abs() < 1e-6);
        slot.step(1.0);
        assert_eq!(slot.fade, 0.0);
    }

    #[test]
    fn advance_drops_finished_fade_outs() {
        let mut slots = LightSlots::default();
        slots.replace(SmallVec::from_slice(&[
            LightSlot { light: LightId(0), fade: 0.5, target: 1.0 },
            LightSlot { light: LightId(1), fade: 0.25, target: 0.0 },
            LightSlot { light: LightId(2), fade: 0.75, target: 0.0 },
        ]));
        assert!(!slots.is_settled());
        slots.advance(0.5);
        assert_eq!(slots.len(), 2);
        assert!(slots.find(LightId(1)).is_none());
        assert_eq!(slots.find(LightId(0)).map(|slot| slot.fade), Some(1.0));
        assert!(!slots.is_settled());
        slots.advance(0.5);
        assert_eq!(slots.len(), 1);
        assert!(slots.is_settled());
    }

    #[test]
    fn reset_keeps_access_stamps() {
        let mut state = LightingState::new(1);
        state.touch(12.5, 40);
        state.probe = Some(ProbeId(3));
        state.reset(2);
        assert_eq!(state.generation(), 2);
        assert!(state.probe().is_none());
        assert_eq!(state.last_access(), 12.5);
        assert_eq!(state.last_access_frame, 40);
    }
}
