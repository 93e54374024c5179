use glam::Vec3;
use serde::Serialize;

use crate::kdtree::KdTree;
use crate::level::{LeafId, LevelVisibility};
use crate::light::LightId;
use crate::registry::{CubemapId, LightingRegistry, ProbeId};

/// Probe tree and potentially-visible light list of a single leaf.
#[derive(Debug, Default)]
pub struct LeafIndex {
    pub probes: KdTree<ProbeId>,
    pub lights: Vec<LightId>,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct PvsStats {
    pub leaves: usize,
    pub leaves_with_probes: usize,
    pub leaves_with_lights: usize,
    pub light_assignments: usize,
    pub line_of_sight_tests: usize,
}

/// Read-only spatial indices built once per level.
#[derive(Debug, Default)]
pub struct LeafIndices {
    leaves: Vec<LeafIndex>,
    cubemaps: KdTree<CubemapId>,
    stats: PvsStats,
}

impl LeafIndices {
    pub fn build(registry: &LightingRegistry, level: &dyn LevelVisibility) -> Self {
        let leaf_count = level.leaf_count();
        let mut stats = PvsStats { leaves: leaf_count, ..Default::default() };

        let mut grouped: Vec<Vec<(Vec3, ProbeId)>> = vec![Vec::new(); leaf_count];
        for probe in registry.probes() {
            if let Some(bucket) = grouped.get_mut(probe.leaf.index()) {
                bucket.push((probe.position, probe.id));
            }
        }

        let mut leaves = Vec::with_capacity(leaf_count);
        let mut visible_mask = vec![false; leaf_count];
        for (index, probes) in grouped.into_iter().enumerate() {
            let leaf = LeafId(index as u32);
            if !probes.is_empty() {
                stats.leaves_with_probes += 1;
            }

            visible_mask.iter_mut().for_each(|v| *v = false);
            visible_mask[index] = true;
            for visible in level.visible_leaves(leaf) {
                if let Some(slot) = visible_mask.get_mut(visible.index()) {
                    *slot = true;
                }
            }

            let origin = level.leaf_center(leaf);
            let mut lights = Vec::new();
            for light in registry.lights() {
                // Suns light every leaf; occlusion is left to the per-object sky test.
                if !light.is_sun() {
                    if !visible_mask.get(light.leaf.index()).copied().unwrap_or(false) {
                        continue;
                    }
                    stats.line_of_sight_tests += 1;
                    if !level.line_of_sight(origin, light.position) {
                        continue;
                    }
                }
                lights.push(light.id);
            }
            if !lights.is_empty() {
                stats.leaves_with_lights += 1;
            }
            stats.light_assignments += lights.len();

            leaves.push(LeafIndex { probes: KdTree::build(probes), lights });
        }

        let cubemaps = KdTree::build(registry.cubemaps().iter().map(|cubemap| (cubemap.position, cubemap.id)));
        Self { leaves, cubemaps, stats }
    }

    pub fn leaf(&self, leaf: LeafId) -> Option<&LeafIndex> {
        self.leaves.get(leaf.index())
    }

    pub fn probe_tree(&self, leaf: LeafId) -> Option<&KdTree<ProbeId>> {
        self.leaf(leaf).map(|index| &index.probes).filter(|tree| !tree.is_empty())
    }

    pub fn light_pvs(&self, leaf: LeafId) -> &[LightId] {
        self.leaf(leaf).map(|index| index.lights.as_slice()).unwrap_or(&[])
    }

    pub fn cubemap_tree(&self) -> &KdTree<CubemapId> {
        &self.cubemaps
    }

    pub fn stats(&self) -> PvsStats {
        self.stats
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }
}
