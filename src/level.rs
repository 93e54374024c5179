//! Boundary with the level loader: leaf lookup, leaf-to-leaf visibility and line of sight.

use anyhow::{Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::bake::Vec3Data;
use crate::error::LevelError;

/// Index of a convex visibility cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeafId(pub u32);

impl LeafId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Queries the lighting system needs from the loaded level geometry.
///
/// Implementations are read-only after load and are shared across resolver threads.
pub trait LevelVisibility: Send + Sync {
    fn leaf_count(&self) -> usize;

    /// Leaf containing `point`, or `None` outside the level volume.
    fn leaf_for_point(&self, point: Vec3) -> Option<LeafId>;

    /// Leaves potentially visible from `leaf`.
    fn visible_leaves(&self, leaf: LeafId) -> &[LeafId];

    /// Point used for per-leaf line-of-sight tests.
    fn leaf_center(&self, leaf: LeafId) -> Vec3;

    /// True when nothing solid lies on the segment between the two points.
    fn line_of_sight(&self, from: Vec3, to: Vec3) -> bool;

    /// True when the sky can be seen from `point`. Used for sun occlusion.
    fn sky_visible(&self, point: Vec3) -> bool {
        let _ = point;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxData {
    pub min: Vec3Data,
    pub max: Vec3Data,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafData {
    pub bounds: BoxData,
    #[serde(default)]
    pub visible: Vec<LeafId>,
    #[serde(default = "LeafData::default_sees_sky")]
    pub sees_sky: bool,
}

impl LeafData {
    const fn default_sees_sky() -> bool {
        true
    }
}

/// Serialized form of [`StaticLevel`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticLevelData {
    pub leaves: Vec<LeafData>,
    #[serde(default)]
    pub occluders: Vec<BoxData>,
}

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Vec3,
    max: Vec3,
}

impl Aabb {
    fn from_data(data: &BoxData) -> Self {
        let a: Vec3 = data.min.into();
        let b: Vec3 = data.max.into();
        Self { min: a.min(b), max: a.max(b) }
    }

    fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Slab test against the open segment `from..to`.
    fn blocks_segment(&self, from: Vec3, to: Vec3) -> bool {
        let dir = to - from;
        let mut t_min = 0.0f32;
        let mut t_max = 1.0f32;
        for axis in 0..3 {
            let origin = from[axis];
            let d = dir[axis];
            if d.abs() < f32::EPSILON {
                if origin < self.min[axis] || origin > self.max[axis] {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t0 = (self.min[axis] - origin) * inv;
            let mut t1 = (self.max[axis] - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return false;
            }
        }
        true
    }
}

struct StaticLeaf {
    bounds: Aabb,
    visible: Vec<LeafId>,
    sees_sky: bool,
}

/// Level built from axis-aligned leaf boxes with explicit visibility lists and box occluders.
///
/// Overlapping leaves resolve to the lowest index.
pub struct StaticLevel {
    leaves: Vec<StaticLeaf>,
    occluders: Vec<Aabb>,
}

impl StaticLevel {
    pub fn from_data(data: &StaticLevelData) -> Result<Self, LevelError> {
        if data.leaves.is_empty() {
            return Err(LevelError::EmptyLevel);
        }
        let leaf_count = data.leaves.len();
        let mut leaves = Vec::with_capacity(leaf_count);
        for (index, leaf) in data.leaves.iter().enumerate() {
            let id = LeafId(index as u32);
            let mut visible = Vec::with_capacity(leaf.visible.len() + 1);
            for &target in &leaf.visible {
                if target.index() >= leaf_count {
                    return Err(LevelError::MalformedVisibility { leaf: id, target });
                }
                if !visible.contains(&target) {
                    visible.push(target);
                }
            }
            if !visible.contains(&id) {
                visible.push(id);
            }
            visible.sort_unstable();
            let bounds = Aabb::from_data(&leaf.bounds);
            if !bounds.min.is_finite() || !bounds.max.is_finite() {
                return Err(LevelError::NonFinite("leaf bounds"));
            }
            leaves.push(StaticLeaf { bounds, visible, sees_sky: leaf.sees_sky });
        }
        let occluders = data.occluders.iter().map(Aabb::from_data).collect();
        Ok(Self { leaves, occluders })
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Reading level file {}", path.display()))?;
        let data = serde_json::from_slice::<StaticLevelData>(&bytes)
            .with_context(|| format!("Parsing level file {}", path.display()))?;
        let level = Self::from_data(&data).with_context(|| format!("Validating level {}", path.display()))?;
        Ok(level)
    }
}

impl LevelVisibility for StaticLevel {
    fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    fn leaf_for_point(&self, point: Vec3) -> Option<LeafId> {
        self.leaves.iter().position(|leaf| leaf.bounds.contains(point)).map(|index| LeafId(index as u32))
    }

    fn visible_leaves(&self, leaf: LeafId) -> &[LeafId] {
        self.leaves.get(leaf.index()).map(|leaf| leaf.visible.as_slice()).unwrap_or(&[])
    }

    fn leaf_center(&self, leaf: LeafId) -> Vec3 {
        self.leaves.get(leaf.index()).map(|leaf| leaf.bounds.center()).unwrap_or(Vec3::ZERO)
    }

    fn line_of_sight(&self, from: Vec3, to: Vec3) -> bool {
        !self.occluders.iter().any(|occluder| occluder.blocks_segment(from, to))
    }

    fn sky_visible(&self, point: Vec3) -> bool {
        match self.leaf_for_point(point) {
            Some(leaf) => self.leaves[leaf.index()].sees_sky,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(min: [f32; 3], max: [f32; 3]) -> BoxData {
        BoxData {
            min: Vec3Data { x: min[0], y: min[1], z: min[2] },
            max: Vec3Data { x: max[0], y: max[1], z: max[2] },
        }
    }

    fn two_rooms() -> StaticLevel {
        let data = StaticLevelData {
            leaves: vec![
                LeafData { bounds: boxed([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]), visible: vec![LeafId(1)], sees_sky: true },
                LeafData { bounds: boxed([10.0, 0.0, 0.0], [20.0, 10.0, 10.0]), visible: vec![], sees_sky: false },
            ],
            occluders: vec![boxed([9.5, 0.0, 0.0], [10.5, 10.0, 4.0])],
        };
        StaticLevel::from_data(&data).expect("valid level")
    }

    #[test]
    fn leaves_always_see_themselves() {
        let level = two_rooms();
        assert_eq!(level.visible_leaves(LeafId(0)), &[LeafId(0), LeafId(1)]);
        assert_eq!(level.visible_leaves(LeafId(1)), &[LeafId(1)]);
        assert!(level.visible_leaves(LeafId(9)).is_empty());
    }

    #[test]
    fn point_lookup_and_sky() {
        let level = two_rooms();
        assert_eq!(level.leaf_for_point(Vec3::new(5.0, 5.0, 5.0)), Some(LeafId(0)));
        assert_eq!(level.leaf_for_point(Vec3::new(15.0, 5.0, 5.0)), Some(LeafId(1)));
        assert_eq!(level.leaf_for_point(Vec3::new(-1.0, 5.0, 5.0)), None);
        assert!(level.sky_visible(Vec3::new(5.0, 5.0, 5.0)));
        assert!(!level.sky_visible(Vec3::new(15.0, 5.0, 5.0)));
    }

    #[test]
    fn occluder_blocks_low_rays_only() {
        let level = two_rooms();
        assert!(!level.line_of_sight(Vec3::new(5.0, 5.0, 2.0), Vec3::new(15.0, 5.0, 2.0)));
        assert!(level.line_of_sight(Vec3::new(5.0, 5.0, 8.0), Vec3::new(15.0, 5.0, 8.0)));
    }

    #[test]
    fn rejects_dangling_visibility() {
        let data = StaticLevelData {
            leaves: vec![LeafData {
                bounds: boxed([0.0; 3], [1.0; 3]),
                visible: vec![LeafId(4)],
                sees_sky: true,
            }],
            occluders: Vec::new(),
        };
        let err = StaticLevel::from_data(&data).err().expect("dangling leaf should fail");
        assert_eq!(err, LevelError::MalformedVisibility { leaf: LeafId(0), target: LeafId(4) });
        assert_eq!(StaticLevel::from_data(&StaticLevelData::default()).err(), Some(LevelError::EmptyLevel));
    }
}
