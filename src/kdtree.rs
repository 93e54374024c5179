//! Static 3D kd-tree used for nearest probe, light and cubemap lookups.
//!
//! The tree is built once from a fixed point set and never mutated afterwards, so shared
//! references can be queried from any number of threads without synchronization.

use glam::Vec3;
use smallvec::SmallVec;

const NO_CHILD: u32 = u32::MAX;

#[derive(Clone, Copy, Debug)]
struct KdNode {
    item: u32,
    axis: u8,
    left: u32,
    right: u32,
}

/// Nearest-neighbour index over `(position, payload)` pairs.
///
/// Results are ordered by ascending Euclidean distance. Equal distances are ordered by the
/// insertion index of the item, so callers that insert in id order get lowest-id tie breaking.
#[derive(Clone, Debug)]
pub struct KdTree<T> {
    items: Vec<(Vec3, T)>,
    nodes: Vec<KdNode>,
    root: u32,
}

/// A single query hit.
#[derive(Clone, Copy, Debug)]
pub struct Neighbor<'a, T> {
    pub index: usize,
    pub payload: &'a T,
    pub position: Vec3,
    pub distance_sq: f32,
}

impl<'a, T> Neighbor<'a, T> {
    pub fn distance(&self) -> f32 {
        self.distance_sq.sqrt()
    }
}

impl<T> Default for KdTree<T> {
    fn default() -> Self {
        Self { items: Vec::new(), nodes: Vec::new(), root: NO_CHILD }
    }
}

impl<T> KdTree<T> {
    pub fn build<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (Vec3, T)>,
    {
        let items: Vec<(Vec3, T)> = points.into_iter().collect();
        let mut order: Vec<u32> = (0..items.len() as u32).collect();
        let mut nodes = Vec::with_capacity(items.len());
        let root = build_recursive(&items, &mut order, &mut nodes);
        Self { items, nodes, root }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn payload(&self, index: usize) -> Option<&T> {
        self.items.get(index).map(|(_, payload)| payload)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Vec3, &T)> {
        self.items.iter().map(|(position, payload)| (*position, payload))
    }

    /// Closest item to `point`, or `None` for an empty tree.
    pub fn nearest(&self, point: Vec3) -> Option<&T> {
        self.neighbors(point, 1).first().map(|hit| hit.payload)
    }

    /// Up to `n` closest payloads, nearest first.
    pub fn nearest_n(&self, point: Vec3, n: usize) -> Vec<&T> {
        self.neighbors(point, n).into_iter().map(|hit| hit.payload).collect()
    }

    pub fn neighbors(&self, point: Vec3, n: usize) -> Vec<Neighbor<'_, T>> {
        if n == 0 || self.root == NO_CHILD {
            return Vec::new();
        }
        let mut best = Candidates::new(n);
        self.search(self.root, point, &mut best);
        best.entries
            .into_iter()
            .map(|(distance_sq, item)| {
                let (position, payload) = &self.items[item as usize];
                Neighbor { index: item as usize, payload, position: *position, distance_sq }
            })
            .collect()
    }

    fn search(&self, node_index: u32, point: Vec3, best: &mut Candidates) {
        let node = self.nodes[node_index as usize];
        let (position, _) = &self.items[node.item as usize];
        best.offer(position.distance_squared(point), node.item);

        let axis = node.axis as usize;
        let delta = point[axis] - position[axis];
        let (near, far) = if delta < 0.0 { (node.left, node.right) } else { (node.right, node.left) };
        if near != NO_CHILD {
            self.search(near, point, best);
        }
        // `<=` keeps equidistant items on the far side eligible for the id tie break.
        if far != NO_CHILD && delta * delta <= best.worst() {
            self.search(far, point, best);
        }
    }
}

fn build_recursive<T>(items: &[(Vec3, T)], order: &mut [u32], nodes: &mut Vec<KdNode>) -> u32 {
    if order.is_empty() {
        return NO_CHILD;
    }
    let axis = widest_axis(items, order);
    let mid = order.len() / 2;
    order.select_nth_unstable_by(mid, |a, b| {
        let pa = items[*a as usize].0[axis];
        let pb = items[*b as usize].0[axis];
        pa.total_cmp(&pb).then(a.cmp(b))
    });
    let item = order[mid];
    let slot = nodes.len() as u32;
    nodes.push(KdNode { item, axis: axis as u8, left: NO_CHILD, right: NO_CHILD });
    let (lower, rest) = order.split_at_mut(mid);
    let left = build_recursive(items, lower, nodes);
    let right = build_recursive(items, &mut rest[1..], nodes);
    let node = &mut nodes[slot as usize];
    node.left = left;
    node.right = right;
    slot
}

fn widest_axis<T>(items: &[(Vec3, T)], order: &[u32]) -> usize {
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for &index in order {
        let p = items[index as usize].0;
        min = min.min(p);
        max = max.max(p);
    }
    let extent = max - min;
    if extent.x >= extent.y && extent.x >= extent.z {
        0
    } else if extent.y >= extent.z {
        1
    } else {
        2
    }
}

/// Bounded, sorted candidate list. `n` is small in practice, so insertion sort wins over a heap.
struct Candidates {
    limit: usize,
    entries: SmallVec<[(f32, u32); 8]>,
}

impl Candidates {
    fn new(limit: usize) -> Self {
        Self { limit, entries: SmallVec::new() }
    }

    fn worst(&self) -> f32 {
        if self.entries.len() < self.limit {
            f32::INFINITY
        } else {
            self.entries.last().map(|(d, _)| *d).unwrap_or(f32::INFINITY)
        }
    }

    fn offer(&mut self, distance_sq: f32, item: u32) {
        let key = (distance_sq, item);
        if self.entries.len() >= self.limit {
            match self.entries.last() {
                Some(last) if !less(key, *last) => return,
                _ => {}
            }
        }
        let at = self.entries.partition_point(|entry| less(*entry, key));
        self.entries.insert(at, key);
        if self.entries.len() > self.limit {
            self.entries.pop();
        }
    }
}

fn less(a: (f32, u32), b: (f32, u32)) -> bool {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).is_lt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_finds_nothing() {
        let tree: KdTree<u32> = KdTree::build(Vec::new());
        assert!(tree.is_empty());
        assert!(tree.nearest(Vec3::ZERO).is_none());
        assert!(tree.nearest_n(Vec3::ONE, 4).is_empty());
    }

    #[test]
    fn single_point_tree_returns_it() {
        let tree = KdTree::build([(Vec3::new(3.0, 1.0, -2.0), 7u32)]);
        assert_eq!(tree.nearest(Vec3::new(100.0, 0.0, 0.0)), Some(&7));
        assert_eq!(tree.nearest_n(Vec3::ZERO, 3), vec![&7]);
    }

    #[test]
    fn nearest_n_orders_by_distance() {
        let tree = KdTree::build([
            (Vec3::new(0.0, 0.0, 0.0), 0u32),
            (Vec3::new(10.0, 0.0, 0.0), 1u32),
            (Vec3::new(5.0, 5.0, 0.0), 2u32),
        ]);
        assert_eq!(tree.nearest_n(Vec3::new(4.0, 0.0, 0.0), 3), vec![&0, &2, &1]);
    }

    #[test]
    fn equidistant_points_prefer_lowest_index() {
        let tree = KdTree::build([
            (Vec3::new(2.0, 0.0, 0.0), "b"),
            (Vec3::new(-2.0, 0.0, 0.0), "a"),
            (Vec3::new(0.0, 2.0, 0.0), "c"),
        ]);
        let hits = tree.neighbors(Vec3::ZERO, 3);
        let order: Vec<usize> = hits.iter().map(|hit| hit.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!((hits[0].distance() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn duplicate_positions_are_all_reachable() {
        let tree = KdTree::build((0..5u32).map(|i| (Vec3::splat(1.0), i)));
        let hits = tree.nearest_n(Vec3::splat(1.0), 5);
        assert_eq!(hits, vec![&0, &1, &2, &3, &4]);
    }
}
