use bitflags::bitflags;
use thiserror::Error;

use crate::level::LeafId;

/// Load-time failures. Per-frame resolution never produces these; it degrades instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LevelError {
    #[error("level has no leaves")]
    EmptyLevel,
    #[error("{kind} #{index} references leaf {leaf:?}, but the level only has {leaf_count} leaves")]
    UnknownLeaf { kind: &'static str, index: usize, leaf: LeafId, leaf_count: usize },
    #[error("leaf {leaf:?} lists {target:?} as visible, which is not a leaf of this level")]
    MalformedVisibility { leaf: LeafId, target: LeafId },
    #[error("{0} has a non-finite position")]
    NonFinite(&'static str),
    #[error("no level is loaded")]
    NoLevel,
}

bitflags! {
    /// Fallbacks taken while resolving a node. None of these fail the frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Degradation: u8 {
        /// No probe, light or cubemap applied; defaults were used.
        const MISSING_DATA = 1 << 0;
        /// The cached state came from an earlier level and was rebuilt.
        const STALE_CACHE = 1 << 1;
        /// The node is outside every leaf.
        const INVALID_LEAF = 1 << 2;
        /// The probe came from a neighbouring leaf instead of the node's own leaf.
        const NEIGHBOR_PROBE = 1 << 3;
    }
}
