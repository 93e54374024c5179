pub mod ambient;
pub mod bake;
pub mod cli;
pub mod config;
pub mod error;
pub mod kdtree;
pub mod level;
pub mod light;
pub mod material;
pub mod probes;
pub mod pvs;
pub mod registry;
pub mod render_state;
pub mod time;

pub use ambient::{AmbientCube, SmoothingCurve};
pub use bake::BakedLighting;
pub use config::ProbeConfig;
pub use error::{Degradation, LevelError};
pub use level::{LeafId, LevelVisibility, StaticLevel};
pub use light::{Light, LightId, LightKind};
pub use material::{MaterialLighting, StageRoles};
pub use probes::{AmbientProbeManager, NodeLighting, NodeUpdate, ObjectId, ProbeMetrics};
pub use pvs::{LeafIndices, PvsStats};
pub use registry::{CubemapId, CubemapTexture, LightingRegistry, ProbeId, VisibilityMarker};
pub use render_state::{LightingRenderState, LightingUniform, MAX_ACTIVE_LIGHTS, MAX_TOTAL_LIGHTS};
