use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::level::LeafId;

/// Stable index of a light in the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LightId(pub u32);

impl LightId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightKind {
    Sun,
    Point,
    Sphere,
    Spot,
}

impl LightKind {
    /// Value written to the per-slot type array consumed by the shaders.
    pub const fn gpu_code(self) -> i32 {
        match self {
            LightKind::Sun => 0,
            LightKind::Point => 1,
            LightKind::Sphere => 2,
            LightKind::Spot => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LightKind::Sun => "Sun",
            LightKind::Point => "Point",
            LightKind::Sphere => "Sphere",
            LightKind::Spot => "Spot",
        }
    }
}

/// A level light. Everything except the eye-space fields is fixed at load.
#[derive(Debug, Clone)]
pub struct Light {
    pub id: LightId,
    pub leaf: LeafId,
    pub kind: LightKind,
    pub direction: Vec3,
    pub position: Vec3,
    pub color: Vec3,
    /// constant, linear, quadratic, cutoff radius (0 = unbounded)
    pub falloff: Vec4,
    /// Spot: inner cos, outer cos, exponent. Sphere: x is the emitter radius.
    pub falloff2: Vec4,
    /// Legacy fifty-percent / zero-percent distances in x/y.
    pub falloff3: Vec4,
    pub(crate) eye_position: Vec4,
    pub(crate) eye_direction: Vec4,
}

const LUMINANCE: Vec3 = Vec3::new(0.2126, 0.7152, 0.0722);
const MIN_DISTANCE: f32 = 1e-3;

impl Light {
    pub fn new(id: LightId, leaf: LeafId, kind: LightKind, position: Vec3, color: Vec3) -> Self {
        Self {
            id,
            leaf,
            kind,
            direction: Vec3::NEG_Z,
            position,
            color,
            falloff: Vec4::new(0.0, 0.0, 1.0, 0.0),
            falloff2: Vec4::ZERO,
            falloff3: Vec4::ZERO,
            eye_position: Vec4::ZERO,
            eye_direction: Vec4::ZERO,
        }
    }

    pub fn is_sun(&self) -> bool {
        self.kind == LightKind::Sun
    }

    pub fn eye_position(&self) -> Vec4 {
        self.eye_position
    }

    pub fn eye_direction(&self) -> Vec4 {
        self.eye_direction
    }

    /// Distance used to rank lights for a receiver. Suns rank ahead of every local light.
    pub fn rank_distance(&self, point: Vec3) -> f32 {
        if self.is_sun() {
            0.0
        } else {
            self.position.distance(point)
        }
    }

    /// Perceived brightness of this light at `point` after falloff.
    pub fn intensity_at(&self, point: Vec3) -> f32 {
        let brightness = self.color.max(Vec3::ZERO).dot(LUMINANCE);
        if self.is_sun() {
            return brightness;
        }
        brightness * self.attenuation(point)
    }

    fn attenuation(&self, point: Vec3) -> f32 {
        let to_point = point - self.position;
        let mut distance = to_point.length();
        let cutoff = self.falloff.w;
        if cutoff > 0.0 && distance > cutoff {
            return 0.0;
        }
        if self.kind == LightKind::Sphere {
            distance -= self.falloff2.x.max(0.0);
        }
        let distance = distance.max(MIN_DISTANCE);

        let denom = self.falloff.x + self.falloff.y * distance + self.falloff.z * distance * distance;
        let mut attenuation = if denom > 0.0 { 1.0 / denom } else { 1.0 };
        attenuation *= legacy_window(distance, self.falloff3.x, self.falloff3.y);
        if self.kind == LightKind::Spot {
            attenuation *= self.spot_factor(to_point);
        }
        attenuation
    }

    fn spot_factor(&self, to_point: Vec3) -> f32 {
        let dir = to_point.normalize_or_zero();
        if dir == Vec3::ZERO {
            return 1.0;
        }
        let inner = self.falloff2.x;
        let outer = self.falloff2.y;
        let exponent = if self.falloff2.z > 0.0 { self.falloff2.z } else { 1.0 };
        let cos = self.direction.dot(dir);
        if cos <= outer {
            0.0
        } else if cos >= inner || inner <= outer {
            1.0
        } else {
            ((cos - outer) / (inner - outer)).powf(exponent)
        }
    }

    /// Recomputes the eye-space fields from the active camera's view matrix.
    pub fn xform(&mut self, view: &Mat4) {
        self.eye_position = *view * self.position.extend(1.0);
        let dir = view.transform_vector3(self.direction).normalize_or_zero();
        self.eye_direction = dir.extend(0.0);
    }

    /// Two column-major blocks in the layout the lighting shaders read.
    pub fn pack(&self, fade: f32) -> ([f32; 16], [f32; 16]) {
        let first = Mat4::from_cols(
            self.eye_position,
            self.eye_direction,
            self.color.extend(self.kind.gpu_code() as f32),
            self.falloff,
        );
        let second =
            Mat4::from_cols(self.falloff2, self.falloff3, self.position.extend(1.0), Vec4::new(fade, 0.0, 0.0, 0.0));
        (first.to_cols_array(), second.to_cols_array())
    }
}

/// 1 at the light, 0.5 at `fifty`, 0 at `zero`. Disabled when `zero` is not set.
fn legacy_window(distance: f32, fifty: f32, zero: f32) -> f32 {
    if zero <= 0.0 {
        return 1.0;
    }
    let fifty = fifty.clamp(MIN_DISTANCE, zero);
    if distance <= fifty {
        1.0 - 0.5 * (distance / fifty)
    } else if distance < zero && zero > fifty {
        0.5 * (1.0 - (distance - fifty) / (zero - fifty))
    } else {
        0.0
    }
}
