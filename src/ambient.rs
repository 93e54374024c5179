use glam::Vec3;
use serde::Deserialize;

/// Six directional irradiance samples: +X, -X, +Y, -Y, +Z, -Z.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AmbientCube(pub [Vec3; 6]);

impl AmbientCube {
    pub const ZERO: Self = Self([Vec3::ZERO; 6]);

    pub fn splat(color: Vec3) -> Self {
        Self([color; 6])
    }

    pub fn lerp(&self, target: &AmbientCube, t: f32) -> Self {
        let mut out = *self;
        for (dst, src) in out.0.iter_mut().zip(target.0.iter()) {
            *dst = dst.lerp(*src, t);
        }
        out
    }

    pub fn abs_diff_eq(&self, other: &AmbientCube, max_abs_diff: f32) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a.abs_diff_eq(*b, max_abs_diff))
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self(self.0.map(|v| v * factor))
    }

    pub fn to_gpu(&self) -> [[f32; 4]; 6] {
        self.0.map(|v| v.extend(0.0).to_array())
    }

    /// Irradiance for a world-space normal, weighted by the squared components like the shaders do.
    pub fn sample(&self, normal: Vec3) -> Vec3 {
        let n = normal.normalize_or_zero();
        let sq = n * n;
        let x = if n.x >= 0.0 { self.0[0] } else { self.0[1] };
        let y = if n.y >= 0.0 { self.0[2] } else { self.0[3] };
        let z = if n.z >= 0.0 { self.0[4] } else { self.0[5] };
        x * sq.x + y * sq.y + z * sq.z
    }
}

/// Time-averaging applied when a receiver's probe changes.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingCurve {
    /// Fraction `dt / duration` of the remaining difference per update, clamped.
    Linear { duration: f32 },
    /// `1 - exp(-dt / time_constant)` of the remaining difference per update.
    Exponential { time_constant: f32 },
}

impl Default for SmoothingCurve {
    fn default() -> Self {
        SmoothingCurve::Exponential { time_constant: 0.5 }
    }
}

impl SmoothingCurve {
    /// Blend weight toward the new sample after `dt` seconds.
    pub fn weight(self, dt: f32) -> f32 {
        if dt <= 0.0 {
            return 0.0;
        }
        match self {
            SmoothingCurve::Linear { duration } if duration > 0.0 => (dt / duration).clamp(0.0, 1.0),
            SmoothingCurve::Exponential { time_constant } if time_constant > 0.0 => {
                1.0 - (-dt / time_constant).exp()
            }
            _ => 1.0,
        }
    }
}

/// Blends closer than this to their target snap onto it.
pub const SETTLE_EPSILON: f32 = 1e-4;

/// Result of one smoothing step. `unboosted` is the baseline the next step blends from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedAmbient {
    pub unboosted: AmbientCube,
    pub boosted: AmbientCube,
}

/// Blends `previous` (pre-boost) toward `target`, then boosts. `previous = None` snaps.
pub fn smooth_ambient(
    previous: Option<&AmbientCube>,
    target: &AmbientCube,
    dt: f32,
    curve: SmoothingCurve,
    boost: f32,
) -> SmoothedAmbient {
    let unboosted = match previous {
        Some(prev) => {
            let blended = prev.lerp(target, curve.weight(dt));
            if blended.abs_diff_eq(target, SETTLE_EPSILON) { *target } else { blended }
        }
        None => *target,
    };
    SmoothedAmbient { unboosted, boosted: unboosted.scaled(boost) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_weight_is_monotonic() {
        let curve = SmoothingCurve::Exponential { time_constant: 0.5 };
        assert_eq!(curve.weight(0.0), 0.0);
        let a = curve.weight(0.1);
        let b = curve.weight(0.5);
        assert!(a > 0.0 && a < b && b < 1.0);
        assert!((b - (1.0 - (-1.0f32).exp())).abs() < 1e-6);
    }

    #[test]
    fn linear_weight_saturates() {
        let curve = SmoothingCurve::Linear { duration: 0.25 };
        assert!((curve.weight(0.125) - 0.5).abs() < 1e-6);
        assert_eq!(curve.weight(2.0), 1.0);
    }

    #[test]
    fn repeated_smoothing_does_not_compound_boost() {
        let target = AmbientCube::splat(Vec3::splat(0.4));
        let curve = SmoothingCurve::Linear { duration: 1.0 };
        let mut state = smooth_ambient(None, &target, 0.0, curve, 2.0);
        for _ in 0..10 {
            state = smooth_ambient(Some(&state.unboosted), &target, 0.1, curve, 2.0);
        }
        assert_eq!(state.unboosted, target);
        assert!((state.boosted.0[0].x - 0.8).abs() < 1e-6);
    }

    #[test]
    fn exponential_blend_lands_exactly_on_target() {
        let start = AmbientCube::splat(Vec3::X);
        let target = AmbientCube::splat(Vec3::Y);
        let curve = SmoothingCurve::Exponential { time_constant: 0.5 };
        let mut unboosted = start;
        for _ in 0..600 {
            unboosted = smooth_ambient(Some(&unboosted), &target, 1.0 / 60.0, curve, 1.0).unboosted;
        }
        assert_eq!(unboosted, target);
    }

    #[test]
    fn sample_picks_facing_sides() {
        let mut cube = AmbientCube::ZERO;
        cube.0[0] = Vec3::X;
        cube.0[3] = Vec3::Y;
        assert_eq!(cube.sample(Vec3::X), Vec3::X);
        assert_eq!(cube.sample(Vec3::NEG_Y), Vec3::Y);
        assert_eq!(cube.sample(Vec3::NEG_X), Vec3::ZERO);
    }
}
