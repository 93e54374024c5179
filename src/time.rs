use std::time::{Duration, Instant};

/// Frame clock feeding [`crate::AmbientProbeManager::xform_lights`].
///
/// Wall-clock by default; [`FrameClock::fixed`] advances by a constant step, which replay tools
/// and tests use to get reproducible smoothing.
pub struct FrameClock {
    last: Instant,
    fixed_step: Option<Duration>,
    elapsed: Duration,
    frame: u64,
    pub delta: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self { last: Instant::now(), fixed_step: None, elapsed: Duration::ZERO, frame: 0, delta: Duration::ZERO }
    }

    pub fn fixed(step_seconds: f64) -> Self {
        let mut clock = Self::new();
        clock.fixed_step = Some(Duration::from_secs_f64(step_seconds.max(0.0)));
        clock
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = self.fixed_step.unwrap_or_else(|| now - self.last);
        self.last = now;
        self.elapsed += self.delta;
        self.frame += 1;
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Seconds since the clock started, the unit lighting timestamps use.
    pub fn now(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_by_step() {
        let mut clock = FrameClock::fixed(0.25);
        assert_eq!(clock.now(), 0.0);
        clock.tick();
        clock.tick();
        assert_eq!(clock.frame(), 2);
        assert!((clock.now() - 0.5).abs() < 1e-9);
        assert!((clock.delta_seconds() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn wall_clock_is_monotonic() {
        let mut clock = FrameClock::new();
        clock.tick();
        let first = clock.now();
        clock.tick();
        assert!(clock.now() >= first);
    }
}
