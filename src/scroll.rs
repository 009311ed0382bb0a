//! Pause-aware scrolling of the hologram line pattern.
//!
//! The pattern scrolls at a fixed world-space velocity. Instead of
//! accumulating an ever-growing offset vector, [`ScrollState`] keeps one
//! scalar "time along the pattern" wrapped into `[0, period)`, where
//! `period = 1 / |velocity|` is the time it takes to travel one world unit.
//! The offset is the unclamped extrapolation `velocity * position`, so it stays
//! bounded and precise no matter how long the pass runs.
//!
//! The scalar only advances by simulation time: feed it
//! [`FrameTiming::scaled_delta`] and the pattern freezes while the host is
//! paused.

use glam::Vec3;

/// Per-frame timing reported by the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTiming {
    /// Wall-clock seconds since the previous frame.
    pub delta_seconds: f32,
    /// Whether the host simulation is paused.
    pub paused: bool,
    /// Simulation speed multiplier.
    pub time_scale: f32,
}

impl FrameTiming {
    pub fn new(delta_seconds: f32) -> Self {
        Self {
            delta_seconds,
            paused: false,
            time_scale: 1.0,
        }
    }

    pub fn paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    pub fn time_scale(mut self, time_scale: f32) -> Self {
        self.time_scale = time_scale;
        self
    }

    /// Simulation seconds elapsed this frame; zero while paused.
    pub fn scaled_delta(&self) -> f32 {
        if self.paused {
            return 0.0;
        }
        let scaled = self.delta_seconds * self.time_scale;
        if scaled.is_finite() { scaled.max(0.0) } else { 0.0 }
    }
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// The one piece of state the hologram pass carries across frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollState {
    position: f32,
    velocity: Vec3,
}

impl ScrollState {
    pub fn new(velocity: Vec3) -> Self {
        Self {
            position: 0.0,
            velocity,
        }
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Current time along the pattern, in `[0, period)`.
    pub fn position(&self) -> f32 {
        self.position
    }

    /// Seconds per world unit of travel, or `None` when scrolling is disabled
    /// (zero or non-finite velocity).
    pub fn period(&self) -> Option<f32> {
        let speed = self.velocity.length();
        if speed > 0.0 && speed.is_finite() {
            Some(1.0 / speed)
        } else {
            None
        }
    }

    /// Current world-space offset of the pattern.
    pub fn offset(&self) -> Vec3 {
        if self.period().is_none() {
            return Vec3::ZERO;
        }
        Vec3::ZERO.lerp(self.velocity, self.position)
    }

    /// Advances by `dt` simulation seconds and returns the new offset.
    pub fn advance(&mut self, dt: f32) -> Vec3 {
        let Some(period) = self.period() else {
            self.position = 0.0;
            return Vec3::ZERO;
        };
        let dt = if dt.is_finite() { dt } else { 0.0 };

        let mut position = (self.position + dt).rem_euclid(period);
        // rem_euclid can round up to exactly `period` for tiny negative inputs
        if position >= period {
            position = 0.0;
        }
        self.position = position;
        self.offset()
    }

    pub fn reset(&mut self) {
        self.position = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f32 = 1e-4;

    fn circular_distance(a: f32, b: f32, period: f32) -> f32 {
        let d = (a - b).abs() % period;
        d.min(period - d)
    }

    #[test]
    fn slow_upward_scroll_sequence() {
        let mut scroll = ScrollState::new(Vec3::new(0.0, 0.01, 0.0));
        assert!((scroll.period().unwrap() - 100.0).abs() < EPS);

        let first = scroll.advance(0.0);
        assert_eq!(first, Vec3::ZERO);

        let second = scroll.advance(0.5);
        assert!((second.y - 0.005).abs() < 1e-6);
        assert!((scroll.position() - 0.5).abs() < EPS);

        let third = scroll.advance(0.5);
        assert!((third.y - 0.01).abs() < 1e-6);
        assert!(third.y > second.y);
    }

    #[test]
    fn wraps_at_period_boundary() {
        let mut scroll = ScrollState::new(Vec3::new(0.0, 0.01, 0.0));
        scroll.advance(99.5);
        let before_wrap = scroll.offset().y;
        scroll.advance(1.0);
        assert!((scroll.position() - 0.5).abs() < 1e-3);
        assert!(scroll.offset().y < before_wrap);
    }

    #[test]
    fn exact_period_wraps_to_zero() {
        let mut scroll = ScrollState::new(Vec3::new(0.0, 0.0, 0.5));
        scroll.advance(2.0);
        assert!(scroll.position().abs() < EPS);
    }

    #[test]
    fn zero_velocity_disables_scrolling() {
        let mut scroll = ScrollState::new(Vec3::ZERO);
        assert_eq!(scroll.period(), None);
        assert_eq!(scroll.advance(10.0), Vec3::ZERO);
        assert_eq!(scroll.position(), 0.0);
    }

    #[test]
    fn non_finite_velocity_disables_scrolling() {
        let mut scroll = ScrollState::new(Vec3::new(f32::NAN, 0.0, 0.0));
        assert_eq!(scroll.period(), None);
        assert_eq!(scroll.advance(1.0), Vec3::ZERO);
    }

    #[test]
    fn offset_extrapolates_along_velocity() {
        let velocity = Vec3::new(0.3, 0.4, 0.0);
        let mut scroll = ScrollState::new(velocity);
        let offset = scroll.advance(1.5);
        assert!((offset - velocity * 1.5).length() < EPS);
    }

    #[test]
    fn paused_frames_do_not_advance() {
        let mut scroll = ScrollState::new(Vec3::Y);
        scroll.advance(0.25);
        let timing = FrameTiming::new(0.016).paused(true);
        scroll.advance(timing.scaled_delta());
        assert!((scroll.position() - 0.25).abs() < EPS);
    }

    #[test]
    fn time_scale_multiplies_delta() {
        let timing = FrameTiming::new(0.5).time_scale(2.0);
        assert_eq!(timing.scaled_delta(), 1.0);
        assert_eq!(FrameTiming::new(f32::INFINITY).scaled_delta(), 0.0);
        assert_eq!(FrameTiming::new(-1.0).scaled_delta(), 0.0);
    }

    proptest! {
        #[test]
        fn position_stays_within_period(
            speed in 0.001f32..10.0,
            steps in proptest::collection::vec(0.0f32..50.0, 1..20),
        ) {
            let mut scroll = ScrollState::new(Vec3::new(speed, 0.0, 0.0));
            let period = scroll.period().unwrap();
            for dt in steps {
                scroll.advance(dt);
                prop_assert!(scroll.position() >= 0.0);
                prop_assert!(scroll.position() < period);
            }
        }

        #[test]
        fn split_advance_matches_single_advance(
            speed in 0.01f32..5.0,
            dt1 in 0.0f32..20.0,
            dt2 in 0.0f32..20.0,
        ) {
            let velocity = Vec3::new(0.0, speed, 0.0);
            let mut split = ScrollState::new(velocity);
            split.advance(dt1);
            split.advance(dt2);

            let mut single = ScrollState::new(velocity);
            single.advance(dt1 + dt2);

            let period = split.period().unwrap();
            let tolerance = 1e-3 * (1.0 + dt1 + dt2);
            prop_assert!(circular_distance(split.position(), single.position(), period) < tolerance);
        }
    }
}
