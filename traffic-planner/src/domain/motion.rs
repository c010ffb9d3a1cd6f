//! Interpolation between consecutive trajectory states.
//!
//! A trajectory only records the state reached at each segment's finish
//! time. Between two such states the vehicle follows a cubic Hermite spline
//! in `(x, y, heading)`, which reproduces constant-acceleration and
//! constant-velocity phases exactly.

use std::f64::consts::{PI, TAU};

use nalgebra::Vector3;

use super::{Time, seconds_between};

/// Wraps an angle into `(-π, π]`.
///
/// # Examples
///
/// ```
/// use std::f64::consts::PI;
/// use traffic_planner::domain::wrap_angle;
///
/// assert_eq!(wrap_angle(PI), PI);
/// assert_eq!(wrap_angle(-PI), PI);
/// assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
/// ```
pub fn wrap_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    if a > PI { a - TAU } else { a }
}

/// Signed shortest rotation taking heading `from` to heading `to`.
pub fn angle_difference(from: f64, to: f64) -> f64 {
    wrap_angle(to - from)
}

/// A kinematic state at an instant: `(x, y, heading)` and `(vx, vy, ω)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedState {
    pub time: Time,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl TimedState {
    /// Creates a state.
    pub fn new(time: Time, position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        Self {
            time,
            position,
            velocity,
        }
    }

    /// A state at rest.
    pub fn at_rest(time: Time, position: Vector3<f64>) -> Self {
        Self::new(time, position, Vector3::zeros())
    }
}

/// Cubic Hermite spline between two timed states.
#[derive(Debug, Clone, Copy)]
pub struct Motion {
    start_time: Time,
    finish_time: Time,
    duration: f64,
    p0: Vector3<f64>,
    p1: Vector3<f64>,
    v0: Vector3<f64>,
    v1: Vector3<f64>,
}

impl Motion {
    /// Builds the spline from `start` to `finish`.
    ///
    /// The heading of `finish` is unwrapped relative to `start` so the
    /// vehicle always turns the short way round.
    pub fn between(start: &TimedState, finish: &TimedState) -> Self {
        let mut p1 = finish.position;
        p1[2] = start.position[2] + angle_difference(start.position[2], finish.position[2]);

        Self {
            start_time: start.time,
            finish_time: finish.time,
            duration: seconds_between(start.time, finish.time),
            p0: start.position,
            p1,
            v0: start.velocity,
            v1: finish.velocity,
        }
    }

    /// When the motion begins.
    pub fn start_time(&self) -> Time {
        self.start_time
    }

    /// When the motion ends.
    pub fn finish_time(&self) -> Time {
        self.finish_time
    }

    /// Position at `time`, clamped to the motion's time range. The heading
    /// component is wrapped into `(-π, π]`.
    pub fn compute_position(&self, time: Time) -> Vector3<f64> {
        let Some(s) = self.parameter(time) else {
            return wrapped(self.p1);
        };
        let t = self.duration;
        let s2 = s * s;
        let s3 = s2 * s;

        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;

        wrapped(self.p0 * h00 + self.v0 * (h10 * t) + self.p1 * h01 + self.v1 * (h11 * t))
    }

    /// Velocity at `time`, clamped to the motion's time range.
    pub fn compute_velocity(&self, time: Time) -> Vector3<f64> {
        let Some(s) = self.parameter(time) else {
            return self.v1;
        };
        let t = self.duration;
        let s2 = s * s;

        let d00 = 6.0 * s2 - 6.0 * s;
        let d10 = 3.0 * s2 - 4.0 * s + 1.0;
        let d01 = -6.0 * s2 + 6.0 * s;
        let d11 = 3.0 * s2 - 2.0 * s;

        (self.p0 * d00 + self.v0 * (d10 * t) + self.p1 * d01 + self.v1 * (d11 * t)) / t
    }

    /// Acceleration at `time`, clamped to the motion's time range.
    ///
    /// Acceleration is linear in time over a cubic segment, so its extremes
    /// are at the two ends.
    pub fn compute_acceleration(&self, time: Time) -> Vector3<f64> {
        let Some(s) = self.parameter(time) else {
            return Vector3::zeros();
        };
        let t = self.duration;

        let a00 = 12.0 * s - 6.0;
        let a10 = 6.0 * s - 4.0;
        let a01 = -12.0 * s + 6.0;
        let a11 = 6.0 * s - 2.0;

        (self.p0 * a00 + self.v0 * (a10 * t) + self.p1 * a01 + self.v1 * (a11 * t)) / (t * t)
    }

    /// Normalized spline parameter, or `None` for a zero-length motion.
    fn parameter(&self, time: Time) -> Option<f64> {
        if self.duration <= 0.0 {
            return None;
        }
        let s = seconds_between(self.start_time, time) / self.duration;
        Some(s.clamp(0.0, 1.0))
    }
}

fn wrapped(mut position: Vector3<f64>) -> Vector3<f64> {
    position[2] = wrap_angle(position[2]);
    position
}
