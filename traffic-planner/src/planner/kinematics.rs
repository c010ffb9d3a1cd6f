//! Rest-to-rest motion primitives.
//!
//! Every expansion of the search is built from three primitives: turning in
//! place, waiting, and driving straight along a lane. Turns and drives follow
//! a trapezoidal speed profile (or a triangular one when there is no room to
//! reach full speed), so each primitive starts and ends at rest.

use chrono::Duration;
use nalgebra::{Vector2, Vector3};

use crate::domain::{TimedState, angle_difference, from_seconds, wrap_angle};
use crate::vehicle::Limits;

/// Distances and angles below this are treated as zero.
const EPSILON: f64 = 1e-9;

/// A breakpoint of a 1-D speed profile.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Knot {
    /// Seconds since the start of the profile.
    time: f64,
    /// Distance covered so far.
    distance: f64,
    /// Speed at this instant.
    speed: f64,
}

/// Breakpoints of the fastest rest-to-rest profile covering `distance`,
/// excluding the starting point.
fn rest_to_rest(distance: f64, limits: &Limits) -> Vec<Knot> {
    let v = limits.velocity;
    let a = limits.acceleration;

    if distance >= v * v / a {
        let ramp_time = v / a;
        let ramp_distance = 0.5 * v * v / a;
        let cruise_time = (distance - 2.0 * ramp_distance) / v;

        let mut knots = vec![Knot {
            time: ramp_time,
            distance: ramp_distance,
            speed: v,
        }];
        if cruise_time > EPSILON {
            knots.push(Knot {
                time: ramp_time + cruise_time,
                distance: distance - ramp_distance,
                speed: v,
            });
        }
        knots.push(Knot {
            time: 2.0 * ramp_time + cruise_time,
            distance,
            speed: 0.0,
        });
        knots
    } else {
        let peak = (a * distance).sqrt();
        let ramp_time = peak / a;
        vec![
            Knot {
                time: ramp_time,
                distance: 0.5 * distance,
                speed: peak,
            },
            Knot {
                time: 2.0 * ramp_time,
                distance,
                speed: 0.0,
            },
        ]
    }
}

/// Turn in place from `from` to face `heading`, the short way round.
///
/// Returns the states reached, ending at rest facing exactly `heading`.
/// Empty if already facing it.
pub(crate) fn rotate(from: &TimedState, heading: f64, limits: &Limits) -> Vec<TimedState> {
    let start = from.position[2];
    let delta = angle_difference(start, heading);
    if delta.abs() < EPSILON {
        return Vec::new();
    }
    let sign = delta.signum();
    let knots = rest_to_rest(delta.abs(), limits);
    let last = knots.len() - 1;

    knots
        .into_iter()
        .enumerate()
        .map(|(i, knot)| {
            let facing = if i == last {
                wrap_angle(heading)
            } else {
                wrap_angle(start + sign * knot.distance)
            };
            TimedState::new(
                from.time + from_seconds(knot.time),
                Vector3::new(from.position[0], from.position[1], facing),
                Vector3::new(0.0, 0.0, sign * knot.speed),
            )
        })
        .collect()
}

/// Drive straight from `from` to `to` without turning.
///
/// The heading is kept as it is, so the vehicle drives forwards or in
/// reverse depending on which way it faces. Ends at rest exactly on `to`.
pub(crate) fn translate(from: &TimedState, to: Vector2<f64>, limits: &Limits) -> Vec<TimedState> {
    let origin = Vector2::new(from.position[0], from.position[1]);
    let offset = to - origin;
    let distance = offset.norm();
    if distance < EPSILON {
        return Vec::new();
    }
    let direction = offset / distance;
    let heading = from.position[2];
    let knots = rest_to_rest(distance, limits);
    let last = knots.len() - 1;

    knots
        .into_iter()
        .enumerate()
        .map(|(i, knot)| {
            let point = if i == last {
                to
            } else {
                origin + direction * knot.distance
            };
            let velocity = direction * knot.speed;
            TimedState::new(
                from.time + from_seconds(knot.time),
                Vector3::new(point.x, point.y, heading),
                Vector3::new(velocity.x, velocity.y, 0.0),
            )
        })
        .collect()
}

/// Stay put for `delay`.
pub(crate) fn wait(from: &TimedState, delay: Duration) -> TimedState {
    TimedState::at_rest(from.time + delay, from.position)
}

/// Lower bound on the time to drive `distance`, ignoring acceleration.
pub(crate) fn travel_time_lower_bound(distance: f64, limits: &Limits) -> Duration {
    from_seconds(distance / limits.velocity)
}
