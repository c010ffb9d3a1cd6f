//! Domain types for fleet traffic.
//!
//! This module contains the trajectory model shared by the schedule, the
//! conflict check and the planner: timed kinematic states, the footprint
//! profiles they carry, and the time-ordered [`Trajectory`] container.

mod error;
mod geometry;
mod motion;
mod profile;
mod time;
mod trajectory;

pub use error::TrajectoryError;
pub use geometry::Shape;
pub use motion::{Motion, TimedState, angle_difference, wrap_angle};
pub use profile::{Agency, Profile, ProfileHandle};
pub use time::{Time, from_seconds, seconds_between, to_seconds};
pub use trajectory::{InsertResult, Iter, Segment, SegmentId, SegmentMut, Trajectory};
