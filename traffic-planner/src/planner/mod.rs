//! Trajectory planner using time-expanded best-first search.
//!
//! This module answers: "How does this vehicle get from here to there
//! without running into anything already on the schedule?"
//!
//! States are waypoints at an arrival time and heading. Each expansion turns
//! the vehicle in place and drives it down one lane, inserting a wait first
//! when it is sitting on a holding point and the lane is busy.

mod config;
mod kinematics;
mod search;


pub use config::{InvalidConfig, PlannerConfig};
pub use search::{Options, PlanError, PlanRequest, PlanResult, Planner};
