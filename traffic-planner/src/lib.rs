//! Fleet traffic planner.
//!
//! Plans collision-free trajectories for mobile robots sharing a navigation
//! graph: "How does this vehicle get from here to there without running into
//! anything already on the schedule?"

pub mod conflict;
pub mod domain;
pub mod graph;
pub mod planner;
pub mod scenario;
pub mod schedule;
pub mod vehicle;
pub mod web;
