//! Web layer for the traffic planner.
//!
//! Provides HTTP endpoints for planning trajectories and for reading and
//! writing the schedule.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::AppState;
