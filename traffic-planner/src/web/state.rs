//! Application state for the web layer.

use std::sync::Arc;

use crate::graph::Graph;
use crate::planner::PlannerConfig;
use crate::scenario::Scenario;
use crate::schedule::Database;
use crate::vehicle::VehicleTraits;

/// Shared application state.
///
/// Contains everything the handlers need to plan and to commit.
#[derive(Clone)]
pub struct AppState {
    /// Navigation graph
    pub graph: Arc<Graph>,

    /// The vehicle being planned for
    pub traits: Arc<VehicleTraits>,

    /// Search tuning
    pub config: Arc<PlannerConfig>,

    /// Committed trajectories
    pub schedule: Database,
}

impl AppState {
    /// Create a new app state.
    pub fn new(scenario: Scenario, config: PlannerConfig, schedule: Database) -> Self {
        Self {
            graph: Arc::new(scenario.graph),
            traits: Arc::new(scenario.traits),
            config: Arc::new(config),
            schedule,
        }
    }
}
