use std::net::SocketAddr;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use traffic_planner::planner::PlannerConfig;
use traffic_planner::scenario::Scenario;
use traffic_planner::schedule::Database;
use traffic_planner::web::{AppState, create_router};

/// Default listen address.
const DEFAULT_BIND: &str = "127.0.0.1:3000";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Ok(path) = std::env::var("TRAFFIC_SCENARIO") else {
        error!("TRAFFIC_SCENARIO not set; it must name a scenario JSON file");
        return ExitCode::FAILURE;
    };
    let scenario = match Scenario::from_path(&path) {
        Ok(scenario) => scenario,
        Err(e) => {
            error!("Failed to load scenario: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        path = %path,
        waypoints = scenario.graph.num_waypoints(),
        lanes = scenario.graph.num_lanes(),
        "loaded scenario"
    );

    let bind = std::env::var("TRAFFIC_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let addr: SocketAddr = match bind.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid TRAFFIC_BIND {bind}: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Build app state
    let state = AppState::new(scenario, PlannerConfig::default(), Database::new());
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {addr}: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!("Traffic planner listening on http://{addr}");
    info!("  GET    /health          - Health check");
    info!("  POST   /plan            - Plan a trajectory");
    info!("  GET    /schedule        - Committed trajectories");
    info!("  POST   /schedule        - Commit a trajectory");
    info!("  DELETE /schedule/:entry - Withdraw a trajectory");

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
