//! HTTP route handlers.

use axum::body::Bytes;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::conflict::{ConflictOracle, DetectConflict};
use crate::domain::{ProfileHandle, Trajectory, TrajectoryError};
use crate::planner::{Options, PlanError, PlanRequest, Planner};
use crate::schedule::Database;

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/plan", post(plan_trajectory))
        .route("/schedule", get(get_schedule).post(commit_trajectory))
        .route("/schedule/:entry", delete(remove_trajectory))
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Plan a trajectory for the vehicle, optionally committing it.
async fn plan_trajectory(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PlanTrajectoryResponse>, AppError> {
    // Parse JSON manually so we can log the body on failure
    let req: PlanTrajectoryRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(body = %String::from_utf8_lossy(&body), "invalid plan request: {e}");
        AppError::BadRequest {
            message: format!("Invalid JSON: {e}"),
        }
    })?;

    let start_time = match &req.start_time {
        Some(s) => parse_time(s).ok_or_else(|| AppError::BadRequest {
            message: format!("Invalid start time: {s}"),
        })?,
        None => Utc::now(),
    };

    let mut request = PlanRequest::new(
        start_time,
        req.start_waypoint,
        req.start_orientation,
        req.goal_waypoint,
    );
    if let Some(orientation) = req.goal_orientation {
        request = request.with_goal_orientation(orientation);
    }

    // The search and the commit check are CPU-bound
    let planning = state.clone();
    let commit = req.commit;
    let (result, committed) = tokio::task::spawn_blocking(move || {
        let options = Options::new(&planning.traits, &planning.graph, &planning.schedule);
        let result = Planner::new(options, &planning.config).solve(&request)?;
        let committed = match &result.trajectory {
            Some(trajectory) if commit && !trajectory.is_empty() => {
                Some(commit_if_clear(&planning.schedule, trajectory.clone()))
            }
            _ => None,
        };
        Ok::<_, PlanError>((result, committed))
    })
    .await
    .map_err(|e| AppError::Internal {
        message: format!("Planner task failed: {e}"),
    })??;

    info!(
        start = req.start_waypoint,
        goal = req.goal_waypoint,
        found = result.found(),
        states_expanded = result.states_expanded,
        "planned trajectory"
    );

    let states_expanded = result.states_expanded;
    let Some(trajectory) = result.trajectory else {
        return Ok(Json(PlanTrajectoryResponse {
            found: false,
            trajectory: None,
            states_expanded,
            schedule_entry: None,
        }));
    };

    let schedule_entry = match committed {
        Some(Some(entry)) => Some(entry),
        Some(None) => {
            return Err(AppError::Conflict {
                message: "Planned trajectory conflicts with a newer commit; plan again"
                    .to_string(),
            });
        }
        None => None,
    };

    Ok(Json(PlanTrajectoryResponse {
        found: true,
        trajectory: Some(TrajectoryResult::from_trajectory(&trajectory)),
        states_expanded,
        schedule_entry,
    }))
}

/// Commit `trajectory` unless it conflicts with what is in the schedule now.
///
/// The plan was made against an earlier snapshot, so anything committed
/// since then is checked here.
fn commit_if_clear(schedule: &Database, trajectory: Trajectory) -> Option<u64> {
    let oracle = DetectConflict::default();
    schedule.insert_if(trajectory, |candidate, current| {
        current
            .iter()
            .all(|other| oracle.between(candidate, other).is_empty())
    })
}

/// Every committed trajectory.
async fn get_schedule(State(state): State<AppState>) -> Json<ScheduleResponse> {
    let (version, entries) = state.schedule.entries();
    let trajectories = entries
        .iter()
        .map(|(entry, trajectory)| ScheduleEntryResult {
            entry: *entry,
            trajectory: TrajectoryResult::from_trajectory(trajectory),
        })
        .collect();

    Json(ScheduleResponse {
        version,
        trajectories,
    })
}

/// Commit a trajectory planned elsewhere.
async fn commit_trajectory(
    State(state): State<AppState>,
    Json(req): Json<CommitRequest>,
) -> Result<Json<CommitResponse>, AppError> {
    if req.segments.is_empty() {
        return Err(AppError::BadRequest {
            message: "Trajectory has no segments".to_string(),
        });
    }

    let profile = match req.profile {
        Some(profile) => ProfileHandle::new(profile),
        None => ProfileHandle::strict(state.traits.profile.shape()),
    };

    let mut trajectory = Trajectory::new(req.map_name);
    for segment in &req.segments {
        let time = segment.parse_time().ok_or_else(|| AppError::BadRequest {
            message: format!("Invalid segment time: {}", segment.time),
        })?;
        let result = trajectory.insert(
            time,
            profile.clone(),
            segment.position(),
            segment.velocity(),
        );
        if !result.inserted {
            return Err(TrajectoryError::TimeConflict { time }.into());
        }
    }

    let entry = state.schedule.insert(trajectory);
    info!(entry, "committed trajectory");
    Ok(Json(CommitResponse { entry }))
}

/// Withdraw a committed trajectory.
async fn remove_trajectory(
    State(state): State<AppState>,
    Path(entry): Path<u64>,
) -> Result<StatusCode, AppError> {
    state
        .schedule
        .remove(entry)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| AppError::NotFound {
            message: format!("Schedule entry {entry} not found"),
        })
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest { message: String },
    NotFound { message: String },
    Conflict { message: String },
    Internal { message: String },
}

impl From<PlanError> for AppError {
    fn from(e: PlanError) -> Self {
        match e {
            PlanError::UnknownWaypoint(_) => AppError::NotFound {
                message: e.to_string(),
            },
            PlanError::InvalidRequest(_) => AppError::BadRequest {
                message: e.to_string(),
            },
            // The server's own vehicle or search settings are misconfigured
            PlanError::InvalidTraits(_) | PlanError::InvalidConfig(_) => AppError::Internal {
                message: e.to_string(),
            },
        }
    }
}

impl From<TrajectoryError> for AppError {
    fn from(e: TrajectoryError) -> Self {
        AppError::BadRequest {
            message: e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest { message } => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound { message } => (StatusCode::NOT_FOUND, message),
            AppError::Conflict { message } => (StatusCode::CONFLICT, message),
            AppError::Internal { message } => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        if status.is_server_error() {
            error!(%status, "{message}");
        } else {
            warn!(%status, "{message}");
        }

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{InvalidConfig, PlannerConfig};
    use crate::scenario::Scenario;

    const SCENARIO: &str = r#"{
        "waypoints": [
            { "map": "L1", "location": [0.0, 0.0] },
            { "map": "L1", "location": [5.0, 0.0], "holding": true },
            { "map": "L1", "location": [5.0, 5.0] }
        ],
        "lanes": [
            { "from": 0, "to": 1, "bidirectional": true },
            { "from": 1, "to": 2, "bidirectional": true }
        ],
        "vehicle": {
            "linear": { "velocity": 0.7, "acceleration": 0.3 },
            "rotational": { "velocity": 1.0, "acceleration": 0.45 },
            "footprint": { "type": "circle", "radius": 1.0 }
        }
    }"#;

    fn make_state() -> AppState {
        let scenario = Scenario::from_json(SCENARIO).unwrap();
        AppState::new(scenario, PlannerConfig::default(), Database::new())
    }

    async fn plan(state: &AppState, body: &'static str) -> Result<PlanTrajectoryResponse, AppError> {
        plan_trajectory(State(state.clone()), Bytes::from_static(body.as_bytes()))
            .await
            .map(|Json(response)| response)
    }

    #[tokio::test]
    async fn health_is_ok() {
        assert_eq!(health().await, "ok");
    }

    #[tokio::test]
    async fn plan_finds_route_without_committing() {
        let state = make_state();
        let response = plan(
            &state,
            r#"{"start_waypoint":0,"start_orientation":0.0,"goal_waypoint":2,
                "start_time":"2024-03-15T10:00:00Z"}"#,
        )
        .await
        .unwrap();

        assert!(response.found);
        assert_eq!(response.schedule_entry, None);
        let trajectory = response.trajectory.unwrap();
        assert_eq!(trajectory.map_name, "L1");
        assert_eq!(trajectory.segments[0].time, "2024-03-15T10:00:00.000Z");
        let last = trajectory.segments.last().unwrap();
        assert!((last.position[0] - 5.0).abs() < 1e-9);
        assert!((last.position[1] - 5.0).abs() < 1e-9);
        assert!(state.schedule.is_empty());
    }

    #[tokio::test]
    async fn plan_with_commit_inserts_into_schedule() {
        let state = make_state();
        let response = plan(
            &state,
            r#"{"start_waypoint":0,"start_orientation":0.0,"goal_waypoint":1,
                "start_time":"2024-03-15T10:00:00Z","commit":true}"#,
        )
        .await
        .unwrap();

        assert_eq!(response.schedule_entry, Some(0));
        let Json(schedule) = get_schedule(State(state.clone())).await;
        assert_eq!(schedule.version, 1);
        assert_eq!(schedule.trajectories.len(), 1);
        assert_eq!(
            schedule.trajectories[0].trajectory.segments,
            response.trajectory.unwrap().segments
        );
    }

    #[tokio::test]
    async fn stale_plan_is_not_committed_over_a_newer_one() {
        let state = make_state();

        // Planned against the empty schedule, before anything else commits
        let options = Options::new(&state.traits, &state.graph, &state.schedule);
        let request = PlanRequest::new(parse_time("2024-03-15T10:00:00Z").unwrap(), 0, 0.0, 1);
        let stale = Planner::new(options, &state.config)
            .solve(&request)
            .unwrap()
            .trajectory
            .unwrap();
        assert!(!stale.is_empty());

        let response = plan(
            &state,
            r#"{"start_waypoint":0,"start_orientation":0.0,"goal_waypoint":1,
                "start_time":"2024-03-15T10:00:00Z","commit":true}"#,
        )
        .await
        .unwrap();
        assert_eq!(response.schedule_entry, Some(0));

        assert_eq!(commit_if_clear(&state.schedule, stale.clone()), None);
        assert_eq!(state.schedule.len(), 1);
        assert_eq!(state.schedule.version(), 1);

        state.schedule.remove(0).unwrap();
        assert_eq!(commit_if_clear(&state.schedule, stale), Some(1));
    }

    #[tokio::test]
    async fn trivial_plan_is_not_committed() {
        let state = make_state();
        let response = plan(
            &state,
            r#"{"start_waypoint":1,"start_orientation":0.0,"goal_waypoint":1,"commit":true}"#,
        )
        .await
        .unwrap();

        assert!(response.found);
        assert!(response.trajectory.unwrap().segments.is_empty());
        assert_eq!(response.schedule_entry, None);
        assert!(state.schedule.is_empty());
    }

    #[tokio::test]
    async fn plan_errors_map_to_status() {
        let state = make_state();

        let err = plan(
            &state,
            r#"{"start_waypoint":0,"start_orientation":0.0,"goal_waypoint":7}"#,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));

        let err = plan(&state, r#"{"start_waypoint":0}"#).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest { .. }));

        let err = plan(
            &state,
            r#"{"start_waypoint":0,"start_orientation":0.0,"goal_waypoint":1,
                "start_time":"yesterday"}"#,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest { .. }));
    }

    fn commit_request(times: &[&str]) -> CommitRequest {
        CommitRequest {
            map_name: "L1".to_string(),
            segments: times
                .iter()
                .enumerate()
                .map(|(i, time)| SegmentResult {
                    time: time.to_string(),
                    position: [i as f64, 0.0, 0.0],
                    velocity: [0.0; 3],
                })
                .collect(),
            profile: None,
        }
    }

    #[tokio::test]
    async fn commit_then_remove() {
        let state = make_state();
        let Json(response) = commit_trajectory(
            State(state.clone()),
            Json(commit_request(&["2024-03-15T10:00:00Z", "2024-03-15T10:00:05Z"])),
        )
        .await
        .unwrap();

        let committed = state.schedule.get(response.entry).unwrap();
        assert_eq!(committed.len(), 2);
        let profile = committed.first().unwrap().profile();
        assert_eq!(profile.shape(), state.traits.profile.shape());
        assert!(!profile.ptr_eq(&state.traits.profile));

        let status = remove_trajectory(State(state.clone()), Path(response.entry))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = remove_trajectory(State(state.clone()), Path(response.entry))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn commit_rejects_bad_segments() {
        let state = make_state();

        let err = commit_trajectory(State(state.clone()), Json(commit_request(&[])))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest { .. }));

        let err = commit_trajectory(
            State(state.clone()),
            Json(commit_request(&["2024-03-15T10:00:00Z", "2024-03-15T11:00:00+01:00"])),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest { .. }));

        let err = commit_trajectory(State(state.clone()), Json(commit_request(&["noon"])))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest { .. }));

        assert!(state.schedule.is_empty());
    }

    #[test]
    fn error_status_codes() {
        let cases = [
            (
                AppError::BadRequest { message: "a".into() },
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::NotFound { message: "b".into() },
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::Conflict { message: "d".into() },
                StatusCode::CONFLICT,
            ),
            (
                AppError::Internal { message: "c".into() },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn plan_errors_convert() {
        assert!(matches!(
            AppError::from(PlanError::UnknownWaypoint(3)),
            AppError::NotFound { .. }
        ));
        assert!(matches!(
            AppError::from(PlanError::InvalidRequest("x".into())),
            AppError::BadRequest { .. }
        ));
        assert!(matches!(
            AppError::from(PlanError::InvalidConfig(InvalidConfig {
                field: "heading tolerance",
                value: 0.0,
            })),
            AppError::Internal { .. }
        ));
    }
}
