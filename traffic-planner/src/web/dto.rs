//! Data transfer objects for web requests and responses.

use chrono::{DateTime, SecondsFormat, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::domain::{Profile, Segment, Time, Trajectory};

/// Request to plan a trajectory.
#[derive(Debug, Deserialize)]
pub struct PlanTrajectoryRequest {
    /// Waypoint the vehicle starts on
    pub start_waypoint: usize,

    /// Vehicle heading at the start, in radians
    pub start_orientation: f64,

    /// Waypoint to finish on
    pub goal_waypoint: usize,

    /// Required heading at the goal, if any
    pub goal_orientation: Option<f64>,

    /// RFC 3339 start time (defaults to now)
    pub start_time: Option<String>,

    /// Insert the planned trajectory into the schedule
    #[serde(default)]
    pub commit: bool,
}

/// Response for trajectory planning.
#[derive(Debug, Serialize)]
pub struct PlanTrajectoryResponse {
    /// Whether a trajectory was found
    pub found: bool,

    /// The planned trajectory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<TrajectoryResult>,

    /// Number of search states expanded
    pub states_expanded: usize,

    /// Schedule entry id, when the trajectory was committed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_entry: Option<u64>,
}

/// One segment of a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentResult {
    /// RFC 3339 finish time
    pub time: String,

    /// x, y, heading
    pub position: [f64; 3],

    /// vx, vy, angular velocity
    pub velocity: [f64; 3],
}

/// A trajectory on one map.
#[derive(Debug, Serialize)]
pub struct TrajectoryResult {
    pub map_name: String,
    pub segments: Vec<SegmentResult>,
}

/// A committed schedule entry.
#[derive(Debug, Serialize)]
pub struct ScheduleEntryResult {
    pub entry: u64,
    pub trajectory: TrajectoryResult,
}

/// Response for a schedule query.
#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    /// Bumped on every insert or removal
    pub version: u64,
    pub trajectories: Vec<ScheduleEntryResult>,
}

/// Request to commit a trajectory to the schedule.
#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    pub map_name: String,
    pub segments: Vec<SegmentResult>,

    /// Footprint and agency of the committing vehicle (defaults to a strict
    /// copy of the planner's own footprint)
    pub profile: Option<Profile>,
}

/// Response for a commit.
#[derive(Debug, Serialize)]
pub struct CommitResponse {
    pub entry: u64,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

// Conversion implementations

impl SegmentResult {
    /// Create from a trajectory segment.
    pub fn from_segment(segment: &Segment<'_>) -> Self {
        let position = segment.finish_position();
        let velocity = segment.finish_velocity();
        Self {
            time: format_time(segment.finish_time()),
            position: [position.x, position.y, position.z],
            velocity: [velocity.x, velocity.y, velocity.z],
        }
    }

    /// Parse the finish time.
    pub fn parse_time(&self) -> Option<Time> {
        parse_time(&self.time)
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::from(self.position)
    }

    pub fn velocity(&self) -> Vector3<f64> {
        Vector3::from(self.velocity)
    }
}

impl TrajectoryResult {
    /// Create from a domain Trajectory.
    pub fn from_trajectory(trajectory: &Trajectory) -> Self {
        Self {
            map_name: trajectory.map_name().to_string(),
            segments: trajectory.iter().map(|s| SegmentResult::from_segment(&s)).collect(),
        }
    }
}

/// Format a time as RFC 3339 with millisecond precision.
pub fn format_time(time: Time) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 time in any offset.
pub fn parse_time(s: &str) -> Option<Time> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
