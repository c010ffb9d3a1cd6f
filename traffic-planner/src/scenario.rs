//! Scenario files: a navigation graph plus the vehicle that drives it.
//!
//! ```json
//! {
//!   "waypoints": [
//!     { "map": "L1", "location": [0.0, 0.0] },
//!     { "map": "L1", "location": [5.0, 0.0], "holding": true }
//!   ],
//!   "lanes": [
//!     { "from": 0, "to": 1, "bidirectional": true,
//!       "orientation": { "acceptable": [0.0] } }
//!   ],
//!   "vehicle": {
//!     "linear": { "velocity": 0.7, "acceleration": 0.3 },
//!     "rotational": { "velocity": 1.0, "acceleration": 0.45 },
//!     "footprint": { "type": "circle", "radius": 1.0 }
//!   }
//! }
//! ```

use std::path::{Path, PathBuf};

use nalgebra::Vector2;
use serde::Deserialize;
use tracing::debug;

use crate::domain::{Agency, Profile, ProfileHandle, Shape};
use crate::graph::{Graph, GraphError, OrientationConstraint};
use crate::vehicle::{InvalidTraits, Limits, VehicleTraits};

/// Error from loading a scenario.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid scenario JSON
    #[error("invalid scenario: {0}")]
    Parse(#[from] serde_json::Error),

    /// The waypoints and lanes do not form a valid graph
    #[error("invalid graph: {0}")]
    Graph(#[from] GraphError),

    /// The vehicle limits are unusable
    #[error("invalid vehicle: {0}")]
    Traits(#[from] InvalidTraits),

    /// The footprint has a non-positive or non-finite dimension
    #[error("invalid vehicle footprint")]
    Footprint,
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    waypoints: Vec<WaypointEntry>,
    #[serde(default)]
    lanes: Vec<LaneEntry>,
    vehicle: VehicleEntry,
}

#[derive(Debug, Deserialize)]
struct WaypointEntry {
    map: String,
    location: [f64; 2],
    #[serde(default)]
    holding: bool,
}

#[derive(Debug, Deserialize)]
struct LaneEntry {
    from: usize,
    to: usize,
    #[serde(default)]
    orientation: Option<OrientationConstraint>,
    #[serde(default)]
    bidirectional: bool,
}

#[derive(Debug, Deserialize)]
struct VehicleEntry {
    linear: Limits,
    rotational: Limits,
    footprint: Shape,
    #[serde(default = "strict")]
    agency: Agency,
}

fn strict() -> Agency {
    Agency::Strict
}

/// A loaded scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub graph: Graph,
    pub traits: VehicleTraits,
}

impl Scenario {
    /// Load a scenario from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let scenario = Self::from_json(&json)?;
        debug!(
            path = %path.display(),
            waypoints = scenario.graph.num_waypoints(),
            lanes = scenario.graph.num_lanes(),
            "loaded scenario"
        );
        Ok(scenario)
    }

    /// Parse a scenario from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: ScenarioFile = serde_json::from_str(json)?;

        let mut graph = Graph::new();
        for waypoint in &file.waypoints {
            let [x, y] = waypoint.location;
            graph.add_waypoint(&waypoint.map, Vector2::new(x, y), waypoint.holding)?;
        }
        for lane in file.lanes {
            if lane.bidirectional {
                graph.add_bidirectional_lane(lane.from, lane.to, lane.orientation)?;
            } else {
                graph.add_lane(lane.from, lane.to, lane.orientation)?;
            }
        }

        let vehicle = file.vehicle;
        if !vehicle.footprint.is_valid() {
            return Err(ConfigError::Footprint);
        }
        let profile = ProfileHandle::new(Profile::new(vehicle.footprint, vehicle.agency));
        let traits = VehicleTraits::new(vehicle.linear, vehicle.rotational, profile);
        traits.validate()?;

        Ok(Self { graph, traits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCENARIO: &str = r#"{
        "waypoints": [
            { "map": "L1", "location": [0.0, 0.0] },
            { "map": "L1", "location": [5.0, 0.0], "holding": true },
            { "map": "L1", "location": [5.0, 5.0] }
        ],
        "lanes": [
            { "from": 0, "to": 1, "bidirectional": true },
            { "from": 1, "to": 2, "orientation": { "direction": "backward" } }
        ],
        "vehicle": {
            "linear": { "velocity": 0.7, "acceleration": 0.3 },
            "rotational": { "velocity": 1.0, "acceleration": 0.45 },
            "footprint": { "type": "circle", "radius": 1.0 }
        }
    }"#;

    #[test]
    fn parses_graph_and_vehicle() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();

        assert_eq!(scenario.graph.num_waypoints(), 3);
        assert_eq!(scenario.graph.num_lanes(), 3);
        assert!(scenario.graph.get_waypoint(1).unwrap().is_holding_point());
        assert!(!scenario.graph.get_waypoint(0).unwrap().is_holding_point());
        assert!(scenario.graph.lanes_from(1).any(|l| l.orientation().is_some()));

        assert_eq!(scenario.traits.linear, Limits::new(0.7, 0.3));
        assert_eq!(scenario.traits.profile.shape(), Shape::circle(1.0));
        assert_eq!(scenario.traits.profile.agency(), Agency::Strict);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCENARIO.as_bytes()).unwrap();

        let scenario = Scenario::from_path(file.path()).unwrap();
        assert_eq!(scenario.graph.num_waypoints(), 3);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Scenario::from_path(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().starts_with("failed to read"));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = Scenario::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn lane_to_missing_waypoint_is_graph_error() {
        let json = SCENARIO.replace(r#""from": 1, "to": 2"#, r#""from": 1, "to": 9"#);
        let err = Scenario::from_json(&json).unwrap_err();
        assert!(matches!(err, ConfigError::Graph(GraphError::UnknownWaypoint(9))));
    }

    #[test]
    fn bad_vehicle_is_rejected() {
        let json = SCENARIO.replace(r#""radius": 1.0"#, r#""radius": 0.0"#);
        assert!(matches!(
            Scenario::from_json(&json).unwrap_err(),
            ConfigError::Footprint
        ));

        let json = SCENARIO.replace(r#""velocity": 0.7"#, r#""velocity": -0.7"#);
        assert!(matches!(
            Scenario::from_json(&json).unwrap_err(),
            ConfigError::Traits(_)
        ));
    }

    #[test]
    fn agency_can_be_set() {
        let json = SCENARIO.replace(
            r#""footprint": { "type": "circle", "radius": 1.0 }"#,
            r#""footprint": { "type": "circle", "radius": 1.0 },
               "agency": { "type": "queued", "queue_id": "lift" }"#,
        );
        let scenario = Scenario::from_json(&json).unwrap();
        assert_eq!(scenario.traits.profile.queue_id().as_deref(), Some("lift"));
    }
}
