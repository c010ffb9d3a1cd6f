//! Navigation graph for automated vehicles.
//!
//! Waypoints are the places a vehicle can stop; lanes are the directed
//! connections it may drive along. A lane may restrict the heading the
//! vehicle holds while on it, which is how reverse-only or face-forward
//! corridors are expressed.

use std::f64::consts::PI;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::domain::{angle_difference, wrap_angle};

/// Error from building a graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// A lane refers to a waypoint that was never added
    #[error("lane refers to unknown waypoint {0}")]
    UnknownWaypoint(usize),

    /// A lane starts and ends at the same waypoint
    #[error("lane from waypoint {0} to itself")]
    SelfLoop(usize),

    /// A waypoint location is not a finite point
    #[error("waypoint location is not finite")]
    InvalidLocation,
}

/// A place on a map where a vehicle may stop.
#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    index: usize,
    map_name: String,
    location: Vector2<f64>,
    is_holding_point: bool,
}

impl Waypoint {
    /// Position of this waypoint in the graph.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Map the waypoint is on.
    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    /// Location in map coordinates.
    pub fn location(&self) -> Vector2<f64> {
        self.location
    }

    /// Whether a vehicle may wait here for traffic to clear.
    pub fn is_holding_point(&self) -> bool {
        self.is_holding_point
    }
}

/// Which way a vehicle faces relative to the lane it travels along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

/// Restriction on the heading held while traversing a lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationConstraint {
    /// The vehicle must hold one of these absolute headings. An empty set
    /// places no restriction.
    Acceptable(Vec<f64>),

    /// The vehicle must face along, or against, the lane.
    Direction(Direction),
}

impl OrientationConstraint {
    /// Constraint allowing a single absolute heading.
    pub fn heading(heading: f64) -> Self {
        Self::Acceptable(vec![heading])
    }
}

/// A directed connection between two waypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Lane {
    from: usize,
    to: usize,
    orientation: Option<OrientationConstraint>,
}

impl Lane {
    pub fn from(&self) -> usize {
        self.from
    }

    pub fn to(&self) -> usize {
        self.to
    }

    pub fn orientation(&self) -> Option<&OrientationConstraint> {
        self.orientation.as_ref()
    }

    /// Headings a differential-drive vehicle may hold along this lane.
    ///
    /// `course` is the direction of travel. A heading is only usable if it
    /// is parallel (forward driving) or antiparallel (reverse driving) to
    /// the course within `tolerance`; constraint headings that are neither
    /// are dropped, which may leave no way to use the lane at all.
    pub fn traversal_headings(&self, course: f64, tolerance: f64) -> Vec<f64> {
        let reverse = wrap_angle(course + PI);
        match &self.orientation {
            None => vec![wrap_angle(course)],
            Some(OrientationConstraint::Acceptable(headings)) if headings.is_empty() => {
                vec![wrap_angle(course)]
            }
            Some(OrientationConstraint::Acceptable(headings)) => {
                let mut usable: Vec<f64> = Vec::new();
                for &heading in headings {
                    let parallel = angle_difference(course, heading).abs() <= tolerance;
                    let antiparallel = angle_difference(reverse, heading).abs() <= tolerance;
                    if (parallel || antiparallel)
                        && !usable
                            .iter()
                            .any(|h| angle_difference(*h, heading).abs() <= tolerance)
                    {
                        usable.push(wrap_angle(heading));
                    }
                }
                usable
            }
            Some(OrientationConstraint::Direction(Direction::Forward)) => vec![wrap_angle(course)],
            Some(OrientationConstraint::Direction(Direction::Backward)) => vec![reverse],
        }
    }
}

/// Waypoints and the lanes between them.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    waypoints: Vec<Waypoint>,
    lanes: Vec<Lane>,
    /// Outgoing lane indices per waypoint.
    outgoing: Vec<Vec<usize>>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a waypoint and return its index.
    pub fn add_waypoint(
        &mut self,
        map_name: impl Into<String>,
        location: Vector2<f64>,
        is_holding_point: bool,
    ) -> Result<usize, GraphError> {
        if !location.iter().all(|c| c.is_finite()) {
            return Err(GraphError::InvalidLocation);
        }
        let index = self.waypoints.len();
        self.waypoints.push(Waypoint {
            index,
            map_name: map_name.into(),
            location,
            is_holding_point,
        });
        self.outgoing.push(Vec::new());
        Ok(index)
    }

    /// Add a directed lane and return its index.
    pub fn add_lane(
        &mut self,
        from: usize,
        to: usize,
        orientation: Option<OrientationConstraint>,
    ) -> Result<usize, GraphError> {
        for waypoint in [from, to] {
            if waypoint >= self.waypoints.len() {
                return Err(GraphError::UnknownWaypoint(waypoint));
            }
        }
        if from == to {
            return Err(GraphError::SelfLoop(from));
        }

        let index = self.lanes.len();
        self.lanes.push(Lane {
            from,
            to,
            orientation,
        });
        self.outgoing[from].push(index);
        Ok(index)
    }

    /// Add lanes in both directions with the same constraint.
    pub fn add_bidirectional_lane(
        &mut self,
        a: usize,
        b: usize,
        orientation: Option<OrientationConstraint>,
    ) -> Result<(usize, usize), GraphError> {
        let forward = self.add_lane(a, b, orientation.clone())?;
        let backward = self.add_lane(b, a, orientation)?;
        Ok((forward, backward))
    }

    pub fn num_waypoints(&self) -> usize {
        self.waypoints.len()
    }

    pub fn num_lanes(&self) -> usize {
        self.lanes.len()
    }

    pub fn get_waypoint(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    pub fn get_lane(&self, index: usize) -> Option<&Lane> {
        self.lanes.get(index)
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Lanes leaving a waypoint. Empty for unknown waypoints.
    pub fn lanes_from(&self, waypoint: usize) -> impl Iterator<Item = &Lane> + '_ {
        self.outgoing
            .get(waypoint)
            .into_iter()
            .flatten()
            .filter_map(|&lane| self.lanes.get(lane))
    }

    /// Whether any sequence of lanes leads from `from` to `to`.
    pub fn is_reachable(&self, from: usize, to: usize) -> bool {
        if from >= self.waypoints.len() || to >= self.waypoints.len() {
            return false;
        }
        let mut visited = vec![false; self.waypoints.len()];
        let mut queue = std::collections::VecDeque::from([from]);
        visited[from] = true;

        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            for lane in self.lanes_from(current) {
                if !visited[lane.to] {
                    visited[lane.to] = true;
                    queue.push_back(lane.to);
                }
            }
        }
        false
    }
}
