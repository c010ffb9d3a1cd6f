//! Time-expanded best-first trajectory search.
//!
//! Finds a trajectory from a start waypoint to a goal waypoint that keeps
//! clear of every trajectory already in the schedule, waiting at holding
//! points when the way ahead is temporarily blocked.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use chrono::Duration;
use nalgebra::{Vector2, Vector3};
use tracing::{debug, trace};

use crate::conflict::{ConflictInterval, ConflictOracle, DetectConflict};
use crate::domain::{Time, TimedState, Trajectory, angle_difference, wrap_angle};
use crate::graph::Graph;
use crate::schedule::{Query, Schedule};
use crate::vehicle::{InvalidTraits, VehicleTraits};

use super::config::{InvalidConfig, PlannerConfig};
use super::kinematics::{rotate, translate, travel_time_lower_bound, wait};

/// Error from trajectory planning.
///
/// Only malformed input is an error. A goal that cannot be reached is a
/// successful search with no trajectory.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    /// A waypoint index is not in the graph
    #[error("unknown waypoint {0}")]
    UnknownWaypoint(usize),

    /// The vehicle's limits cannot be planned with
    #[error("invalid vehicle traits: {0}")]
    InvalidTraits(#[from] InvalidTraits),

    /// Invalid plan request
    #[error("invalid plan request: {0}")]
    InvalidRequest(String),

    /// The planner configuration cannot be searched with
    #[error("invalid planner config: {0}")]
    InvalidConfig(#[from] InvalidConfig),
}

/// What to plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    /// When the vehicle sets off.
    pub start_time: Time,

    /// Waypoint the vehicle is parked on.
    pub start_waypoint: usize,

    /// Heading the vehicle is facing at the start (radians).
    pub start_orientation: f64,

    /// Waypoint to reach.
    pub goal_waypoint: usize,

    /// Heading required on arrival, if any.
    pub goal_orientation: Option<f64>,
}

impl PlanRequest {
    /// Create a request with no goal orientation.
    pub fn new(
        start_time: Time,
        start_waypoint: usize,
        start_orientation: f64,
        goal_waypoint: usize,
    ) -> Self {
        Self {
            start_time,
            start_waypoint,
            start_orientation,
            goal_waypoint,
            goal_orientation: None,
        }
    }

    /// Require the vehicle to face `orientation` on arrival.
    pub fn with_goal_orientation(mut self, orientation: f64) -> Self {
        self.goal_orientation = Some(orientation);
        self
    }

    /// Validate the request against the graph.
    pub fn validate(&self, graph: &Graph) -> Result<(), PlanError> {
        for waypoint in [self.start_waypoint, self.goal_waypoint] {
            if graph.get_waypoint(waypoint).is_none() {
                return Err(PlanError::UnknownWaypoint(waypoint));
            }
        }
        if !self.start_orientation.is_finite() {
            return Err(PlanError::InvalidRequest(
                "start orientation is not finite".to_string(),
            ));
        }
        if self.goal_orientation.is_some_and(|o| !o.is_finite()) {
            return Err(PlanError::InvalidRequest(
                "goal orientation is not finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything the planner reads while solving.
pub struct Options<'a, S> {
    pub traits: &'a VehicleTraits,
    pub graph: &'a Graph,
    pub schedule: &'a S,
}

impl<'a, S> Options<'a, S> {
    pub fn new(traits: &'a VehicleTraits, graph: &'a Graph, schedule: &'a S) -> Self {
        Self {
            traits,
            graph,
            schedule,
        }
    }
}

impl<S> Clone for Options<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Options<'_, S> {}

/// Result of a solve.
#[derive(Debug, Clone)]
pub struct PlanResult {
    /// The planned trajectory, or `None` if the goal cannot be reached.
    pub trajectory: Option<Trajectory>,

    /// Number of search states expanded.
    pub states_expanded: usize,
}

impl PlanResult {
    /// Whether a trajectory was found.
    pub fn found(&self) -> bool {
        self.trajectory.is_some()
    }

    fn not_found(states_expanded: usize) -> Self {
        Self {
            trajectory: None,
            states_expanded,
        }
    }
}

/// A search state: the vehicle at rest on a waypoint.
#[derive(Debug, Clone)]
struct Node {
    waypoint: usize,
    arrival: TimedState,
    parent: Option<usize>,
    /// States produced by the expansion that led here, after the parent's
    /// arrival state.
    segments: Vec<TimedState>,
}

impl Node {
    fn heading(&self) -> f64 {
        self.arrival.position[2]
    }
}

/// Frontier entry ordered so the lowest priority pops first.
#[derive(Debug, PartialEq, Eq)]
struct Frontier {
    priority: Duration,
    node: usize,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Key identifying states that need not be expanded twice.
///
/// Before the schedule goes quiet, arriving later may be worse or better
/// depending on traffic, so the arrival time is part of the key. Afterwards
/// only the earliest arrival matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct VisitKey {
    waypoint: usize,
    heading: i64,
    time: Option<i64>,
}

/// Immutable per-solve context.
struct Search<'r> {
    request: &'r PlanRequest,
    map_name: String,
    snapshot: Vec<Arc<Trajectory>>,
    /// Finish time of the last scheduled trajectory.
    horizon: Option<Time>,
}

/// Trajectory planner over a navigation graph.
pub struct Planner<'a, S: Schedule, O: ConflictOracle = DetectConflict> {
    options: Options<'a, S>,
    config: &'a PlannerConfig,
    oracle: O,
}

impl<'a, S: Schedule> Planner<'a, S, DetectConflict> {
    /// Create a planner using the default sampling conflict detector.
    pub fn new(options: Options<'a, S>, config: &'a PlannerConfig) -> Self {
        Self::with_oracle(options, config, DetectConflict::default())
    }
}

impl<'a, S: Schedule, O: ConflictOracle> Planner<'a, S, O> {
    /// Create a planner with a custom conflict oracle.
    pub fn with_oracle(options: Options<'a, S>, config: &'a PlannerConfig, oracle: O) -> Self {
        Self {
            options,
            config,
            oracle,
        }
    }

    /// Plan a trajectory for `request`.
    ///
    /// The schedule is read once, at the start. The returned trajectory is
    /// new; nothing in the schedule or the graph is modified.
    pub fn solve(&self, request: &PlanRequest) -> Result<PlanResult, PlanError> {
        self.options.traits.validate()?;
        self.config.validate()?;
        request.validate(self.options.graph)?;

        let graph = self.options.graph;
        let start = graph
            .get_waypoint(request.start_waypoint)
            .ok_or(PlanError::UnknownWaypoint(request.start_waypoint))?;
        let map_name = start.map_name().to_string();
        let location = start.location();
        let initial = TimedState::at_rest(
            request.start_time,
            Vector3::new(
                location.x,
                location.y,
                wrap_angle(request.start_orientation),
            ),
        );

        debug!(
            start = request.start_waypoint,
            goal = request.goal_waypoint,
            map = %map_name,
            "planning trajectory"
        );

        if self.satisfies_goal(request, request.start_waypoint, initial.position[2]) {
            debug!("start already satisfies goal");
            return Ok(PlanResult {
                trajectory: Some(Trajectory::new(map_name)),
                states_expanded: 0,
            });
        }

        if !graph.is_reachable(request.start_waypoint, request.goal_waypoint) {
            debug!("no lane path to goal");
            return Ok(PlanResult::not_found(0));
        }

        let snapshot = self.options.schedule.query(&Query::on_map(map_name.clone()));
        let horizon = snapshot.iter().filter_map(|t| t.finish_time()).max();
        let search = Search {
            request,
            map_name,
            snapshot,
            horizon,
        };

        let result = self.search(&search, initial);
        debug!(
            found = result.found(),
            states_expanded = result.states_expanded,
            "search complete"
        );
        Ok(result)
    }

    fn search(&self, search: &Search<'_>, initial: TimedState) -> PlanResult {
        let mut nodes = vec![Node {
            waypoint: search.request.start_waypoint,
            arrival: initial,
            parent: None,
            segments: Vec::new(),
        }];
        let mut frontier = BinaryHeap::from([Frontier {
            priority: self.priority(search, &nodes[0]),
            node: 0,
        }]);
        let mut closed: HashSet<VisitKey> = HashSet::new();
        let mut expanded = 0;

        while let Some(Frontier { node: index, .. }) = frontier.pop() {
            let node = nodes[index].clone();
            if !closed.insert(self.visit_key(search, &node)) {
                continue;
            }
            expanded += 1;

            if self.satisfies_goal(search.request, node.waypoint, node.heading()) {
                return PlanResult {
                    trajectory: Some(self.reconstruct(search, &nodes, index)),
                    states_expanded: expanded,
                };
            }
            if expanded >= self.config.max_expansions {
                debug!(expanded, "expansion limit reached");
                break;
            }

            trace!(
                waypoint = node.waypoint,
                heading = node.heading(),
                time = %node.arrival.time,
                "expanding"
            );

            for child in self.expand(search, &node, index) {
                let priority = self.priority(search, &child);
                nodes.push(child);
                frontier.push(Frontier {
                    priority,
                    node: nodes.len() - 1,
                });
            }
        }

        PlanResult::not_found(expanded)
    }

    /// Successor states of `node`.
    fn expand(&self, search: &Search<'_>, node: &Node, index: usize) -> Vec<Node> {
        let graph = self.options.graph;
        let traits = self.options.traits;
        let mut children = Vec::new();

        // Turn on the spot to meet the goal orientation
        if node.waypoint == search.request.goal_waypoint {
            if let Some(goal) = search.request.goal_orientation {
                let segments = rotate(&node.arrival, goal, &traits.rotational);
                if self.first_conflict(search, &node.arrival, &segments).is_none() {
                    if let Some(arrival) = segments.last().copied() {
                        children.push(Node {
                            waypoint: node.waypoint,
                            arrival,
                            parent: Some(index),
                            segments,
                        });
                    }
                }
            }
        }

        let Some(here) = graph.get_waypoint(node.waypoint) else {
            return children;
        };
        let holding = here.is_holding_point();

        for lane in graph.lanes_from(node.waypoint) {
            let Some(target) = graph.get_waypoint(lane.to()) else {
                continue;
            };
            if target.map_name() != search.map_name {
                trace!(lane_to = lane.to(), "skipping lane onto another map");
                continue;
            }

            let offset = target.location() - here.location();
            let course = offset.y.atan2(offset.x);
            for heading in lane.traversal_headings(course, self.config.heading_tolerance) {
                if let Some(segments) =
                    self.drive(search, &node.arrival, heading, target.location(), holding)
                {
                    if let Some(arrival) = segments.last().copied() {
                        children.push(Node {
                            waypoint: lane.to(),
                            arrival,
                            parent: Some(index),
                            segments,
                        });
                    }
                }
            }
        }

        children
    }

    /// Turn to `heading` then drive to `target`, waiting in between if
    /// `holding` allows it and traffic requires it.
    ///
    /// The wait is the shortest one found clear, to within the hold
    /// resolution. Returns `None` if no conflict-free variant exists.
    fn drive(
        &self,
        search: &Search<'_>,
        from: &TimedState,
        heading: f64,
        target: Vector2<f64>,
        holding: bool,
    ) -> Option<Vec<TimedState>> {
        let turn = rotate(from, heading, &self.options.traits.rotational);
        let turned = turn.last().copied().unwrap_or(*from);
        let depart = |delay: Duration| self.departure(&turn, &turned, delay, target);

        let mut segments = depart(Duration::zero());
        let Some(mut conflict) = self.first_conflict(search, from, &segments) else {
            return Some(segments);
        };
        if !holding {
            return None;
        }
        // Nothing in the snapshot moves after the horizon, so leaving then
        // is always clear
        let longest = search
            .horizon
            .map(|horizon| horizon.signed_duration_since(turned.time))
            .filter(|longest| *longest > Duration::zero())?;

        let mut blocked;
        let mut delay = Duration::zero();
        let mut attempts = 0;
        loop {
            // Traffic reaching the holding point itself cannot be waited out
            if conflict.start <= turned.time + delay || delay >= longest {
                return None;
            }
            blocked = delay;
            attempts += 1;
            delay = if attempts >= self.config.max_hold_attempts {
                longest
            } else {
                let clear = self.clearance(search, from, &segments, &conflict);
                let shift = clear
                    .signed_duration_since(conflict.start)
                    .max(self.config.hold_resolution());
                (delay + shift).min(longest)
            };
            trace!(attempts, delay_ms = delay.num_milliseconds(), "extending hold");

            segments = depart(delay);
            match self.first_conflict(search, from, &segments) {
                Some(next) => conflict = next,
                None => break,
            }
        }

        Some(self.shortest_hold(search, from, &depart, blocked, delay, segments))
    }

    /// The turn, an optional wait of `delay`, then the drive to `target`.
    fn departure(
        &self,
        turn: &[TimedState],
        turned: &TimedState,
        delay: Duration,
        target: Vector2<f64>,
    ) -> Vec<TimedState> {
        let mut segments = turn.to_vec();
        let depart = if delay > Duration::zero() {
            let waited = wait(turned, delay);
            segments.push(waited);
            waited
        } else {
            *turned
        };
        segments.extend(translate(&depart, target, &self.options.traits.linear));
        segments
    }

    /// When the traffic behind `conflict` gets out of the way.
    ///
    /// The motion is checked again with the vehicle parked on arrival until
    /// the horizon, so a blocker sitting at the far end of the lane is seen
    /// for as long as it stays there.
    fn clearance(
        &self,
        search: &Search<'_>,
        from: &TimedState,
        segments: &[TimedState],
        conflict: &ConflictInterval,
    ) -> Time {
        let (Some(arrival), Some(horizon)) = (segments.last(), search.horizon) else {
            return conflict.finish;
        };
        if horizon <= arrival.time {
            return conflict.finish;
        }
        let parked = TimedState::at_rest(horizon, arrival.position);
        let candidate = self.build_trajectory(
            &search.map_name,
            from,
            segments.iter().chain(std::iter::once(&parked)),
        );
        search
            .snapshot
            .iter()
            .flat_map(|other| self.oracle.between(&candidate, other))
            .filter(|interval| interval.start <= conflict.start && conflict.start <= interval.finish)
            .map(|interval| interval.finish)
            .fold(conflict.finish, Time::max)
    }

    /// Narrow a wait between a delay known to conflict and one known to be
    /// clear, down to the hold resolution.
    fn shortest_hold(
        &self,
        search: &Search<'_>,
        from: &TimedState,
        depart: &impl Fn(Duration) -> Vec<TimedState>,
        mut blocked: Duration,
        mut clear: Duration,
        mut segments: Vec<TimedState>,
    ) -> Vec<TimedState> {
        let resolution = self.config.hold_resolution();
        while clear - blocked > resolution {
            let middle = blocked + (clear - blocked) / 2;
            let candidate = depart(middle);
            if self.first_conflict(search, from, &candidate).is_none() {
                clear = middle;
                segments = candidate;
            } else {
                blocked = middle;
            }
        }
        trace!(hold_ms = clear.num_milliseconds(), "shortest hold");
        segments
    }

    /// Earliest conflict between the motion `from` → `segments` and the
    /// schedule snapshot.
    fn first_conflict(
        &self,
        search: &Search<'_>,
        from: &TimedState,
        segments: &[TimedState],
    ) -> Option<ConflictInterval> {
        if search.snapshot.is_empty() {
            return None;
        }
        let candidate = self.build_trajectory(&search.map_name, from, segments);
        search
            .snapshot
            .iter()
            .flat_map(|other| self.oracle.between(&candidate, other))
            .min_by_key(|interval| interval.start)
    }

    fn build_trajectory<'s>(
        &self,
        map_name: &str,
        first: &'s TimedState,
        rest: impl IntoIterator<Item = &'s TimedState>,
    ) -> Trajectory {
        let profile = &self.options.traits.profile;
        let mut trajectory = Trajectory::new(map_name);
        for state in std::iter::once(first).chain(rest) {
            trajectory.insert(state.time, profile.clone(), state.position, state.velocity);
        }
        trajectory
    }

    fn reconstruct(&self, search: &Search<'_>, nodes: &[Node], goal: usize) -> Trajectory {
        let mut chain = Vec::new();
        let mut cursor = Some(goal);
        while let Some(index) = cursor {
            chain.push(index);
            cursor = nodes[index].parent;
        }
        chain.reverse();

        let first = &nodes[chain[0]].arrival;
        let rest = chain[1..].iter().flat_map(|&i| nodes[i].segments.iter());
        self.build_trajectory(&search.map_name, first, rest)
    }

    fn satisfies_goal(&self, request: &PlanRequest, waypoint: usize, heading: f64) -> bool {
        waypoint == request.goal_waypoint
            && request.goal_orientation.is_none_or(|goal| {
                angle_difference(heading, goal).abs() <= self.config.heading_tolerance
            })
    }

    /// Elapsed time plus an optimistic estimate of the time left.
    fn priority(&self, search: &Search<'_>, node: &Node) -> Duration {
        let elapsed = node
            .arrival
            .time
            .signed_duration_since(search.request.start_time);
        let graph = self.options.graph;
        let remaining = match (
            graph.get_waypoint(node.waypoint),
            graph.get_waypoint(search.request.goal_waypoint),
        ) {
            (Some(here), Some(goal)) => {
                let distance = (goal.location() - here.location()).norm();
                travel_time_lower_bound(distance, &self.options.traits.linear)
            }
            _ => Duration::zero(),
        };
        elapsed + remaining
    }

    fn visit_key(&self, search: &Search<'_>, node: &Node) -> VisitKey {
        let heading = (wrap_angle(node.heading()) / self.config.heading_tolerance).round() as i64;
        let time = match search.horizon {
            Some(horizon) if node.arrival.time <= horizon => {
                let elapsed = node
                    .arrival
                    .time
                    .signed_duration_since(search.request.start_time);
                let bucket = self.config.time_resolution().num_milliseconds();
                Some(elapsed.num_milliseconds().div_euclid(bucket))
            }
            _ => None,
        };
        VisitKey {
            waypoint: node.waypoint,
            heading,
            time,
        }
    }
}
