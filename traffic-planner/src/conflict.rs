//! Pairwise conflict detection between trajectories.
//!
//! Two trajectories conflict while their footprints overlap. Footprints are
//! compared as bounding circles, and the trajectories are sampled on a fixed
//! time grid (plus every segment boundary) across the window in which both
//! exist.

use chrono::Duration;
use tracing::trace;

use crate::domain::{Agency, ProfileHandle, Time, Trajectory};

/// A span of time during which two trajectories overlap.
///
/// `finish` is the first sample at which they were seen clear again, or the
/// last overlapping sample if they never separated within the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictInterval {
    pub start: Time,
    pub finish: Time,
}

impl ConflictInterval {
    pub fn duration(&self) -> Duration {
        self.finish.signed_duration_since(self.start)
    }
}

/// Decides whether two trajectories conflict.
///
/// Implementations must be pure: the same pair always gives the same answer.
pub trait ConflictOracle {
    /// Conflict intervals between `a` and `b`, in time order. Empty when
    /// they never conflict.
    fn between(&self, a: &Trajectory, b: &Trajectory) -> Vec<ConflictInterval>;
}

/// Sampling conflict detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectConflict {
    sample_step: Duration,
}

impl DetectConflict {
    pub const DEFAULT_SAMPLE_STEP_MS: i64 = 100;

    /// Detector sampling every `sample_step`. Non-positive steps fall back to
    /// the default.
    pub fn new(sample_step: Duration) -> Self {
        if sample_step <= Duration::zero() {
            return Self::default();
        }
        Self { sample_step }
    }

    pub fn sample_step(&self) -> Duration {
        self.sample_step
    }

    /// First grid instant at or after `start`.
    ///
    /// The grid is anchored to the epoch rather than to the window, so any
    /// slice of a trajectory is sampled at the same instants as the whole.
    fn grid_start(&self, start: Time) -> Time {
        let (Some(step), Some(nanos)) = (
            self.sample_step.num_nanoseconds(),
            start.timestamp_nanos_opt(),
        ) else {
            return start;
        };
        start + Duration::nanoseconds((step - nanos.rem_euclid(step)) % step)
    }

    fn sample_times(&self, a: &Trajectory, b: &Trajectory, start: Time, finish: Time) -> Vec<Time> {
        let mut times = vec![start];
        let mut t = self.grid_start(start);
        while t < finish {
            times.push(t);
            t += self.sample_step;
        }
        times.push(finish);
        times.extend(
            a.iter()
                .chain(b.iter())
                .map(|s| s.finish_time())
                .filter(|t| (start..=finish).contains(t)),
        );
        times.sort_unstable();
        times.dedup();
        times
    }
}

impl Default for DetectConflict {
    fn default() -> Self {
        Self {
            sample_step: Duration::milliseconds(Self::DEFAULT_SAMPLE_STEP_MS),
        }
    }
}

impl ConflictOracle for DetectConflict {
    fn between(&self, a: &Trajectory, b: &Trajectory) -> Vec<ConflictInterval> {
        if a.map_name() != b.map_name() {
            return Vec::new();
        }
        let (Some(a_start), Some(a_finish), Some(b_start), Some(b_finish)) =
            (a.start_time(), a.finish_time(), b.start_time(), b.finish_time())
        else {
            return Vec::new();
        };
        let start = a_start.max(b_start);
        let finish = a_finish.min(b_finish);
        if start > finish {
            return Vec::new();
        }

        let mut intervals = Vec::new();
        let mut open: Option<Time> = None;
        let mut last_colliding = start;

        for time in self.sample_times(a, b, start, finish) {
            if collides_at(a, b, time) {
                open.get_or_insert(time);
                last_colliding = time;
            } else if let Some(began) = open.take() {
                intervals.push(ConflictInterval {
                    start: began,
                    finish: time,
                });
            }
        }
        if let Some(began) = open {
            intervals.push(ConflictInterval {
                start: began,
                finish: last_colliding,
            });
        }

        if !intervals.is_empty() {
            trace!(count = intervals.len(), first = %intervals[0].start, "conflicts found");
        }
        intervals
    }
}

/// Whether the profiles excuse each other from exclusive occupancy.
fn exempt(a: &ProfileHandle, b: &ProfileHandle) -> bool {
    match (a.agency(), b.agency()) {
        (Agency::Autonomous, Agency::Autonomous) => true,
        (Agency::Queued(x), Agency::Queued(y)) => x == y,
        _ => false,
    }
}

fn collides_at(a: &Trajectory, b: &Trajectory, time: Time) -> bool {
    let profile_at = |t: &Trajectory| {
        t.find(time)
            .and_then(|id| t.get(id))
            .map(|s| s.profile().clone())
    };
    let (Some(pa), Some(pb)) = (profile_at(a), profile_at(b)) else {
        return false;
    };
    if exempt(&pa, &pb) {
        return false;
    }
    let (Some(xa), Some(xb)) = (a.position_at(time), b.position_at(time)) else {
        return false;
    };

    let reach = pa.shape().characteristic_length() + pb.shape().characteristic_length();
    let dx = xa[0] - xb[0];
    let dy = xa[1] - xb[1];
    dx.hypot(dy) < reach
}
