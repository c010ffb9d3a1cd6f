//! Domain error types.
//!
//! These errors report rejected trajectory mutations. A rejected mutation
//! never leaves the trajectory partially changed, so callers can inspect the
//! error and retry with different arguments.

use super::{SegmentId, Time};

/// Errors from mutating a [`Trajectory`](super::Trajectory).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrajectoryError {
    /// Another segment already finishes at the requested time
    #[error("a segment already finishes at {time}")]
    TimeConflict { time: Time },

    /// The handle does not name a segment of this trajectory
    #[error("no segment {0:?} in this trajectory")]
    UnknownSegment(SegmentId),

    /// A shifted finish time falls outside the representable range
    #[error("finish time adjustment overflows the time range")]
    TimeOutOfRange,
}
