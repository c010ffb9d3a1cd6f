//! Time handling for trajectories.
//!
//! Trajectory timelines are keyed by absolute UTC instants. Kinematic
//! computations work in floating-point seconds, so this module provides the
//! conversions between the two at nanosecond precision.

use chrono::{DateTime, Duration, Utc};

/// An absolute instant on a trajectory timeline.
pub type Time = DateTime<Utc>;

/// Converts a duration to floating-point seconds.
///
/// # Examples
///
/// ```
/// use chrono::Duration;
/// use traffic_planner::domain::to_seconds;
///
/// assert_eq!(to_seconds(Duration::milliseconds(1500)), 1.5);
/// assert_eq!(to_seconds(Duration::seconds(-2)), -2.0);
/// ```
pub fn to_seconds(duration: Duration) -> f64 {
    match duration.num_nanoseconds() {
        Some(nanos) => nanos as f64 * 1e-9,
        // Beyond ~292 years the nanosecond count overflows
        None => duration.num_milliseconds() as f64 * 1e-3,
    }
}

/// Converts floating-point seconds to a duration, rounded to the nanosecond.
///
/// # Examples
///
/// ```
/// use chrono::Duration;
/// use traffic_planner::domain::from_seconds;
///
/// assert_eq!(from_seconds(0.25), Duration::milliseconds(250));
/// ```
pub fn from_seconds(seconds: f64) -> Duration {
    Duration::nanoseconds((seconds * 1e9).round() as i64)
}

/// Seconds elapsed from `from` to `to`. Negative if `to` is earlier.
pub fn seconds_between(from: Time, to: Time) -> f64 {
    to_seconds(to.signed_duration_since(from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base() -> Time {
        Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn seconds_round_trip_at_millisecond_scale() {
        let d = Duration::milliseconds(12_345);
        assert_eq!(from_seconds(to_seconds(d)), d);
    }

    #[test]
    fn from_seconds_rounds_to_nearest_nanosecond() {
        assert_eq!(from_seconds(1e-9 * 0.6), Duration::nanoseconds(1));
        assert_eq!(from_seconds(1e-9 * 0.4), Duration::zero());
    }

    #[test]
    fn seconds_between_is_signed() {
        let later = base() + Duration::seconds(10);
        assert_eq!(seconds_between(base(), later), 10.0);
        assert_eq!(seconds_between(later, base()), -10.0);
    }
}
