//! Search configuration for the trajectory planner.

use chrono::Duration;

/// A configuration value the search cannot work with.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field} must be finite and positive, got {value}")]
pub struct InvalidConfig {
    pub field: &'static str,
    pub value: f64,
}

/// Tuning parameters for the planner search.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Maximum number of states to expand before giving up.
    pub max_expansions: usize,

    /// Angular tolerance (radians) for matching headings against lane
    /// constraints and the goal orientation.
    pub heading_tolerance: f64,

    /// Width of the time buckets used to recognise revisited states
    /// (milliseconds).
    pub time_resolution_ms: i64,

    /// How many times a wait at a holding point may be lengthened before
    /// falling back to waiting out the whole schedule.
    pub max_hold_attempts: usize,

    /// Precision to which the shortest clear wait is found (milliseconds).
    pub hold_resolution_ms: i64,
}

impl PlannerConfig {
    /// Create a new configuration with the given parameters.
    pub fn new(
        max_expansions: usize,
        heading_tolerance: f64,
        time_resolution_ms: i64,
        max_hold_attempts: usize,
        hold_resolution_ms: i64,
    ) -> Self {
        Self {
            max_expansions,
            heading_tolerance,
            time_resolution_ms,
            max_hold_attempts,
            hold_resolution_ms,
        }
    }

    /// Check the values the search divides by or compares against.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        let tolerance = self.heading_tolerance;
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(InvalidConfig {
                field: "heading tolerance",
                value: tolerance,
            });
        }
        Ok(())
    }

    /// Returns the time bucket width as a Duration.
    pub fn time_resolution(&self) -> Duration {
        Duration::milliseconds(self.time_resolution_ms.max(1))
    }

    /// Returns the hold resolution as a Duration.
    pub fn hold_resolution(&self) -> Duration {
        Duration::milliseconds(self.hold_resolution_ms.max(1))
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_expansions: 50_000,
            heading_tolerance: 1e-3,
            time_resolution_ms: 100,
            max_hold_attempts: 20,
            hold_resolution_ms: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PlannerConfig::default();

        assert_eq!(config.max_expansions, 50_000);
        assert_eq!(config.heading_tolerance, 1e-3);
        assert_eq!(config.time_resolution_ms, 100);
        assert_eq!(config.max_hold_attempts, 20);
        assert_eq!(config.hold_resolution_ms, 100);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn duration_methods() {
        let config = PlannerConfig::default();

        assert_eq!(config.time_resolution(), Duration::milliseconds(100));
        assert_eq!(config.hold_resolution(), Duration::milliseconds(100));
    }

    #[test]
    fn custom_config() {
        let config = PlannerConfig::new(10, 0.01, 250, 3, 20);

        assert_eq!(config.max_expansions, 10);
        assert_eq!(config.heading_tolerance, 0.01);
        assert_eq!(config.time_resolution_ms, 250);
        assert_eq!(config.max_hold_attempts, 3);
        assert_eq!(config.hold_resolution(), Duration::milliseconds(20));
    }

    #[test]
    fn degenerate_durations_are_clamped() {
        let config = PlannerConfig::new(10, 0.01, 0, 3, -5);

        assert_eq!(config.time_resolution(), Duration::milliseconds(1));
        assert_eq!(config.hold_resolution(), Duration::milliseconds(1));
    }

    #[test]
    fn heading_tolerance_must_be_positive() {
        for tolerance in [0.0, -1e-3, f64::NAN, f64::INFINITY] {
            let config = PlannerConfig::new(10, tolerance, 100, 3, 100);
            let err = config.validate().unwrap_err();
            assert_eq!(err.field, "heading tolerance");
        }
    }
}
