//! Vehicle kinematic limits and footprint.

use serde::{Deserialize, Serialize};

use crate::domain::ProfileHandle;

/// A limit that is not a finite, strictly positive number.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{limit} must be finite and positive, got {value}")]
pub struct InvalidTraits {
    pub limit: &'static str,
    pub value: f64,
}

/// Speed and acceleration bound for one degree of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum speed (m/s or rad/s).
    pub velocity: f64,

    /// Maximum acceleration (m/s² or rad/s²).
    pub acceleration: f64,
}

impl Limits {
    pub fn new(velocity: f64, acceleration: f64) -> Self {
        Self {
            velocity,
            acceleration,
        }
    }
}

/// What a vehicle can do and how much room it takes.
#[derive(Debug, Clone)]
pub struct VehicleTraits {
    pub linear: Limits,
    pub rotational: Limits,
    pub profile: ProfileHandle,
}

impl VehicleTraits {
    pub fn new(linear: Limits, rotational: Limits, profile: ProfileHandle) -> Self {
        Self {
            linear,
            rotational,
            profile,
        }
    }

    /// Check every limit is usable for motion planning.
    pub fn validate(&self) -> Result<(), InvalidTraits> {
        let checks = [
            ("linear velocity", self.linear.velocity),
            ("linear acceleration", self.linear.acceleration),
            ("rotational velocity", self.rotational.velocity),
            ("rotational acceleration", self.rotational.acceleration),
        ];
        for (limit, value) in checks {
            if !(value.is_finite() && value > 0.0) {
                return Err(InvalidTraits { limit, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Shape;

    fn traits(linear: Limits) -> VehicleTraits {
        VehicleTraits::new(
            linear,
            Limits::new(1.0, 0.45),
            ProfileHandle::strict(Shape::circle(1.0)),
        )
    }

    #[test]
    fn valid_traits() {
        assert_eq!(traits(Limits::new(0.7, 0.3)).validate(), Ok(()));
    }

    #[test]
    fn rejects_non_positive_or_non_finite() {
        let err = traits(Limits::new(0.0, 0.3)).validate().unwrap_err();
        assert_eq!(err.limit, "linear velocity");
        assert_eq!(err.to_string(), "linear velocity must be finite and positive, got 0");

        let err = traits(Limits::new(0.7, f64::INFINITY)).validate().unwrap_err();
        assert_eq!(err.limit, "linear acceleration");
    }
}
