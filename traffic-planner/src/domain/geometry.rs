//! Vehicle and obstacle footprints.

use serde::{Deserialize, Serialize};

/// A 2D footprint, centred on the vehicle's reference point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    /// A circle with the given radius.
    Circle { radius: f64 },
    /// An axis-aligned box (in the vehicle frame) with full side lengths.
    Box { x_length: f64, y_length: f64 },
}

impl Shape {
    /// Creates a circular footprint.
    pub fn circle(radius: f64) -> Self {
        Shape::Circle { radius }
    }

    /// Creates a box footprint with the given side lengths.
    pub fn rectangle(x_length: f64, y_length: f64) -> Self {
        Shape::Box { x_length, y_length }
    }

    /// Radius of the smallest circle that encloses the shape.
    ///
    /// Conflict detection treats every footprint as this bounding circle,
    /// which is exact for circles and conservative for boxes.
    pub fn characteristic_length(&self) -> f64 {
        match *self {
            Shape::Circle { radius } => radius,
            Shape::Box { x_length, y_length } => 0.5 * x_length.hypot(y_length),
        }
    }

    /// Whether every dimension is finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        match *self {
            Shape::Circle { radius } => radius.is_finite() && radius > 0.0,
            Shape::Box { x_length, y_length } => {
                x_length.is_finite() && y_length.is_finite() && x_length > 0.0 && y_length > 0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circle_characteristic_length_is_radius() {
        assert_eq!(Shape::circle(1.5).characteristic_length(), 1.5);
    }

    #[test]
    fn box_characteristic_length_is_half_diagonal() {
        let shape = Shape::rectangle(3.0, 4.0);
        assert!((shape.characteristic_length() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn validity() {
        assert!(Shape::circle(1.0).is_valid());
        assert!(!Shape::circle(0.0).is_valid());
        assert!(!Shape::rectangle(1.0, f64::NAN).is_valid());
    }

    #[test]
    fn serde_uses_tagged_representation() {
        let json = serde_json::to_string(&Shape::circle(1.0)).unwrap();
        assert_eq!(json, r#"{"type":"circle","radius":1.0}"#);

        let parsed: Shape =
            serde_json::from_str(r#"{"type":"box","x_length":1.0,"y_length":2.0}"#).unwrap();
        assert_eq!(parsed, Shape::rectangle(1.0, 2.0));
    }
}
