//! Angle newtype.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A plane angle, stored in radians.
///
/// Reported in degrees unless radians are asked for explicitly.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Angle(f64);

impl Angle {
    pub const ZERO: Angle = Angle(0.0);

    pub fn from_radians(radians: f64) -> Self {
        Self(radians)
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self(degrees.to_radians())
    }

    pub fn radians(self) -> f64 {
        self.0
    }

    pub fn degrees(self) -> f64 {
        self.0.to_degrees()
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    /// Wrap into `[0, 2π)`.
    pub fn positive_east_360(self) -> Self {
        let mut r = self.0 % (2.0 * PI);
        if r < 0.0 {
            r += 2.0 * PI;
        }
        // -0.0 and values that round up to 2π both map to zero
        if r >= 2.0 * PI || r == 0.0 {
            r = 0.0;
        }
        Self(r)
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <degrees>", self.degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_degree_radian_conversion() {
        let a = Angle::from_degrees(180.0);
        assert_relative_eq!(a.radians(), PI, epsilon = 1e-15);
        assert_relative_eq!(Angle::from_radians(PI / 2.0).degrees(), 90.0, epsilon = 1e-12);
    }

    #[test]
    fn test_positive_east_wrap() {
        let wrapped = Angle::from_degrees(-45.0).positive_east_360();
        assert_relative_eq!(wrapped.degrees(), 315.0, epsilon = 1e-10);
        let wrapped = Angle::from_degrees(370.0).positive_east_360();
        assert_relative_eq!(wrapped.degrees(), 10.0, epsilon = 1e-10);
        assert_eq!(Angle::ZERO.positive_east_360().degrees(), 0.0);
    }
}
