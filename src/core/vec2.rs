//! 2D Vector
//!
//! Small value type for body translations and render positions.
//! Arithmetic is plain IEEE-754 `f64`; determinism comes from the fixed
//! step and the operation order, not from the number representation.

use std::fmt;
use std::ops::{Add, Sub, Neg, Mul};
use serde::{Serialize, Deserialize};

/// 2D vector with `f64` components.
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
}

impl Vec2 {
    /// Zero vector
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new vector.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Scale by a scalar.
    #[inline]
    pub fn scale(self, scalar: f64) -> Self {
        Self {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    /// Squared length (avoids sqrt - prefer this for comparisons).
    #[inline]
    pub fn length_squared(self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Squared distance to another point.
    #[inline]
    pub fn distance_squared(self, other: Self) -> f64 {
        (self - other).length_squared()
    }

    /// Largest per-axis absolute difference to another point.
    ///
    /// Used as the positional divergence metric. Matching non-finite
    /// components (both NaN, or the same infinity) count as equal; any
    /// other non-finite component yields infinity, never NaN.
    #[inline]
    pub fn max_axis_delta(self, other: Self) -> f64 {
        if self.is_finite() && other.is_finite() {
            return (self.x - other.x).abs().max((self.y - other.y).abs());
        }
        axis_delta(self.x, other.x).max(axis_delta(self.y, other.y))
    }

    /// Linear interpolation between two vectors.
    /// t = 0 returns self, t = 1 returns other.
    #[inline]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// True when both components are finite.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

fn axis_delta(a: f64, b: f64) -> f64 {
    if a.is_finite() && b.is_finite() {
        (a - b).abs()
    } else if a == b || (a.is_nan() && b.is_nan()) {
        0.0
    } else {
        f64::INFINITY
    }
}

impl Add for Vec2 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Vec2 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: f64) -> Self {
        self.scale(rhs)
    }
}

impl fmt::Debug for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vec2({:.4}, {:.4})", self.x, self.y)
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.x, self.y)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec2_ops() {
        let a = Vec2::new(3.0, 4.0);
        let b = Vec2::new(1.0, 2.0);
        assert_eq!(a + b, Vec2::new(4.0, 6.0));
        assert_eq!(a - b, Vec2::new(2.0, 2.0));
        assert_eq!(-b, Vec2::new(-1.0, -2.0));
        assert_eq!(b * 2.0, Vec2::new(2.0, 4.0));
        assert_eq!(a.length_squared(), 25.0);
    }

    #[test]
    fn test_vec2_lerp_endpoints() {
        let a = Vec2::new(-2.0, 10.0);
        let b = Vec2::new(6.0, 2.0);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
        assert_eq!(a.lerp(b, 0.5), Vec2::new(2.0, 6.0));
    }

    #[test]
    fn test_max_axis_delta() {
        let a = Vec2::new(1.0, 1.0);
        let b = Vec2::new(1.25, 0.5);
        assert_eq!(a.max_axis_delta(b), 0.5);
        assert_eq!(b.max_axis_delta(a), 0.5);
        assert_eq!(a.max_axis_delta(a), 0.0);
    }

    #[test]
    fn test_max_axis_delta_non_finite() {
        let nan = Vec2::new(f64::NAN, 1.0);
        assert_eq!(nan.max_axis_delta(nan), 0.0);
        // f64::max would drop the NaN axis and report 0.5
        assert_eq!(nan.max_axis_delta(Vec2::new(1.0, 1.5)), f64::INFINITY);

        let inf = Vec2::new(f64::INFINITY, 0.0);
        assert_eq!(inf.max_axis_delta(inf), 0.0);
        assert_eq!(inf.max_axis_delta(Vec2::new(f64::NEG_INFINITY, 0.0)), f64::INFINITY);
        assert_eq!(inf.max_axis_delta(Vec2::new(f64::INFINITY, 0.25)), 0.25);
        assert!(!inf.is_finite());
    }
}
