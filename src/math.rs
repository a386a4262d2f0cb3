//! Mathematical utilities and nalgebra extensions for the calibration library

use nalgebra::{Matrix3, Vector3};

/// Mathematical constants
pub const DEG_TO_RAD: f64 = core::f64::consts::PI / 180.0;
pub const RAD_TO_DEG: f64 = 180.0 / core::f64::consts::PI;

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Convert degrees to radians
    fn deg_to_rad(&self) -> Vector3<f64>;

    /// Convert radians to degrees
    fn rad_to_deg(&self) -> Vector3<f64>;

    /// Whether every component is finite
    fn all_finite(&self) -> bool;
}

impl Vector3Ext for Vector3<f64> {
    fn deg_to_rad(&self) -> Vector3<f64> {
        *self * DEG_TO_RAD
    }

    fn rad_to_deg(&self) -> Vector3<f64> {
        *self * RAD_TO_DEG
    }

    fn all_finite(&self) -> bool {
        self.iter().all(|v| v.is_finite())
    }
}

/// Extension trait for Matrix3 operations
pub trait Matrix3Ext {
    /// Whether every entry is finite
    fn all_finite(&self) -> bool;

    /// Whether the entries below the diagonal are exactly zero
    fn is_upper_triangular(&self) -> bool;
}

impl Matrix3Ext for Matrix3<f64> {
    fn all_finite(&self) -> bool {
        self.iter().all(|v| v.is_finite())
    }

    fn is_upper_triangular(&self) -> bool {
        self[(1, 0)] == 0.0 && self[(2, 0)] == 0.0 && self[(2, 1)] == 0.0
    }
}

/// Median of a slice, reordering it in place
///
/// Even-length slices return the mean of the two middle values. An empty
/// slice returns `f64::MAX`.
pub(crate) fn median(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::MAX;
    }

    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *upper;
    if n % 2 == 1 {
        upper
    } else {
        let lower = lower.iter().copied().fold(f64::MIN, f64::max);
        0.5 * lower + 0.5 * upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_extensions() {
        let v = Vector3::new(180.0, 90.0, -45.0);
        let radians = v.deg_to_rad();
        assert!((radians.x - core::f64::consts::PI).abs() < 1e-12);
        assert!((radians.rad_to_deg() - v).norm() < 1e-12);

        assert!(v.all_finite());
        assert!(!Vector3::new(f64::NAN, 0.0, 0.0).all_finite());
    }

    #[test]
    fn test_upper_triangular_check() {
        let upper = Matrix3::new(1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 0.0, 0.0, 6.0);
        assert!(upper.is_upper_triangular());

        let mut general = upper;
        general[(2, 1)] = 1e-300;
        assert!(!general.is_upper_triangular());
    }

    #[test]
    fn test_median() {
        let mut odd = [5.0, 1.0, 3.0];
        assert_eq!(median(&mut odd), 3.0);

        let mut even = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(median(&mut even), 2.5);

        let mut empty: [f64; 0] = [];
        assert_eq!(median(&mut empty), f64::MAX);
    }
}
