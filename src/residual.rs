//! Residual used to score candidate calibrations
//!
//! A correct model maps every measured specific force of a body at rest back
//! onto a vector whose magnitude equals local gravity. The residual is the
//! squared deviation from that magnitude.

use nalgebra::Vector3;

use crate::math::Vector3Ext;
use crate::model::CalibrationModel;

/// Residual assigned when a candidate cannot be evaluated for a measurement
///
/// Largest finite `f64`, so the measurement is an outlier under any threshold
/// and still sorts and sums without producing NaN.
pub const MAX_RESIDUAL: f64 = f64::MAX;

/// Squared gravity-norm error of one measurement under a candidate model
///
/// Computes `(g - |(I + Ma)^-1 (f_meas - b)|)^2`. Returns [`MAX_RESIDUAL`] when
/// `I + Ma` is singular or the result is not finite.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use inertial_calibration::{CalibrationModel, residual::gravity_norm_residual};
///
/// let model = CalibrationModel::new(Vector3::new(0.0, 0.0, 0.5), Default::default());
/// let residual = gravity_norm_residual(&model, Vector3::new(0.0, 0.0, 10.3), 9.8);
/// assert!(residual < 1e-20);
/// ```
pub fn gravity_norm_residual(
    model: &CalibrationModel,
    measured: Vector3<f64>,
    gravity_norm: f64,
) -> f64 {
    let Some(corrected) = model.correct(measured) else {
        return MAX_RESIDUAL;
    };
    if !corrected.all_finite() {
        return MAX_RESIDUAL;
    }

    let error = gravity_norm - corrected.norm();
    let residual = error * error;
    if residual.is_finite() {
        residual
    } else {
        MAX_RESIDUAL
    }
}
