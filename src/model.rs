//! Accelerometer error model
//!
//! Measured specific force relates to the true one as
//! `f_meas = b + (I + Ma) * f_true`, where `b` is the bias and `Ma` holds scale
//! factors on its diagonal and cross-coupling terms off it.
//!
//! Parameter vectors use the order `[bx, by, bz, sx, sy, sz, mxy, mxz, myx, myz,
//! mzx, mzy]`. With a common z-axis `myx`, `mzx` and `mzy` are fixed at zero and
//! dropped, leaving `[bx, by, bz, sx, sy, sz, mxy, mxz, myz]`.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

/// Number of unknowns in the general model
pub const GENERAL_PARAMETERS: usize = 12;
/// Number of unknowns when the z-axis is shared with the gyroscope
pub const COMMON_AXIS_PARAMETERS: usize = 9;

/// Removes the error model from a measured specific force
///
/// Returns `None` when `I + Ma` is singular.
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use inertial_calibration::model::correct_specific_force;
///
/// let measured = Vector3::new(1.1, 2.2, 9.9);
/// let bias = Vector3::new(0.1, 0.2, -0.1);
/// let corrected = correct_specific_force(measured, bias, Matrix3::zeros()).unwrap();
///
/// assert!((corrected - Vector3::new(1.0, 2.0, 10.0)).norm() < 1e-12);
/// ```
pub fn correct_specific_force(
    measured: Vector3<f64>,
    bias: Vector3<f64>,
    ma: Matrix3<f64>,
) -> Option<Vector3<f64>> {
    let transform = Matrix3::identity() + ma;
    transform.try_inverse().map(|inverse| inverse * (measured - bias))
}

/// Applies the error model to a true specific force
pub fn distort_specific_force(
    true_specific_force: Vector3<f64>,
    bias: Vector3<f64>,
    ma: Matrix3<f64>,
) -> Vector3<f64> {
    bias + (Matrix3::identity() + ma) * true_specific_force
}

/// Number of unknowns for the given axis assumption
pub fn parameter_count(common_axis: bool) -> usize {
    if common_axis {
        COMMON_AXIS_PARAMETERS
    } else {
        GENERAL_PARAMETERS
    }
}

/// Bias and scale/cross-coupling matrix of an accelerometer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationModel {
    /// Bias in m/s²
    pub bias: Vector3<f64>,
    /// Scale factors and cross-coupling errors
    pub ma: Matrix3<f64>,
}

impl Default for CalibrationModel {
    fn default() -> Self {
        Self {
            bias: Vector3::zeros(),
            ma: Matrix3::zeros(),
        }
    }
}

impl CalibrationModel {
    pub fn new(bias: Vector3<f64>, ma: Matrix3<f64>) -> Self {
        Self { bias, ma }
    }

    /// Build a model from a parameter vector in the documented order
    ///
    /// The vector must hold 9 entries when `common_axis` is set and 12
    /// otherwise.
    pub fn from_parameters(parameters: &[f64], common_axis: bool) -> Self {
        debug_assert_eq!(parameters.len(), parameter_count(common_axis));

        let bias = Vector3::new(parameters[0], parameters[1], parameters[2]);
        let (sx, sy, sz) = (parameters[3], parameters[4], parameters[5]);
        let (mxy, mxz) = (parameters[6], parameters[7]);
        let (myx, myz, mzx, mzy) = if common_axis {
            (0.0, parameters[8], 0.0, 0.0)
        } else {
            (parameters[8], parameters[9], parameters[10], parameters[11])
        };

        let ma = Matrix3::new(
            sx, mxy, mxz, //
            myx, sy, myz, //
            mzx, mzy, sz,
        );
        Self { bias, ma }
    }

    /// Pack the model into a parameter vector in the documented order
    pub fn parameters(&self, common_axis: bool) -> DVector<f64> {
        let b = &self.bias;
        if common_axis {
            DVector::from_column_slice(&[
                b.x,
                b.y,
                b.z,
                self.sx(),
                self.sy(),
                self.sz(),
                self.mxy(),
                self.mxz(),
                self.myz(),
            ])
        } else {
            DVector::from_column_slice(&[
                b.x,
                b.y,
                b.z,
                self.sx(),
                self.sy(),
                self.sz(),
                self.mxy(),
                self.mxz(),
                self.myx(),
                self.myz(),
                self.mzx(),
                self.mzy(),
            ])
        }
    }

    /// Zero the entries that are not estimated under the common-axis assumption
    pub fn enforce_common_axis(&mut self) {
        self.ma[(1, 0)] = 0.0;
        self.ma[(2, 0)] = 0.0;
        self.ma[(2, 1)] = 0.0;
    }

    /// Undo the error model; `None` if `I + Ma` is singular
    pub fn correct(&self, measured: Vector3<f64>) -> Option<Vector3<f64>> {
        correct_specific_force(measured, self.bias, self.ma)
    }

    /// Apply the error model to a true specific force
    pub fn distort(&self, true_specific_force: Vector3<f64>) -> Vector3<f64> {
        distort_specific_force(true_specific_force, self.bias, self.ma)
    }

    pub fn sx(&self) -> f64 {
        self.ma[(0, 0)]
    }

    pub fn sy(&self) -> f64 {
        self.ma[(1, 1)]
    }

    pub fn sz(&self) -> f64 {
        self.ma[(2, 2)]
    }

    pub fn mxy(&self) -> f64 {
        self.ma[(0, 1)]
    }

    pub fn mxz(&self) -> f64 {
        self.ma[(0, 2)]
    }

    pub fn myx(&self) -> f64 {
        self.ma[(1, 0)]
    }

    pub fn myz(&self) -> f64 {
        self.ma[(1, 2)]
    }

    pub fn mzx(&self) -> f64 {
        self.ma[(2, 0)]
    }

    pub fn mzy(&self) -> f64 {
        self.ma[(2, 1)]
    }
}

/// Candidate calibration produced from a subset of measurements
#[derive(Debug, Clone, PartialEq)]
pub struct PreliminaryResult {
    /// Estimated bias and Ma
    pub model: CalibrationModel,
    /// Mean square error of the fit
    pub mse: f64,
    /// Chi-square statistic of the fit
    pub chi_sq: f64,
    /// Parameter covariance, kept only when requested
    pub covariance: Option<DMatrix<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> CalibrationModel {
        CalibrationModel::new(
            Vector3::new(0.1, -0.2, 0.3),
            Matrix3::new(
                1e-3, 2e-3, -3e-3, //
                4e-3, -5e-3, 6e-3, //
                -7e-3, 8e-3, 9e-3,
            ),
        )
    }

    #[test]
    fn test_correct_inverts_distort() {
        let model = sample_model();
        let true_force = Vector3::new(0.5, -3.0, 9.4);

        let measured = model.distort(true_force);
        let corrected = model.correct(measured).unwrap();

        assert!((corrected - true_force).norm() < 1e-12);
    }

    #[test]
    fn test_correct_singular_matrix() {
        // I + Ma has a zero row
        let ma = Matrix3::new(-1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let model = CalibrationModel::new(Vector3::zeros(), ma);
        assert!(model.correct(Vector3::new(1.0, 2.0, 3.0)).is_none());
    }

    #[test]
    fn test_parameter_layout_general() {
        let model = sample_model();
        let parameters = model.parameters(false);

        assert_eq!(parameters.len(), GENERAL_PARAMETERS);
        assert_eq!(parameters[3], model.sx());
        assert_eq!(parameters[8], model.myx());
        assert_eq!(parameters[8], 4e-3);
        assert_eq!(parameters[10], -7e-3);
        assert_eq!(parameters[11], 8e-3);

        let rebuilt = CalibrationModel::from_parameters(parameters.as_slice(), false);
        assert_eq!(rebuilt, model);
    }

    #[test]
    fn test_parameter_layout_common_axis() {
        let model = sample_model();
        let parameters = model.parameters(true);

        assert_eq!(parameters.len(), COMMON_AXIS_PARAMETERS);
        assert_eq!(parameters[8], model.myz());

        let rebuilt = CalibrationModel::from_parameters(parameters.as_slice(), true);
        assert_eq!(rebuilt.myx(), 0.0);
        assert_eq!(rebuilt.mzx(), 0.0);
        assert_eq!(rebuilt.mzy(), 0.0);
        assert_eq!(rebuilt.mxy(), model.mxy());

        let mut enforced = model;
        enforced.enforce_common_axis();
        assert_eq!(rebuilt, enforced);
    }
}
