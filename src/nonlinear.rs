//! Non-linear accelerometer calibration at a known position
//!
//! A body at rest at a known position senses a specific force whose magnitude
//! equals local gravity, whatever its orientation. The calibrator searches for
//! the bias and Ma that make every corrected measurement have that magnitude,
//! using Levenberg-Marquardt with an analytic Jacobian.
//!
//! Only gravity magnitudes are observed, so in the general case `Ma` is known
//! up to a rotation. The common-axis assumption removes that ambiguity.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::debug;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use crate::error::{CalibrationError, CalibrationResult, FailureKind};
use crate::fitter::{LeastSquaresProblem, levenberg_marquardt};
use crate::listener::CalibratorListener;
use crate::model::{CalibrationModel, parameter_count};
use crate::position::Position;
use crate::reference::{EcefReferenceModel, ReferenceModel};
use crate::types::{LevenbergMarquardtSettings, Measurement};

/// Minimum measurements for the general (12 unknown) case
pub const MINIMUM_MEASUREMENTS_GENERAL: usize = 13;
/// Minimum measurements for the common-axis (9 unknown) case
pub const MINIMUM_MEASUREMENTS_COMMON_AXIS: usize = 10;

/// Minimum measurements for the given axis assumption
pub fn minimum_measurements(common_axis: bool) -> usize {
    if common_axis {
        MINIMUM_MEASUREMENTS_COMMON_AXIS
    } else {
        MINIMUM_MEASUREMENTS_GENERAL
    }
}

/// Position of each free Ma entry in the parameter vector, as `(row, col, index)`
const GENERAL_MA_LAYOUT: [(usize, usize, usize); 9] = [
    (0, 0, 3),
    (1, 1, 4),
    (2, 2, 5),
    (0, 1, 6),
    (0, 2, 7),
    (1, 0, 8),
    (1, 2, 9),
    (2, 0, 10),
    (2, 1, 11),
];
const COMMON_AXIS_MA_LAYOUT: [(usize, usize, usize); 6] = [
    (0, 0, 3),
    (1, 1, 4),
    (2, 2, 5),
    (0, 1, 6),
    (0, 2, 7),
    (1, 2, 8),
];

/// Gravity-norm fitting problem over a set of measurements
struct GravityNormProblem<'a> {
    measurements: &'a [Measurement],
    gravity_norm: f64,
    common_axis: bool,
}

impl LeastSquaresProblem for GravityNormProblem<'_> {
    fn parameter_count(&self) -> usize {
        parameter_count(self.common_axis)
    }

    fn sample_count(&self) -> usize {
        self.measurements.len()
    }

    fn observed(&self, _index: usize) -> f64 {
        self.gravity_norm
    }

    fn standard_deviation(&self, index: usize) -> f64 {
        self.measurements[index].weighting_standard_deviation()
    }

    fn predict(
        &self,
        parameters: &DVector<f64>,
        index: usize,
        gradient: &mut DVector<f64>,
    ) -> Option<f64> {
        let model = CalibrationModel::from_parameters(parameters.as_slice(), self.common_axis);
        let inverse = (Matrix3::identity() + model.ma).try_inverse()?;
        let corrected = inverse * (self.measurements[index].specific_force() - model.bias);
        let norm = corrected.norm();
        if !(norm.is_finite() && norm > 0.0) {
            return None;
        }

        // d|u|/db = -w and d|u|/dMa_ij = -w_i u_j with w = (I + Ma)^-T u / |u|
        let w = inverse.transpose() * corrected / norm;
        gradient[0] = -w.x;
        gradient[1] = -w.y;
        gradient[2] = -w.z;

        let layout: &[(usize, usize, usize)] = if self.common_axis {
            &COMMON_AXIS_MA_LAYOUT
        } else {
            &GENERAL_MA_LAYOUT
        };
        for &(row, col, parameter) in layout {
            gradient[parameter] = -w[row] * corrected[col];
        }

        Some(norm)
    }
}

/// Result of a non-linear calibration
#[derive(Debug, Clone, PartialEq)]
pub struct NonLinearEstimate {
    pub model: CalibrationModel,
    /// Parameter covariance, absent when the calibrator does not keep it
    pub covariance: Option<DMatrix<f64>>,
    pub mse: f64,
    pub chi_sq: f64,
    pub iterations: usize,
}

/// Fit bias and Ma so every corrected measurement has norm `gravity_norm`
///
/// Fails with [`CalibrationError::NotReady`] below the minimum number of
/// measurements for the axis assumption.
pub(crate) fn fit_known_position(
    measurements: &[Measurement],
    gravity_norm: f64,
    common_axis: bool,
    initial: &CalibrationModel,
    settings: &LevenbergMarquardtSettings,
) -> CalibrationResult<NonLinearEstimate> {
    if measurements.len() < minimum_measurements(common_axis) {
        return Err(CalibrationError::not_ready("not enough measurements to fit"));
    }

    let problem = GravityNormProblem {
        measurements,
        gravity_norm,
        common_axis,
    };
    let outcome = levenberg_marquardt(&problem, initial.parameters(common_axis), settings)?;
    if !outcome.parameters.iter().all(|v| v.is_finite()) {
        return Err(FailureKind::NonFinite.into());
    }
    debug!(
        "known position fit converged in {} iterations (mse {:e})",
        outcome.iterations, outcome.mse
    );

    Ok(NonLinearEstimate {
        model: CalibrationModel::from_parameters(outcome.parameters.as_slice(), common_axis),
        covariance: Some(outcome.covariance),
        mse: outcome.mse,
        chi_sq: outcome.chi_sq,
        iterations: outcome.iterations,
    })
}

/// Listener type accepted by [`KnownPositionCalibrator`]
pub type KnownPositionCalibratorListener = dyn CalibratorListener<KnownPositionCalibrator>;

/// Levenberg-Marquardt accelerometer calibrator for a body at a known position
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use inertial_calibration::{GeodeticPosition, KnownPositionCalibrator, Position};
///
/// let mut calibrator = KnownPositionCalibrator::new();
/// calibrator
///     .set_position(Position::from_geodetic(GeodeticPosition::from_degrees(41.0, 2.0, 0.0)))
///     .unwrap();
/// calibrator.set_initial_bias(Vector3::new(0.1, 0.0, 0.0)).unwrap();
/// calibrator.set_common_axis_used(true).unwrap();
///
/// assert_eq!(calibrator.minimum_required_measurements(), 10);
/// assert!(!calibrator.is_ready());
/// ```
pub struct KnownPositionCalibrator {
    measurements: Vec<Measurement>,
    common_axis_used: bool,
    position: Option<Position>,
    initial_bias: Vector3<f64>,
    initial_ma: Matrix3<f64>,
    settings: LevenbergMarquardtSettings,
    keep_covariance: bool,
    reference: Arc<dyn ReferenceModel>,
    listener: Option<Box<KnownPositionCalibratorListener>>,
    running: bool,
    estimate: Option<NonLinearEstimate>,
}

impl KnownPositionCalibrator {
    pub fn new() -> Self {
        Self {
            measurements: Vec::new(),
            common_axis_used: false,
            position: None,
            initial_bias: Vector3::zeros(),
            initial_ma: Matrix3::zeros(),
            settings: LevenbergMarquardtSettings::default(),
            keep_covariance: true,
            reference: Arc::new(EcefReferenceModel),
            listener: None,
            running: false,
            estimate: None,
        }
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn set_measurements(&mut self, measurements: Vec<Measurement>) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.measurements = measurements;
        Ok(())
    }

    pub fn is_common_axis_used(&self) -> bool {
        self.common_axis_used
    }

    pub fn set_common_axis_used(&mut self, common_axis_used: bool) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.common_axis_used = common_axis_used;
        Ok(())
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn set_position(&mut self, position: Position) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.position = Some(position);
        Ok(())
    }

    pub fn initial_bias(&self) -> Vector3<f64> {
        self.initial_bias
    }

    pub fn set_initial_bias(&mut self, bias: Vector3<f64>) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.initial_bias = bias;
        Ok(())
    }

    pub fn initial_ma(&self) -> Matrix3<f64> {
        self.initial_ma
    }

    pub fn set_initial_ma(&mut self, ma: Matrix3<f64>) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.initial_ma = ma;
        Ok(())
    }

    pub fn settings(&self) -> LevenbergMarquardtSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: LevenbergMarquardtSettings) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    pub fn is_covariance_kept(&self) -> bool {
        self.keep_covariance
    }

    /// Keep the parameter covariance of the next fit (the default)
    pub fn set_keep_covariance(&mut self, keep_covariance: bool) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.keep_covariance = keep_covariance;
        Ok(())
    }

    pub fn set_reference_model(&mut self, reference: Arc<dyn ReferenceModel>) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.reference = reference;
        Ok(())
    }

    pub fn set_listener(
        &mut self,
        listener: Option<Box<KnownPositionCalibratorListener>>,
    ) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.listener = listener;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn minimum_required_measurements(&self) -> usize {
        minimum_measurements(self.common_axis_used)
    }

    pub fn is_ready(&self) -> bool {
        self.position.is_some() && self.measurements.len() >= self.minimum_required_measurements()
    }

    /// Fit bias and Ma starting from the initial guess
    ///
    /// On failure the previous estimate is left untouched.
    pub fn calibrate(&mut self) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        if !self.is_ready() {
            return Err(CalibrationError::not_ready(
                "a position and at least the minimum number of measurements are required",
            ));
        }

        self.running = true;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_locked()));
        self.running = false;
        match outcome {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn run_locked(&mut self) -> CalibrationResult<()> {
        self.notify(|listener, calibrator| listener.on_calibrate_start(calibrator));

        let position = self
            .position
            .ok_or(CalibrationError::not_ready("position is not set"))?;
        let gravity_norm = self.reference.gravity_norm(&position);
        let initial = CalibrationModel::new(self.initial_bias, self.initial_ma);

        let mut estimate = fit_known_position(
            &self.measurements,
            gravity_norm,
            self.common_axis_used,
            &initial,
            &self.settings,
        )?;
        if !self.keep_covariance {
            estimate.covariance = None;
        }
        self.estimate = Some(estimate);

        self.notify(|listener, calibrator| listener.on_calibrate_end(calibrator));
        Ok(())
    }

    pub fn estimate(&self) -> Option<&NonLinearEstimate> {
        self.estimate.as_ref()
    }

    /// Take the estimate out of the calibrator
    pub fn take_estimate(&mut self) -> Option<NonLinearEstimate> {
        self.estimate.take()
    }

    pub fn estimated_biases(&self) -> Option<Vector3<f64>> {
        self.estimate.as_ref().map(|estimate| estimate.model.bias)
    }

    pub fn estimated_ma(&self) -> Option<Matrix3<f64>> {
        self.estimate.as_ref().map(|estimate| estimate.model.ma)
    }

    /// Covariance of `[bx, by, bz, sx, sy, sz, mxy, mxz, (myx), myz, (mzx), (mzy)]`
    ///
    /// Present after a successful fit while covariance is kept.
    pub fn estimated_covariance(&self) -> Option<&DMatrix<f64>> {
        self.estimate
            .as_ref()
            .and_then(|estimate| estimate.covariance.as_ref())
    }

    pub fn estimated_mse(&self) -> Option<f64> {
        self.estimate.as_ref().map(|estimate| estimate.mse)
    }

    pub fn estimated_chi_sq(&self) -> Option<f64> {
        self.estimate.as_ref().map(|estimate| estimate.chi_sq)
    }

    fn ensure_unlocked(&self) -> CalibrationResult<()> {
        if self.running {
            Err(CalibrationError::Locked)
        } else {
            Ok(())
        }
    }

    fn notify(&mut self, event: impl FnOnce(&mut KnownPositionCalibratorListener, &mut Self)) {
        if let Some(mut listener) = self.listener.take() {
            event(listener.as_mut(), self);
            self.listener = Some(listener);
        }
    }
}

impl Default for KnownPositionCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::GeodeticPosition;
    use crate::types::{BodyKinematics, Frame};
    use nalgebra::Rotation3;

    fn numerical_gradient(problem: &GravityNormProblem, parameters: &DVector<f64>) -> DVector<f64> {
        let step = 1e-7;
        let mut gradient = DVector::zeros(parameters.len());
        let mut scratch = DVector::zeros(parameters.len());
        for j in 0..parameters.len() {
            let mut forward = parameters.clone();
            forward[j] += step;
            let mut backward = parameters.clone();
            backward[j] -= step;
            let f = problem.predict(&forward, 0, &mut scratch).unwrap();
            let b = problem.predict(&backward, 0, &mut scratch).unwrap();
            gradient[j] = (f - b) / (2.0 * step);
        }
        gradient
    }

    fn sample_measurement() -> Measurement {
        let position = Position::from_geodetic(GeodeticPosition::from_degrees(30.0, 5.0, 0.0));
        let frame = Frame::static_at(position, Rotation3::from_euler_angles(0.3, 0.5, -0.2));
        let kinematics = BodyKinematics::new(Vector3::new(1.5, -2.5, 9.3), Vector3::zeros());
        Measurement::stationary(kinematics, frame, 0.02)
    }

    #[test]
    fn test_analytic_gradient_matches_numerical() {
        let measurements = [sample_measurement()];
        for common_axis in [false, true] {
            let problem = GravityNormProblem {
                measurements: &measurements,
                gravity_norm: 9.8,
                common_axis,
            };
            let model = CalibrationModel::new(
                Vector3::new(0.1, -0.2, 0.3),
                Matrix3::new(0.01, -0.02, 0.03, 0.015, -0.01, 0.02, -0.03, 0.025, 0.012),
            );
            let parameters = model.parameters(common_axis);

            let mut analytic = DVector::zeros(parameters.len());
            problem.predict(&parameters, 0, &mut analytic).unwrap();
            let numerical = numerical_gradient(&problem, &parameters);

            assert!(
                (analytic - numerical).norm() < 1e-6,
                "gradient mismatch for common_axis = {common_axis}"
            );
        }
    }

    #[test]
    fn test_not_ready_without_position() {
        let mut calibrator = KnownPositionCalibrator::new();
        calibrator
            .set_measurements(vec![sample_measurement(); MINIMUM_MEASUREMENTS_GENERAL])
            .unwrap();
        assert!(!calibrator.is_ready());
        assert!(matches!(
            calibrator.calibrate(),
            Err(CalibrationError::NotReady { .. })
        ));
        assert!(calibrator.estimate().is_none());
    }

    #[test]
    fn test_minimum_measurements_depend_on_axis_assumption() {
        let mut calibrator = KnownPositionCalibrator::new();
        assert_eq!(calibrator.minimum_required_measurements(), 13);
        calibrator.set_common_axis_used(true).unwrap();
        assert_eq!(calibrator.minimum_required_measurements(), 10);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut calibrator = KnownPositionCalibrator::new();
        let settings = LevenbergMarquardtSettings {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(calibrator.set_settings(settings).is_err());
        assert_eq!(calibrator.settings(), LevenbergMarquardtSettings::default());
    }
}
