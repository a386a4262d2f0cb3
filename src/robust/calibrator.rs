//! Robust accelerometer calibrator for a body at a known position

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{info, trace, warn};
use nalgebra::{DMatrix, Matrix3, Vector3};

use super::RobustMethod;
use super::engine::{self, Consensus, ConsensusProblem, EngineSettings, InliersData};
use crate::error::{CalibrationError, CalibrationResult};
use crate::linear::solve_known_frame;
use crate::listener::CalibratorListener;
use crate::model::{CalibrationModel, PreliminaryResult};
use crate::nonlinear::{fit_known_position, minimum_measurements};
use crate::position::Position;
use crate::reference::{EcefReferenceModel, ReferenceModel};
use crate::residual::gravity_norm_residual;
use crate::types::{
    LevenbergMarquardtSettings, Measurement, PreliminarySolver, RobustSettings,
    validate_confidence, validate_max_iterations, validate_progress_delta,
};

/// Listener type accepted by [`RobustKnownPositionCalibrator`]
pub type RobustCalibratorListener = dyn CalibratorListener<RobustKnownPositionCalibrator>;

/// Outcome of a robust calibration
#[derive(Debug, Clone, PartialEq)]
pub struct RobustEstimate {
    /// Estimated bias and Ma
    pub model: CalibrationModel,
    /// Mean square error of the final fit
    pub mse: f64,
    /// Chi-square of the final fit
    pub chi_sq: f64,
    /// Parameter covariance, present when it was requested and available
    pub covariance: Option<DMatrix<f64>>,
    /// Inliers of the best preliminary candidate
    pub inliers: InliersData,
    /// Consensus iterations performed
    pub iterations: usize,
    /// Whether the estimate was refined over the inliers
    pub refined: bool,
}

/// Robust accelerometer calibrator for a body at rest at a known position
///
/// Measurements may contain outliers. Candidates are fitted to subsets of
/// [`preliminary_subset_size`](Self::preliminary_subset_size) measurements,
/// scored with [`gravity_norm_residual`], and the best one is refined over
/// its inliers.
///
/// # Example
/// ```
/// use inertial_calibration::{GeodeticPosition, RobustKnownPositionCalibrator, RobustMethod};
///
/// let mut calibrator = RobustKnownPositionCalibrator::with_method(RobustMethod::ransac()).unwrap();
/// calibrator.set_position(GeodeticPosition::from_degrees(41.38, 2.17, 12.0)).unwrap();
/// calibrator.set_common_axis_used(true).unwrap();
/// calibrator.set_seed(Some(7)).unwrap();
///
/// assert_eq!(calibrator.preliminary_subset_size(), 10);
/// assert!(!calibrator.is_ready());
/// ```
pub struct RobustKnownPositionCalibrator {
    measurements: Vec<Measurement>,
    common_axis_used: bool,
    position: Option<Position>,
    initial_bias: Vector3<f64>,
    initial_ma: Matrix3<f64>,
    settings: RobustSettings,
    refiner_settings: LevenbergMarquardtSettings,
    method: RobustMethod,
    preliminary_subset_size: Option<usize>,
    reference: Arc<dyn ReferenceModel>,
    listener: Option<Box<RobustCalibratorListener>>,
    running: bool,
    estimate: Option<RobustEstimate>,
}

impl RobustKnownPositionCalibrator {
    /// Create a calibrator using LMedS and default settings
    pub fn new() -> Self {
        Self {
            measurements: Vec::new(),
            common_axis_used: false,
            position: None,
            initial_bias: Vector3::zeros(),
            initial_ma: Matrix3::zeros(),
            settings: RobustSettings::default(),
            refiner_settings: LevenbergMarquardtSettings::default(),
            method: RobustMethod::default(),
            preliminary_subset_size: None,
            reference: Arc::new(EcefReferenceModel),
            listener: None,
            running: false,
            estimate: None,
        }
    }

    /// Create a calibrator for the given method
    ///
    /// Fails when the method's tuning is out of range or it carries fewer
    /// quality scores than the general-case subset size.
    pub fn with_method(method: RobustMethod) -> CalibrationResult<Self> {
        let mut calibrator = Self::new();
        calibrator.set_method(method)?;
        Ok(calibrator)
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

    /// Switch the axis assumption
    ///
    /// A subset size below the new minimum reverts to the default size.
    pub fn set_common_axis_used(&mut self, common_axis_used: bool) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.common_axis_used = common_axis_used;
        let minimum = self.minimum_required_measurements();
        if self.preliminary_subset_size.is_some_and(|size| size < minimum) {
            self.preliminary_subset_size = None;
        }
        Ok(())
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    /// Set the known position, either as ECEF or geodetic coordinates
    pub fn set_position(&mut self, position: impl Into<Position>) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.position = Some(position.into());
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

    /// Set the initial bias from `[bx, by, bz]`
    pub fn set_initial_bias_slice(&mut self, bias: &[f64]) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        if bias.len() != 3 {
            return Err(CalibrationError::invalid("bias", "must hold exactly 3 values"));
        }
        self.initial_bias = Vector3::from_column_slice(bias);
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

    /// Set the initial Ma from 9 values in row-major order
    pub fn set_initial_ma_slice(&mut self, ma: &[f64]) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        if ma.len() != 9 {
            return Err(CalibrationError::invalid("ma", "must hold exactly 9 values"));
        }
        self.initial_ma = Matrix3::from_row_slice(ma);
        Ok(())
    }

    pub fn settings(&self) -> &RobustSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: RobustSettings) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    pub fn set_confidence(&mut self, confidence: f64) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        validate_confidence(confidence)?;
        self.settings.confidence = confidence;
        Ok(())
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        validate_max_iterations(max_iterations)?;
        self.settings.max_iterations = max_iterations;
        Ok(())
    }

    pub fn set_progress_delta(&mut self, progress_delta: f64) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        validate_progress_delta(progress_delta)?;
        self.settings.progress_delta = progress_delta;
        Ok(())
    }

    pub fn set_refine_result(&mut self, refine_result: bool) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.settings.refine_result = refine_result;
        Ok(())
    }

    pub fn set_keep_covariance(&mut self, keep_covariance: bool) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.settings.keep_covariance = keep_covariance;
        Ok(())
    }

    pub fn set_preliminary_solver(&mut self, solver: PreliminarySolver) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.settings.preliminary_solver = solver;
        Ok(())
    }

    pub fn set_seed(&mut self, seed: Option<u64>) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.settings.seed = seed;
        Ok(())
    }

    /// Settings of the Levenberg-Marquardt fits on subsets and inliers
    pub fn refiner_settings(&self) -> LevenbergMarquardtSettings {
        self.refiner_settings
    }

    pub fn set_refiner_settings(
        &mut self,
        settings: LevenbergMarquardtSettings,
    ) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        settings.validate()?;
        self.refiner_settings = settings;
        Ok(())
    }

    pub fn method(&self) -> &RobustMethod {
        &self.method
    }

    pub fn set_method(&mut self, method: RobustMethod) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        method.validate(self.preliminary_subset_size())?;
        self.method = method;
        Ok(())
    }

    /// Measurements per preliminary subset
    ///
    /// Defaults to [`minimum_required_measurements`](Self::minimum_required_measurements).
    pub fn preliminary_subset_size(&self) -> usize {
        let minimum = self.minimum_required_measurements();
        self.preliminary_subset_size.map_or(minimum, |size| size.max(minimum))
    }

    pub fn set_preliminary_subset_size(&mut self, size: usize) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        if size < self.minimum_required_measurements() {
            return Err(CalibrationError::invalid(
                "preliminary_subset_size",
                "must be at least the minimum number of measurements",
            ));
        }
        self.method.validate(size)?;
        self.preliminary_subset_size = Some(size);
        Ok(())
    }

    pub fn set_reference_model(&mut self, reference: Arc<dyn ReferenceModel>) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.reference = reference;
        Ok(())
    }

    pub fn set_listener(
        &mut self,
        listener: Option<Box<RobustCalibratorListener>>,
    ) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.listener = listener;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// 13 in the general case, 10 with a common axis
    pub fn minimum_required_measurements(&self) -> usize {
        minimum_measurements(self.common_axis_used)
    }

    /// A position is set, there are enough measurements to fill a subset, and
    /// quality scores (if the method uses them) match the measurements
    pub fn is_ready(&self) -> bool {
        self.position.is_some()
            && self.measurements.len() >= self.preliminary_subset_size()
            && self
                .method
                .quality_scores()
                .is_none_or(|scores| scores.len() == self.measurements.len())
    }

    /// Run the robust calibration
    ///
    /// On failure the previous estimate is left untouched.
    pub fn calibrate(&mut self) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        if !self.is_ready() {
            return Err(CalibrationError::not_ready(
                "a position, enough measurements and matching quality scores are required",
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
        let method = self.method.clone();
        let engine_settings = EngineSettings {
            confidence: self.settings.confidence,
            max_iterations: self.settings.max_iterations,
            progress_delta: self.settings.progress_delta,
            seed: self.settings.seed,
        };

        let consensus = engine::run(
            &mut CalibrationRun {
                calibrator: self,
                gravity_norm,
            },
            &method,
            &engine_settings,
        )?;
        let estimate = self.finish(consensus, gravity_norm);
        info!(
            "{} calibration finished: {} of {} inliers after {} iterations (refined: {})",
            method.name(),
            estimate.inliers.num_inliers,
            self.measurements.len(),
            estimate.iterations,
            estimate.refined
        );
        self.estimate = Some(estimate);

        self.notify(|listener, calibrator| listener.on_calibrate_end(calibrator));
        Ok(())
    }

    /// Candidate from the measurements at `subset`
    fn preliminary_result(
        &self,
        subset: &[usize],
        gravity_norm: f64,
    ) -> CalibrationResult<PreliminaryResult> {
        let measurements: Vec<Measurement> = subset.iter().map(|&i| self.measurements[i]).collect();
        let initial = CalibrationModel::new(self.initial_bias, self.initial_ma);

        match self.settings.preliminary_solver {
            PreliminarySolver::NonLinear => self.fit(&measurements, gravity_norm, &initial),
            PreliminarySolver::Linear => {
                let model = solve_known_frame(
                    &measurements,
                    self.common_axis_used,
                    self.reference.as_ref(),
                )?;
                Ok(unfitted_result(model, &measurements, gravity_norm))
            }
            PreliminarySolver::LinearRefined => {
                let seed = solve_known_frame(
                    &measurements,
                    self.common_axis_used,
                    self.reference.as_ref(),
                )?;
                self.fit(&measurements, gravity_norm, &seed)
            }
        }
    }

    fn fit(
        &self,
        measurements: &[Measurement],
        gravity_norm: f64,
        initial: &CalibrationModel,
    ) -> CalibrationResult<PreliminaryResult> {
        let estimate = fit_known_position(
            measurements,
            gravity_norm,
            self.common_axis_used,
            initial,
            &self.refiner_settings,
        )?;
        Ok(PreliminaryResult {
            model: estimate.model,
            mse: estimate.mse,
            chi_sq: estimate.chi_sq,
            covariance: estimate.covariance.filter(|_| self.settings.keep_covariance),
        })
    }

    /// Refine the best candidate over its inliers, keeping it unchanged when
    /// refinement is disabled or fails
    fn finish(&self, consensus: Consensus<PreliminaryResult>, gravity_norm: f64) -> RobustEstimate {
        let Consensus {
            model: best,
            inliers,
            iterations,
        } = consensus;

        let mut estimate = RobustEstimate {
            model: best.model,
            mse: best.mse,
            chi_sq: best.chi_sq,
            covariance: best.covariance,
            inliers,
            iterations,
            refined: false,
        };

        if self.settings.refine_result && estimate.inliers.num_inliers > 0 {
            let inlier_measurements: Vec<Measurement> = self
                .measurements
                .iter()
                .zip(&estimate.inliers.inliers)
                .filter_map(|(measurement, &inlier)| inlier.then_some(*measurement))
                .collect();

            match fit_known_position(
                &inlier_measurements,
                gravity_norm,
                self.common_axis_used,
                &best.model,
                &self.refiner_settings,
            ) {
                Ok(refined) => {
                    estimate.model = refined.model;
                    estimate.mse = refined.mse;
                    estimate.chi_sq = refined.chi_sq;
                    estimate.covariance = refined.covariance;
                    estimate.refined = true;
                }
                Err(error) => warn!(
                    "refinement over {} inliers failed, keeping preliminary result: {}",
                    inlier_measurements.len(),
                    error
                ),
            }
        }

        if !self.settings.keep_covariance {
            estimate.covariance = None;
        }
        estimate
    }

    pub fn estimate(&self) -> Option<&RobustEstimate> {
        self.estimate.as_ref()
    }

    pub fn estimated_model(&self) -> Option<CalibrationModel> {
        self.estimate.as_ref().map(|estimate| estimate.model)
    }

    pub fn estimated_biases(&self) -> Option<Vector3<f64>> {
        self.estimated_model().map(|model| model.bias)
    }

    pub fn estimated_ma(&self) -> Option<Matrix3<f64>> {
        self.estimated_model().map(|model| model.ma)
    }

    pub fn estimated_sx(&self) -> Option<f64> {
        self.estimated_model().map(|model| model.sx())
    }

    pub fn estimated_sy(&self) -> Option<f64> {
        self.estimated_model().map(|model| model.sy())
    }

    pub fn estimated_sz(&self) -> Option<f64> {
        self.estimated_model().map(|model| model.sz())
    }

    pub fn estimated_mxy(&self) -> Option<f64> {
        self.estimated_model().map(|model| model.mxy())
    }

    pub fn estimated_mxz(&self) -> Option<f64> {
        self.estimated_model().map(|model| model.mxz())
    }

    pub fn estimated_myx(&self) -> Option<f64> {
        self.estimated_model().map(|model| model.myx())
    }

    pub fn estimated_myz(&self) -> Option<f64> {
        self.estimated_model().map(|model| model.myz())
    }

    pub fn estimated_mzx(&self) -> Option<f64> {
        self.estimated_model().map(|model| model.mzx())
    }

    pub fn estimated_mzy(&self) -> Option<f64> {
        self.estimated_model().map(|model| model.mzy())
    }

    /// Covariance of `[bx, by, bz, sx, sy, sz, mxy, mxz, (myx), myz, (mzx), (mzy)]`
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

    /// Per-axis bias standard deviation, `sqrt` of the covariance diagonal
    pub fn estimated_bias_standard_deviation(&self) -> Option<Vector3<f64>> {
        self.estimated_covariance().map(|covariance| {
            Vector3::new(
                covariance[(0, 0)].sqrt(),
                covariance[(1, 1)].sqrt(),
                covariance[(2, 2)].sqrt(),
            )
        })
    }

    pub fn estimated_bias_standard_deviation_average(&self) -> Option<f64> {
        self.estimated_bias_standard_deviation()
            .map(|deviation| deviation.mean())
    }

    pub fn estimated_bias_standard_deviation_norm(&self) -> Option<f64> {
        self.estimated_bias_standard_deviation()
            .map(|deviation| deviation.norm())
    }

    pub fn inliers_data(&self) -> Option<&InliersData> {
        self.estimate.as_ref().map(|estimate| &estimate.inliers)
    }

    /// Consensus iterations of the last successful calibration
    pub fn iterations(&self) -> Option<usize> {
        self.estimate.as_ref().map(|estimate| estimate.iterations)
    }

    fn ensure_unlocked(&self) -> CalibrationResult<()> {
        if self.running {
            Err(CalibrationError::Locked)
        } else {
            Ok(())
        }
    }

    fn notify(&mut self, event: impl FnOnce(&mut RobustCalibratorListener, &mut Self)) {
        if let Some(mut listener) = self.listener.take() {
            event(listener.as_mut(), self);
            self.listener = Some(listener);
        }
    }
}

impl Default for RobustKnownPositionCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Preliminary result of a closed-form solve, scored on its own subset
fn unfitted_result(
    model: CalibrationModel,
    measurements: &[Measurement],
    gravity_norm: f64,
) -> PreliminaryResult {
    let (sum_sq, chi_sq) = measurements
        .iter()
        .fold((0.0, 0.0), |(sum_sq, chi_sq), measurement| {
            let residual = gravity_norm_residual(&model, measurement.specific_force(), gravity_norm);
            let sigma = measurement.weighting_standard_deviation();
            (sum_sq + residual, chi_sq + residual / (sigma * sigma))
        });

    PreliminaryResult {
        model,
        mse: sum_sq / measurements.len().max(1) as f64,
        chi_sq,
        covariance: None,
    }
}

/// One calibration run seen by the consensus loop
struct CalibrationRun<'a> {
    calibrator: &'a mut RobustKnownPositionCalibrator,
    gravity_norm: f64,
}

impl ConsensusProblem for CalibrationRun<'_> {
    type Model = PreliminaryResult;

    fn total_samples(&self) -> usize {
        self.calibrator.measurements.len()
    }

    fn subset_size(&self) -> usize {
        self.calibrator.preliminary_subset_size()
    }

    fn estimate_preliminary_solutions(
        &mut self,
        subset: &[usize],
        solutions: &mut Vec<PreliminaryResult>,
    ) {
        match self.calibrator.preliminary_result(subset, self.gravity_norm) {
            Ok(result) => solutions.push(result),
            Err(error) => {
                solutions.clear();
                trace!("discarding subset: {}", error);
            }
        }
    }

    fn residual(&self, model: &PreliminaryResult, index: usize) -> f64 {
        gravity_norm_residual(
            &model.model,
            self.calibrator.measurements[index].specific_force(),
            self.gravity_norm,
        )
    }

    fn on_next_iteration(&mut self, iteration: usize) {
        self.calibrator.notify(|listener, calibrator| {
            listener.on_calibrate_next_iteration(calibrator, iteration)
        });
    }

    fn on_progress_change(&mut self, progress: f64) {
        self.calibrator.notify(|listener, calibrator| {
            listener.on_calibrate_progress_change(calibrator, progress)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::GeodeticPosition;

    fn position() -> Position {
        Position::from_geodetic(GeodeticPosition::from_degrees(41.38, 2.17, 12.0))
    }

    #[test]
    fn test_defaults() {
        let calibrator = RobustKnownPositionCalibrator::new();
        assert_eq!(calibrator.method(), &RobustMethod::lmeds());
        assert_eq!(calibrator.preliminary_subset_size(), 13);
        assert!(!calibrator.is_running());
        assert!(!calibrator.is_ready());
        assert!(calibrator.estimate().is_none());
        assert!(calibrator.estimated_covariance().is_none());
    }

    #[test]
    fn test_subset_size_follows_axis_assumption() {
        let mut calibrator = RobustKnownPositionCalibrator::new();
        calibrator.set_common_axis_used(true).unwrap();
        assert_eq!(calibrator.preliminary_subset_size(), 10);

        calibrator.set_preliminary_subset_size(11).unwrap();
        assert_eq!(calibrator.preliminary_subset_size(), 11);
        assert!(calibrator.set_preliminary_subset_size(9).is_err());
        assert_eq!(calibrator.preliminary_subset_size(), 11);

        calibrator.set_common_axis_used(false).unwrap();
        assert_eq!(calibrator.preliminary_subset_size(), 13);
    }

    #[test]
    fn test_invalid_arguments_leave_state_unchanged() {
        let mut calibrator = RobustKnownPositionCalibrator::new();

        assert!(calibrator.set_initial_bias_slice(&[1.0, 2.0]).is_err());
        assert_eq!(calibrator.initial_bias(), Vector3::zeros());
        calibrator.set_initial_bias_slice(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(calibrator.initial_bias(), Vector3::new(1.0, 2.0, 3.0));

        assert!(calibrator.set_initial_ma_slice(&[0.0; 8]).is_err());
        calibrator
            .set_initial_ma_slice(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
            .unwrap();
        assert_eq!(calibrator.initial_ma()[(0, 1)], 1.0);
        assert_eq!(calibrator.initial_ma()[(1, 0)], 3.0);

        assert!(calibrator.set_confidence(1.5).is_err());
        assert!(calibrator.set_progress_delta(-0.1).is_err());
        assert!(calibrator.set_max_iterations(0).is_err());
        assert_eq!(calibrator.settings(), &RobustSettings::default());
    }

    #[test]
    fn test_quality_scores_checked_against_subset_and_measurements() {
        assert!(RobustKnownPositionCalibrator::with_method(RobustMethod::prosac(vec![1.0; 12])).is_err());

        let mut calibrator = RobustKnownPositionCalibrator::new();
        calibrator.set_common_axis_used(true).unwrap();
        calibrator
            .set_method(RobustMethod::promeds(vec![1.0; 12]))
            .unwrap();
        calibrator.set_position(position()).unwrap();

        let frame = crate::types::Frame::static_at(position(), nalgebra::Rotation3::identity());
        let measurement =
            Measurement::stationary(crate::types::BodyKinematics::default(), frame, 0.02);
        calibrator.set_measurements(vec![measurement; 11]).unwrap();
        assert!(!calibrator.is_ready());

        calibrator.set_measurements(vec![measurement; 12]).unwrap();
        assert!(calibrator.is_ready());

        assert!(calibrator.set_preliminary_subset_size(13).is_err());
    }
}
