//! Closed-form accelerometer calibration against known frames
//!
//! For every measurement the reference model provides the specific force a
//! perfect sensor would have measured. Each measurement contributes three
//! rows of a linear system in the bias and Ma unknowns, solved in the least
//! squares sense through an SVD.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::debug;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use crate::error::{CalibrationError, CalibrationResult, FailureKind};
use crate::listener::CalibratorListener;
use crate::model::{CalibrationModel, parameter_count};
use crate::reference::{EcefReferenceModel, ReferenceModel};
use crate::types::Measurement;

/// Minimum number of measurements for the linear solve
pub const MINIMUM_MEASUREMENTS: usize = 4;

/// Smallest accepted ratio between the smallest and largest singular values
const CONDITION_TOLERANCE: f64 = 1e-12;

/// Listener type accepted by [`KnownFrameLinearCalibrator`]
pub type LinearCalibratorListener = dyn CalibratorListener<KnownFrameLinearCalibrator>;

/// Solve the known-frame linear system for bias and Ma
///
/// Fails with [`FailureKind::SingularMatrix`] when the measurements do not
/// constrain every unknown.
pub(crate) fn solve_known_frame(
    measurements: &[Measurement],
    common_axis: bool,
    reference: &dyn ReferenceModel,
) -> CalibrationResult<CalibrationModel> {
    let unknowns = parameter_count(common_axis);
    let rows = 3 * measurements.len();
    if rows < unknowns {
        return Err(FailureKind::SingularMatrix.into());
    }

    let mut a = DMatrix::<f64>::zeros(rows, unknowns);
    let mut b = DVector::<f64>::zeros(rows);

    for (i, measurement) in measurements.iter().enumerate() {
        let f_true = reference.expected_specific_force(measurement);
        let f_meas = measurement.specific_force();
        let (fx, fy, fz) = (f_true.x, f_true.y, f_true.z);
        let row = 3 * i;

        a[(row, 0)] = 1.0;
        a[(row, 3)] = fx;
        a[(row, 6)] = fy;
        a[(row, 7)] = fz;

        a[(row + 1, 1)] = 1.0;
        a[(row + 1, 4)] = fy;

        a[(row + 2, 2)] = 1.0;
        a[(row + 2, 5)] = fz;

        if common_axis {
            a[(row + 1, 8)] = fz;
        } else {
            a[(row + 1, 8)] = fx;
            a[(row + 1, 9)] = fz;
            a[(row + 2, 10)] = fx;
            a[(row + 2, 11)] = fy;
        }

        let difference = f_meas - f_true;
        b[row] = difference.x;
        b[row + 1] = difference.y;
        b[row + 2] = difference.z;
    }

    let svd = a.svd(true, true);
    let largest = svd.singular_values.max();
    let smallest = svd.singular_values.min();
    if !(largest.is_finite() && smallest > largest * CONDITION_TOLERANCE) {
        debug!(
            "linear system is rank deficient (singular values {:e}..{:e})",
            smallest, largest
        );
        return Err(FailureKind::SingularMatrix.into());
    }

    let solution = svd
        .solve(&b, largest * CONDITION_TOLERANCE)
        .map_err(|_| FailureKind::SingularMatrix)?;
    if !solution.iter().all(|v| v.is_finite()) {
        return Err(FailureKind::NonFinite.into());
    }

    Ok(CalibrationModel::from_parameters(
        solution.as_slice(),
        common_axis,
    ))
}

/// Linear least squares accelerometer calibrator for known frames
///
/// # Example
/// ```
/// use inertial_calibration::KnownFrameLinearCalibrator;
///
/// let mut calibrator = KnownFrameLinearCalibrator::new();
/// calibrator.set_common_axis_used(true).unwrap();
/// assert!(!calibrator.is_ready());
/// assert!(calibrator.calibrate().is_err());
/// ```
pub struct KnownFrameLinearCalibrator {
    measurements: Vec<Measurement>,
    common_axis_used: bool,
    reference: Arc<dyn ReferenceModel>,
    listener: Option<Box<LinearCalibratorListener>>,
    running: bool,
    estimated: Option<CalibrationModel>,
}

impl KnownFrameLinearCalibrator {
    /// Create a calibrator with no measurements and the WGS-84 reference model
    pub fn new() -> Self {
        Self {
            measurements: Vec::new(),
            common_axis_used: false,
            reference: Arc::new(EcefReferenceModel),
            listener: None,
            running: false,
            estimated: None,
        }
    }

    /// Create a calibrator with measurements and axis assumption
    pub fn with_measurements(measurements: Vec<Measurement>, common_axis_used: bool) -> Self {
        Self {
            measurements,
            common_axis_used,
            ..Self::new()
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

    pub fn reference_model(&self) -> &Arc<dyn ReferenceModel> {
        &self.reference
    }

    pub fn set_reference_model(&mut self, reference: Arc<dyn ReferenceModel>) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.reference = reference;
        Ok(())
    }

    pub fn set_listener(
        &mut self,
        listener: Option<Box<LinearCalibratorListener>>,
    ) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        self.listener = listener;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn minimum_required_measurements(&self) -> usize {
        MINIMUM_MEASUREMENTS
    }

    pub fn is_ready(&self) -> bool {
        self.measurements.len() >= MINIMUM_MEASUREMENTS
    }

    /// Estimate bias and Ma from the current measurements
    ///
    /// On failure the previous estimates are left untouched.
    pub fn calibrate(&mut self) -> CalibrationResult<()> {
        self.ensure_unlocked()?;
        if !self.is_ready() {
            return Err(CalibrationError::not_ready(
                "at least 4 measurements are required",
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

        let model = solve_known_frame(
            &self.measurements,
            self.common_axis_used,
            self.reference.as_ref(),
        )?;
        self.estimated = Some(model);

        self.notify(|listener, calibrator| listener.on_calibrate_end(calibrator));
        Ok(())
    }

    /// Estimated model, available after a successful calibration
    pub fn estimated_model(&self) -> Option<&CalibrationModel> {
        self.estimated.as_ref()
    }

    pub fn estimated_biases(&self) -> Option<Vector3<f64>> {
        self.estimated.map(|model| model.bias)
    }

    pub fn estimated_ma(&self) -> Option<Matrix3<f64>> {
        self.estimated.map(|model| model.ma)
    }

    fn ensure_unlocked(&self) -> CalibrationResult<()> {
        if self.running {
            Err(CalibrationError::Locked)
        } else {
            Ok(())
        }
    }

    fn notify(&mut self, event: impl FnOnce(&mut LinearCalibratorListener, &mut Self)) {
        if let Some(mut listener) = self.listener.take() {
            event(listener.as_mut(), self);
            self.listener = Some(listener);
        }
    }
}

impl Default for KnownFrameLinearCalibrator {
    fn default() -> Self {
        Self::new()
    }
}
