//! Calibration event callbacks

/// Receives calibration events from a calibrator of type `C`
///
/// Callbacks run synchronously on the thread that called `calibrate()` and
/// receive the calibrator itself. While a calibration runs every mutator on
/// the calibrator returns [`CalibrationError::Locked`](crate::CalibrationError::Locked),
/// so callbacks can inspect state but not change it.
///
/// All methods have empty default implementations.
///
/// # Example
/// ```
/// use inertial_calibration::{CalibratorListener, RobustKnownPositionCalibrator};
///
/// struct ProgressPrinter;
///
/// impl CalibratorListener<RobustKnownPositionCalibrator> for ProgressPrinter {
///     fn on_calibrate_progress_change(
///         &mut self,
///         _calibrator: &mut RobustKnownPositionCalibrator,
///         progress: f64,
///     ) {
///         println!("{:.0}%", progress * 100.0);
///     }
/// }
///
/// let mut calibrator = RobustKnownPositionCalibrator::new();
/// calibrator.set_listener(Some(Box::new(ProgressPrinter))).unwrap();
/// ```
pub trait CalibratorListener<C> {
    /// Called once the calibrator is locked, before any work is done
    fn on_calibrate_start(&mut self, _calibrator: &mut C) {}

    /// Called after a successful calibration, before the calibrator is unlocked
    fn on_calibrate_end(&mut self, _calibrator: &mut C) {}

    /// Called after each consensus iteration of a robust calibrator
    fn on_calibrate_next_iteration(&mut self, _calibrator: &mut C, _iteration: usize) {}

    /// Called when the progress of a robust calibrator advances by at least
    /// its configured progress delta
    fn on_calibrate_progress_change(&mut self, _calibrator: &mut C, _progress: f64) {}
}
