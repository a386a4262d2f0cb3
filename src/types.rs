//! Core types and settings for the calibration library

use nalgebra::{Rotation3, Vector3};

use crate::error::{CalibrationError, CalibrationResult};
use crate::position::Position;

/// Body kinematics sensed by an inertial measurement unit
///
/// Specific force is in m/s² and angular rate in rad/s, both resolved in the
/// body frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyKinematics {
    /// Specific force (acceleration minus gravity) in m/s²
    pub specific_force: Vector3<f64>,
    /// Angular rate in rad/s
    pub angular_rate: Vector3<f64>,
}

impl BodyKinematics {
    pub fn new(specific_force: Vector3<f64>, angular_rate: Vector3<f64>) -> Self {
        Self {
            specific_force,
            angular_rate,
        }
    }
}

/// Body frame resolved in ECEF coordinates
///
/// # Example
/// ```
/// use nalgebra::Rotation3;
/// use inertial_calibration::{Frame, GeodeticPosition, Position};
///
/// let position = Position::from_geodetic(GeodeticPosition::from_degrees(45.0, 7.0, 300.0));
/// let frame = Frame::static_at(position, Rotation3::identity());
/// assert_eq!(frame.velocity.norm(), 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Body position
    pub position: Position,
    /// Body velocity relative to the Earth, resolved in ECEF (m/s)
    pub velocity: Vector3<f64>,
    /// Rotation from body axes to ECEF axes
    pub orientation: Rotation3<f64>,
}

impl Frame {
    pub fn new(position: Position, velocity: Vector3<f64>, orientation: Rotation3<f64>) -> Self {
        Self {
            position,
            velocity,
            orientation,
        }
    }

    /// Frame of a body at rest relative to the Earth
    pub fn static_at(position: Position, orientation: Rotation3<f64>) -> Self {
        Self::new(position, Vector3::zeros(), orientation)
    }
}

/// A single calibration measurement
///
/// Pairs the sensed kinematics with the frames that produced them. The frame
/// pair and time interval let a reference model compute the expected specific
/// force; the standard deviations weight the measurement during non-linear
/// fitting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Capture time in seconds
    pub timestamp: f64,
    /// Sensed body kinematics
    pub kinematics: BodyKinematics,
    /// Frame at capture time
    pub frame: Frame,
    /// Frame one time interval earlier
    pub previous_frame: Frame,
    /// Time between `previous_frame` and `frame` in seconds
    pub time_interval: f64,
    /// Specific force noise standard deviation in m/s²
    pub specific_force_standard_deviation: f64,
    /// Angular rate noise standard deviation in rad/s
    pub angular_rate_standard_deviation: f64,
}

/// Standard deviation assumed when none is provided
pub const DEFAULT_STANDARD_DEVIATION: f64 = 1.0;

impl Measurement {
    /// Create a measurement with unit standard deviations
    pub fn new(
        kinematics: BodyKinematics,
        frame: Frame,
        previous_frame: Frame,
        time_interval: f64,
    ) -> Self {
        Self {
            timestamp: 0.0,
            kinematics,
            frame,
            previous_frame,
            time_interval,
            specific_force_standard_deviation: DEFAULT_STANDARD_DEVIATION,
            angular_rate_standard_deviation: DEFAULT_STANDARD_DEVIATION,
        }
    }

    /// Measurement of a body at rest: the previous frame equals the current one
    pub fn stationary(kinematics: BodyKinematics, frame: Frame, time_interval: f64) -> Self {
        Self::new(kinematics, frame, frame, time_interval)
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_standard_deviations(mut self, specific_force: f64, angular_rate: f64) -> Self {
        self.specific_force_standard_deviation = specific_force;
        self.angular_rate_standard_deviation = angular_rate;
        self
    }

    /// Sensed specific force
    pub fn specific_force(&self) -> Vector3<f64> {
        self.kinematics.specific_force
    }

    /// Standard deviation used to weight this measurement
    ///
    /// Non-positive or non-finite values fall back to
    /// [`DEFAULT_STANDARD_DEVIATION`].
    pub(crate) fn weighting_standard_deviation(&self) -> f64 {
        let sigma = self.specific_force_standard_deviation;
        if sigma.is_finite() && sigma > 0.0 {
            sigma
        } else {
            DEFAULT_STANDARD_DEVIATION
        }
    }
}

/// How the robust calibrator computes candidates from a subset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreliminarySolver {
    /// Levenberg-Marquardt on the gravity-norm residual, seeded with the
    /// configured initial bias and Ma
    #[default]
    NonLinear,
    /// Closed-form linear solve against the reference model
    Linear,
    /// Linear solve followed by Levenberg-Marquardt seeded with its result
    LinearRefined,
}

/// Robust calibration settings
///
/// # Example
/// ```
/// use inertial_calibration::RobustSettings;
///
/// let settings = RobustSettings {
///     confidence: 0.999,
///     max_iterations: 2_000,
///     seed: Some(42),
///     ..Default::default()
/// };
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustSettings {
    /// Probability that at least one outlier-free subset is drawn (0, 1]
    pub confidence: f64,
    /// Upper bound on consensus iterations (at least 1)
    pub max_iterations: usize,
    /// Minimum progress change between progress notifications [0, 1]
    pub progress_delta: f64,
    /// Refine the best candidate over its inliers
    pub refine_result: bool,
    /// Keep the covariance of the final estimate
    pub keep_covariance: bool,
    /// Solver used for preliminary candidates
    pub preliminary_solver: PreliminarySolver,
    /// Seed for subset sampling; `None` seeds from the thread RNG
    pub seed: Option<u64>,
}

impl Default for RobustSettings {
    fn default() -> Self {
        Self {
            confidence: 0.99,
            max_iterations: 5000,
            progress_delta: 0.05,
            refine_result: true,
            keep_covariance: true,
            preliminary_solver: PreliminarySolver::default(),
            seed: None,
        }
    }
}

impl RobustSettings {
    /// Check every field against its domain
    pub fn validate(&self) -> CalibrationResult<()> {
        validate_confidence(self.confidence)?;
        validate_max_iterations(self.max_iterations)?;
        validate_progress_delta(self.progress_delta)
    }
}

pub(crate) fn validate_confidence(confidence: f64) -> CalibrationResult<()> {
    if confidence > 0.0 && confidence <= 1.0 {
        Ok(())
    } else {
        Err(CalibrationError::invalid("confidence", "must be in (0, 1]"))
    }
}

pub(crate) fn validate_max_iterations(max_iterations: usize) -> CalibrationResult<()> {
    if max_iterations >= 1 {
        Ok(())
    } else {
        Err(CalibrationError::invalid("max_iterations", "must be at least 1"))
    }
}

pub(crate) fn validate_progress_delta(progress_delta: f64) -> CalibrationResult<()> {
    if (0.0..=1.0).contains(&progress_delta) {
        Ok(())
    } else {
        Err(CalibrationError::invalid("progress_delta", "must be in [0, 1]"))
    }
}

/// Levenberg-Marquardt solver settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevenbergMarquardtSettings {
    /// Maximum number of iterations before reporting non-convergence
    pub max_iterations: usize,
    /// Relative chi-square change below which an iteration counts as stalled
    pub tolerance: f64,
    /// Consecutive stalled iterations required to declare convergence
    pub stalled_iterations: usize,
    /// Initial damping factor
    pub initial_damping: f64,
}

impl Default for LevenbergMarquardtSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            tolerance: 1e-12,
            stalled_iterations: 4,
            initial_damping: 1e-3,
        }
    }
}

impl LevenbergMarquardtSettings {
    pub fn validate(&self) -> CalibrationResult<()> {
        if self.max_iterations == 0 {
            return Err(CalibrationError::invalid("max_iterations", "must be at least 1"));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(CalibrationError::invalid("tolerance", "must be finite and non-negative"));
        }
        if self.stalled_iterations == 0 {
            return Err(CalibrationError::invalid("stalled_iterations", "must be at least 1"));
        }
        if !(self.initial_damping.is_finite() && self.initial_damping > 0.0) {
            return Err(CalibrationError::invalid("initial_damping", "must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_robust_settings_defaults() {
        let settings = RobustSettings::default();
        assert_eq!(settings.confidence, 0.99);
        assert_eq!(settings.max_iterations, 5000);
        assert_eq!(settings.progress_delta, 0.05);
        assert!(settings.refine_result);
        assert!(settings.keep_covariance);
        assert_eq!(settings.preliminary_solver, PreliminarySolver::NonLinear);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_robust_settings_validation() {
        let bad_confidence = RobustSettings {
            confidence: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            bad_confidence.validate(),
            Err(CalibrationError::InvalidArgument { name: "confidence", .. })
        ));

        let bad_iterations = RobustSettings {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(bad_iterations.validate().is_err());

        let bad_delta = RobustSettings {
            progress_delta: 1.5,
            ..Default::default()
        };
        assert!(bad_delta.validate().is_err());
    }

    #[test]
    fn test_weighting_standard_deviation_fallback() {
        let frame = Frame::static_at(Position::new(6_378_137.0, 0.0, 0.0), Rotation3::identity());
        let measurement = Measurement::stationary(BodyKinematics::default(), frame, 0.02);
        assert_eq!(measurement.weighting_standard_deviation(), 1.0);

        let measurement = measurement.with_standard_deviations(0.0, 0.0);
        assert_eq!(measurement.weighting_standard_deviation(), DEFAULT_STANDARD_DEVIATION);

        let measurement = measurement.with_standard_deviations(0.01, 0.001);
        assert_eq!(measurement.weighting_standard_deviation(), 0.01);
    }
}
