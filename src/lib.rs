//! Inertial Calibration - robust accelerometer calibration at a known position
//!
//! Estimates the error model of an accelerometer, `f_meas = b + (I + Ma) * f_true`,
//! where `b` is the bias and `Ma` holds the scale factors (diagonal) and
//! cross-coupling errors (off-diagonal).
//!
//! Measurements are taken with the body at rest in many orientations at a
//! known position. Local gravity is known there, so every corrected
//! measurement must have the same magnitude. Measurements that violate the
//! model, for example because the body moved, are rejected as outliers.
//!
//! # Features
//!
//! - Robust estimation with RANSAC, LMedS, MSAC, PROSAC and PROMedS
//! - Levenberg-Marquardt refinement over the inliers with parameter covariance
//! - Closed-form linear calibration against known frames
//! - General (12 unknowns) or common z-axis (9 unknowns) error models
//! - WGS-84 gravity and ECEF kinematics reference model
//! - Seedable sampling for reproducible runs
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::{Matrix3, Rotation3, Vector3};
//! use inertial_calibration::{
//!     BodyKinematics, CalibrationModel, EcefReferenceModel, Frame, GeodeticPosition, Measurement,
//!     Position, ReferenceModel, RobustKnownPositionCalibrator, RobustMethod,
//! };
//!
//! let position = Position::from_geodetic(GeodeticPosition::from_degrees(41.38, 2.17, 12.0));
//! let truth = CalibrationModel::new(
//!     Vector3::new(0.05, -0.08, 0.12),
//!     Matrix3::new(2e-3, -1e-3, 5e-4, 0.0, -1.5e-3, 8e-4, 0.0, 0.0, 1e-3),
//! );
//!
//! // Body at rest in 20 orientations
//! let measurements: Vec<Measurement> = (0..20)
//!     .map(|i| {
//!         let angle = i as f64;
//!         let orientation = Rotation3::from_euler_angles(0.7 * angle, 0.2 - 1.3 * angle, 0.4 * angle);
//!         let frame = Frame::static_at(position, orientation);
//!         let f_true = EcefReferenceModel.kinematics(0.02, &frame, &frame).specific_force;
//!         let kinematics = BodyKinematics::new(truth.distort(f_true), Vector3::zeros());
//!         Measurement::stationary(kinematics, frame, 0.02)
//!     })
//!     .collect();
//!
//! let mut calibrator = RobustKnownPositionCalibrator::with_method(RobustMethod::ransac()).unwrap();
//! calibrator.set_position(position).unwrap();
//! calibrator.set_common_axis_used(true).unwrap();
//! calibrator.set_measurements(measurements).unwrap();
//! calibrator.set_seed(Some(1)).unwrap();
//! calibrator.calibrate().unwrap();
//!
//! let bias = calibrator.estimated_biases().unwrap();
//! assert!((bias - truth.bias).norm() < 1e-6);
//! ```

mod error;
mod fitter;
mod linear;
mod listener;
mod math;
pub mod model;
mod nonlinear;
mod position;
pub mod reference;
pub mod residual;
mod robust;
mod types;

// Re-export all public types and functions
pub use error::{CalibrationError, CalibrationResult, FailureKind};
pub use linear::{KnownFrameLinearCalibrator, LinearCalibratorListener};
pub use listener::CalibratorListener;
pub use math::{DEG_TO_RAD, Matrix3Ext, RAD_TO_DEG, Vector3Ext};
pub use model::{CalibrationModel, PreliminaryResult};
pub use nonlinear::{
    KnownPositionCalibrator, KnownPositionCalibratorListener, MINIMUM_MEASUREMENTS_COMMON_AXIS,
    MINIMUM_MEASUREMENTS_GENERAL, NonLinearEstimate,
};
pub use position::{EARTH_ECCENTRICITY, EARTH_EQUATORIAL_RADIUS, GeodeticPosition, Position};
pub use reference::{EcefReferenceModel, ReferenceModel};
pub use robust::{
    ConsensusError, DEFAULT_INLIER_FACTOR, DEFAULT_STOP_THRESHOLD, DEFAULT_THRESHOLD, InliersData,
    RobustCalibratorListener, RobustEstimate, RobustKnownPositionCalibrator, RobustMethod,
};
pub use types::*;
