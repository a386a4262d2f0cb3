//! Reference model: expected kinematics and gravity at known frames
//!
//! Calibration compares what the accelerometer sensed against what it should
//! have sensed. [`ReferenceModel`] provides the latter as a pure function of
//! the known frames, and [`EcefReferenceModel`] implements it with the WGS-84
//! gravity model and ECEF navigation kinematics.

use nalgebra::{Matrix3, Vector3};

use crate::position::{EARTH_EQUATORIAL_RADIUS, Position};
use crate::types::{BodyKinematics, Frame, Measurement};

/// WGS-84 Earth gravitational constant (m³/s²)
pub const EARTH_GRAVITATIONAL_CONSTANT: f64 = 3.986_004_418e14;
/// Second gravitational constant (dimensionless)
pub const EARTH_SECOND_GRAVITATIONAL_CONSTANT: f64 = 1.082_627e-3;
/// Earth rotation rate (rad/s)
pub const EARTH_ROTATION_RATE: f64 = 7.292_115e-5;

/// Attitude increments below this magnitude use the first-order average
const SMALL_ANGLE: f64 = 1e-8;

/// Source of ground-truth kinematics for calibration
pub trait ReferenceModel {
    /// Kinematics a perfect IMU would sense while moving between two frames
    fn kinematics(&self, time_interval: f64, frame: &Frame, previous_frame: &Frame)
    -> BodyKinematics;

    /// Acceleration due to gravity at a position, resolved in ECEF (m/s²)
    fn gravity(&self, position: &Position) -> Vector3<f64>;

    /// Magnitude of gravity at a position (m/s²)
    fn gravity_norm(&self, position: &Position) -> f64 {
        self.gravity(position).norm()
    }

    /// Specific force a perfect accelerometer would have sensed for a measurement
    fn expected_specific_force(&self, measurement: &Measurement) -> Vector3<f64> {
        self.kinematics(
            measurement.time_interval,
            &measurement.frame,
            &measurement.previous_frame,
        )
        .specific_force
    }
}

/// WGS-84 reference model in ECEF coordinates
///
/// # Example
/// ```
/// use inertial_calibration::{EcefReferenceModel, GeodeticPosition, Position, ReferenceModel};
///
/// let position = Position::from_geodetic(GeodeticPosition::from_degrees(45.0, 0.0, 0.0));
/// let g = EcefReferenceModel.gravity_norm(&position);
/// assert!((g - 9.806).abs() < 0.01);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct EcefReferenceModel;

impl ReferenceModel for EcefReferenceModel {
    fn kinematics(
        &self,
        time_interval: f64,
        frame: &Frame,
        previous_frame: &Frame,
    ) -> BodyKinematics {
        if time_interval <= 0.0 {
            return BodyKinematics::default();
        }

        let c_b_e = *frame.orientation.matrix();
        let old_c_b_e = *previous_frame.orientation.matrix();

        // Earth rotation over the interval
        let alpha_ie = EARTH_ROTATION_RATE * time_interval;
        let (sin_alpha, cos_alpha) = alpha_ie.sin_cos();
        let c_earth = Matrix3::new(
            cos_alpha, sin_alpha, 0.0, //
            -sin_alpha, cos_alpha, 0.0, //
            0.0, 0.0, 1.0,
        );

        // Attitude increment in the body frame
        let c_old_new = c_b_e.transpose() * c_earth * old_c_b_e;
        let alpha_ib_b = Vector3::new(
            0.5 * (c_old_new[(1, 2)] - c_old_new[(2, 1)]),
            0.5 * (c_old_new[(2, 0)] - c_old_new[(0, 2)]),
            0.5 * (c_old_new[(0, 1)] - c_old_new[(1, 0)]),
        );
        let angular_rate = alpha_ib_b / time_interval;

        let earth_increment = Vector3::new(0.0, 0.0, alpha_ie).cross_matrix();
        let mag_alpha = alpha_ib_b.norm();
        let ave_c_b_e = if mag_alpha > SMALL_ANGLE {
            let skew = alpha_ib_b.cross_matrix();
            let mag_alpha_sq = mag_alpha * mag_alpha;
            old_c_b_e
                * (Matrix3::identity()
                    + skew * ((1.0 - mag_alpha.cos()) / mag_alpha_sq)
                    + skew * skew * ((1.0 - mag_alpha.sin() / mag_alpha) / mag_alpha_sq))
                - earth_increment * old_c_b_e * 0.5
        } else {
            old_c_b_e - earth_increment * old_c_b_e * 0.5
        };

        let earth_rate = Vector3::new(0.0, 0.0, EARTH_ROTATION_RATE).cross_matrix();
        let f_ib_e = (frame.velocity - previous_frame.velocity) / time_interval
            - self.gravity(&previous_frame.position)
            + earth_rate * previous_frame.velocity * 2.0;

        let specific_force = match ave_c_b_e.try_inverse() {
            Some(inverse) => inverse * f_ib_e,
            None => old_c_b_e.transpose() * f_ib_e,
        };

        BodyKinematics::new(specific_force, angular_rate)
    }

    fn gravity(&self, position: &Position) -> Vector3<f64> {
        let r = position.ecef();
        let mag_r = r.norm();
        if mag_r == 0.0 {
            return Vector3::zeros();
        }

        // Gravitational acceleration with the J2 term
        let z_scale = 5.0 * (r.z / mag_r).powi(2);
        let j2_factor =
            1.5 * EARTH_SECOND_GRAVITATIONAL_CONSTANT * (EARTH_EQUATORIAL_RADIUS / mag_r).powi(2);
        let gamma = -EARTH_GRAVITATIONAL_CONSTANT / mag_r.powi(3)
            * (r + j2_factor
                * Vector3::new(
                    (1.0 - z_scale) * r.x,
                    (1.0 - z_scale) * r.y,
                    (3.0 - z_scale) * r.z,
                ));

        // Centrifugal acceleration
        let omega_sq = EARTH_ROTATION_RATE * EARTH_ROTATION_RATE;
        gamma + Vector3::new(omega_sq * r.x, omega_sq * r.y, 0.0)
    }
}
