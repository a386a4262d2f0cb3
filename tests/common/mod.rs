#![allow(dead_code)]

use std::f64::consts::PI;

use inertial_calibration::{
    BodyKinematics, CalibrationModel, EcefReferenceModel, Frame, GeodeticPosition, Measurement,
    Position, ReferenceModel,
};
use nalgebra::{Matrix3, Rotation3, Vector3};
use rand::prelude::*;
use rand_pcg::Pcg64;

pub const TIME_INTERVAL: f64 = 0.02;

pub fn position() -> Position {
    Position::from_geodetic(GeodeticPosition::from_degrees(41.3825, 2.1769, 120.0))
}

pub fn gravity_norm() -> f64 {
    EcefReferenceModel.gravity_norm(&position())
}

/// Bias and Ma of a typical consumer-grade accelerometer
pub fn sample_model(common_axis: bool) -> CalibrationModel {
    let mut model = CalibrationModel::new(
        Vector3::new(0.09, -0.06, 0.12),
        Matrix3::new(
            2.5e-3, -1.2e-3, 6e-4, //
            4e-4, -1.8e-3, 9e-4, //
            -7e-4, 5e-4, 1.4e-3,
        ),
    );
    if common_axis {
        model.enforce_common_axis();
    }
    model
}

fn random_orientation(rng: &mut Pcg64) -> Rotation3<f64> {
    Rotation3::from_euler_angles(
        rng.random_range(-PI..PI),
        rng.random_range(-PI / 2.0..PI / 2.0),
        rng.random_range(-PI..PI),
    )
}

/// Measurements of a body at rest in random orientations
///
/// Each component of the sensed specific force gets uniform noise in
/// `[-noise, noise]`.
pub fn stationary_measurements(
    model: &CalibrationModel,
    count: usize,
    noise: f64,
    seed: u64,
) -> Vec<Measurement> {
    let mut rng = Pcg64::seed_from_u64(seed);
    let position = position();

    (0..count)
        .map(|i| {
            let frame = Frame::static_at(position, random_orientation(&mut rng));
            let f_true = EcefReferenceModel
                .kinematics(TIME_INTERVAL, &frame, &frame)
                .specific_force;

            let mut f_meas = model.distort(f_true);
            if noise > 0.0 {
                f_meas += Vector3::new(
                    rng.random_range(-noise..noise),
                    rng.random_range(-noise..noise),
                    rng.random_range(-noise..noise),
                );
            }

            let standard_deviation = if noise > 0.0 { noise } else { 1.0 };
            Measurement::stationary(BodyKinematics::new(f_meas, Vector3::zeros()), frame, TIME_INTERVAL)
                .with_timestamp(i as f64 * TIME_INTERVAL)
                .with_standard_deviations(standard_deviation, 1.0)
        })
        .collect()
}

/// Inliers followed by outliers whose sensed specific force is scaled by 1.25
///
/// Returns the measurements and the expected inlier bitmap.
pub fn measurements_with_outliers(
    model: &CalibrationModel,
    inliers: usize,
    outliers: usize,
    seed: u64,
) -> (Vec<Measurement>, Vec<bool>) {
    let mut measurements = stationary_measurements(model, inliers + outliers, 0.0, seed);
    for measurement in &mut measurements[inliers..] {
        measurement.kinematics.specific_force *= 1.25;
    }

    let mut expected = vec![true; inliers];
    expected.extend(std::iter::repeat_n(false, outliers));
    (measurements, expected)
}

/// Deviation of each corrected measurement from the gravity norm
pub fn max_norm_error(model: &CalibrationModel, measurements: &[Measurement]) -> f64 {
    let g = gravity_norm();
    measurements
        .iter()
        .filter_map(|measurement| model.correct(measurement.specific_force()))
        .map(|corrected| (corrected.norm() - g).abs())
        .fold(0.0, f64::max)
}
