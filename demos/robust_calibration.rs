//! Calibrate a simulated accelerometer from static measurements with outliers
//!
//! Run with `cargo run --example robust_calibration`.

use inertial_calibration::{
    BodyKinematics, CalibrationModel, EcefReferenceModel, Frame, GeodeticPosition, Measurement,
    Position, ReferenceModel, RobustKnownPositionCalibrator, RobustMethod,
};
use nalgebra::{Matrix3, Rotation3, Vector3};
use rand::prelude::*;
use rand_pcg::Pcg64;
use std::f64::consts::PI;

const MEASUREMENTS: usize = 60;
const OUTLIERS: usize = 8;
const NOISE: f64 = 2e-3; // m/s²

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = Pcg64::seed_from_u64(2024);
    let position = Position::from_geodetic(GeodeticPosition::from_degrees(41.3825, 2.1769, 120.0));

    let truth = CalibrationModel::new(
        Vector3::new(0.09, -0.06, 0.12),
        Matrix3::new(
            2.5e-3, -1.2e-3, 6e-4, //
            0.0, -1.8e-3, 9e-4, //
            0.0, 0.0, 1.4e-3,
        ),
    );

    let mut measurements = Vec::with_capacity(MEASUREMENTS);
    for i in 0..MEASUREMENTS {
        let orientation = Rotation3::from_euler_angles(
            rng.random_range(-PI..PI),
            rng.random_range(-PI / 2.0..PI / 2.0),
            rng.random_range(-PI..PI),
        );
        let frame = Frame::static_at(position, orientation);
        let f_true = EcefReferenceModel.kinematics(0.02, &frame, &frame).specific_force;

        let mut f_meas = truth.distort(f_true)
            + Vector3::new(
                rng.random_range(-NOISE..NOISE),
                rng.random_range(-NOISE..NOISE),
                rng.random_range(-NOISE..NOISE),
            );
        // The body was bumped while these were taken
        if i % (MEASUREMENTS / OUTLIERS) == 0 {
            f_meas += Vector3::new(1.5, -0.8, 2.0);
        }

        measurements.push(
            Measurement::stationary(BodyKinematics::new(f_meas, Vector3::zeros()), frame, 0.02)
                .with_timestamp(i as f64)
                .with_standard_deviations(NOISE, 1e-4),
        );
    }

    let mut calibrator = RobustKnownPositionCalibrator::with_method(RobustMethod::msac())?;
    calibrator.set_position(position)?;
    calibrator.set_common_axis_used(true)?;
    calibrator.set_measurements(measurements)?;
    calibrator.set_seed(Some(1))?;
    calibrator.calibrate()?;

    let estimate = calibrator.estimate().ok_or("no estimate")?;
    println!(
        "{} inliers of {} after {} iterations",
        estimate.inliers.num_inliers, MEASUREMENTS, estimate.iterations
    );
    println!("true bias:      {:?}", truth.bias.as_slice());
    println!("estimated bias: {:?}", estimate.model.bias.as_slice());
    if let Some(deviation) = calibrator.estimated_bias_standard_deviation() {
        println!("bias std:       {:?}", deviation.as_slice());
    }
    println!("estimated Ma:{}", estimate.model.ma);
    println!("mse: {:e}, chi2: {:.3}", estimate.mse, estimate.chi_sq);

    Ok(())
}
