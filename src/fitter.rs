//! Levenberg-Marquardt fitting of scalar observations
//!
//! Each sample `i` has an observed value `y_i`, a standard deviation `σ_i` and
//! a model prediction `ŷ_i(p)` with gradient `∂ŷ_i/∂p`. The fitter minimizes
//! `χ² = Σ ((y_i - ŷ_i(p)) / σ_i)²` starting from an initial guess.

use log::trace;
use nalgebra::{DMatrix, DVector};

use crate::error::{CalibrationResult, FailureKind};
use crate::types::LevenbergMarquardtSettings;

/// Damping beyond which no step can reduce chi-square any further
const MAX_DAMPING: f64 = 1e16;
const MIN_DAMPING: f64 = 1e-16;
/// Relative floor for the damped diagonal so unconstrained parameters stay solvable
const DIAGONAL_FLOOR: f64 = 1e-12;
/// Eigenvalues below this fraction of the largest are treated as unobservable
const RELATIVE_EIGENVALUE_CUTOFF: f64 = 1e-10;

/// Scalar least squares problem solved by [`levenberg_marquardt`]
pub(crate) trait LeastSquaresProblem {
    fn parameter_count(&self) -> usize;

    fn sample_count(&self) -> usize;

    fn observed(&self, index: usize) -> f64;

    fn standard_deviation(&self, index: usize) -> f64;

    /// Model prediction for a sample, writing its gradient into `gradient`
    ///
    /// Returns `None` when the model cannot be evaluated at `parameters`.
    fn predict(
        &self,
        parameters: &DVector<f64>,
        index: usize,
        gradient: &mut DVector<f64>,
    ) -> Option<f64>;
}

/// Converged fit
#[derive(Debug, Clone)]
pub(crate) struct FitOutcome {
    pub parameters: DVector<f64>,
    pub chi_sq: f64,
    pub mse: f64,
    pub covariance: DMatrix<f64>,
    pub iterations: usize,
}

/// Normal equations at one parameter vector
struct Evaluation {
    alpha: DMatrix<f64>,
    beta: DVector<f64>,
    chi_sq: f64,
    sum_sq: f64,
}

fn evaluate<P: LeastSquaresProblem>(problem: &P, parameters: &DVector<f64>) -> Option<Evaluation> {
    let n = problem.parameter_count();
    let mut alpha = DMatrix::zeros(n, n);
    let mut beta = DVector::zeros(n);
    let mut gradient = DVector::zeros(n);
    let mut chi_sq = 0.0;
    let mut sum_sq = 0.0;

    for index in 0..problem.sample_count() {
        let predicted = problem.predict(parameters, index, &mut gradient)?;
        let sigma = problem.standard_deviation(index);
        let weight = 1.0 / (sigma * sigma);
        let dy = problem.observed(index) - predicted;

        chi_sq += dy * dy * weight;
        sum_sq += dy * dy;
        alpha.ger(weight, &gradient, &gradient, 1.0);
        beta.axpy(weight * dy, &gradient, 1.0);
    }

    let finite = chi_sq.is_finite()
        && alpha.iter().all(|v| v.is_finite())
        && beta.iter().all(|v| v.is_finite());
    finite.then_some(Evaluation {
        alpha,
        beta,
        chi_sq,
        sum_sq,
    })
}

/// Covariance `(JᵀWJ)⁻¹`, or its pseudo-inverse when some parameter
/// combinations are not observable
///
/// Directions with an eigenvalue below [`RELATIVE_EIGENVALUE_CUTOFF`] times the
/// largest are dropped, so the result stays positive semi-definite.
fn covariance(alpha: &DMatrix<f64>) -> CalibrationResult<DMatrix<f64>> {
    let n = alpha.nrows();
    let symmetric = (alpha + alpha.transpose()) * 0.5;
    let eigen = symmetric.symmetric_eigen();

    let largest = eigen.eigenvalues.max();
    if !(largest.is_finite() && largest > 0.0) {
        return Err(FailureKind::SingularMatrix.into());
    }
    let cutoff = RELATIVE_EIGENVALUE_CUTOFF * largest;

    let mut covariance = DMatrix::zeros(n, n);
    let mut dropped = 0;
    for (k, &eigenvalue) in eigen.eigenvalues.iter().enumerate() {
        if eigenvalue > cutoff {
            let direction = eigen.eigenvectors.column(k);
            covariance.ger(1.0 / eigenvalue, &direction, &direction, 1.0);
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        trace!("covariance dropped {} unobservable directions", dropped);
    }

    if covariance.iter().all(|v| v.is_finite()) {
        Ok(covariance)
    } else {
        Err(FailureKind::SingularMatrix.into())
    }
}

/// Minimize chi-square from `initial`
///
/// Convergence is declared once chi-square changes by less than
/// `settings.tolerance` (relative, or absolute below 1) for
/// `settings.stalled_iterations` consecutive trial steps, or when the damping
/// saturates after at least one accepted step.
pub(crate) fn levenberg_marquardt<P: LeastSquaresProblem>(
    problem: &P,
    initial: DVector<f64>,
    settings: &LevenbergMarquardtSettings,
) -> CalibrationResult<FitOutcome> {
    let n = problem.parameter_count();
    let mut parameters = initial;
    let mut current = evaluate(problem, &parameters).ok_or(FailureKind::SingularMatrix)?;
    let mut damping = settings.initial_damping;
    let mut stalled = 0;
    let mut accepted = false;

    for iteration in 1..=settings.max_iterations {
        let floor = DIAGONAL_FLOOR * current.alpha.diagonal().max().max(1.0);
        let mut augmented = current.alpha.clone();
        for j in 0..n {
            let diagonal = current.alpha[(j, j)].max(floor);
            augmented[(j, j)] = current.alpha[(j, j)] + damping * diagonal;
        }

        let step = augmented.cholesky().map(|cholesky| cholesky.solve(&current.beta));
        let trial = step
            .map(|step| &parameters + step)
            .and_then(|trial| evaluate(problem, &trial).map(|evaluation| (trial, evaluation)));

        match trial {
            Some((trial_parameters, evaluation)) => {
                let change = (current.chi_sq - evaluation.chi_sq).abs();
                if change <= settings.tolerance * current.chi_sq.max(1.0) {
                    stalled += 1;
                } else {
                    stalled = 0;
                }

                if evaluation.chi_sq <= current.chi_sq {
                    parameters = trial_parameters;
                    current = evaluation;
                    accepted = true;
                    damping = (damping * 0.1).max(MIN_DAMPING);
                } else {
                    damping *= 10.0;
                }
            }
            None => damping *= 10.0,
        }

        if damping > MAX_DAMPING && !accepted && stalled < settings.stalled_iterations {
            trace!("levenberg-marquardt saturated without accepting a step");
            return Err(FailureKind::NotConverged {
                iterations: iteration,
            }
            .into());
        }

        if stalled >= settings.stalled_iterations || damping > MAX_DAMPING {
            trace!(
                "levenberg-marquardt converged after {} iterations, chi2 = {:e}",
                iteration, current.chi_sq
            );
            let samples = problem.sample_count().max(1) as f64;
            return Ok(FitOutcome {
                covariance: covariance(&current.alpha)?,
                mse: current.sum_sq / samples,
                chi_sq: current.chi_sq,
                parameters,
                iterations: iteration,
            });
        }
    }

    Err(FailureKind::NotConverged {
        iterations: settings.max_iterations,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalibrationError;

    /// Fit y = a * exp(b * x)
    struct Exponential {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for Exponential {
        fn parameter_count(&self) -> usize {
            2
        }

        fn sample_count(&self) -> usize {
            self.x.len()
        }

        fn observed(&self, index: usize) -> f64 {
            self.y[index]
        }

        fn standard_deviation(&self, _index: usize) -> f64 {
            0.1
        }

        fn predict(
            &self,
            parameters: &DVector<f64>,
            index: usize,
            gradient: &mut DVector<f64>,
        ) -> Option<f64> {
            let (a, b) = (parameters[0], parameters[1]);
            let e = (b * self.x[index]).exp();
            gradient[0] = e;
            gradient[1] = a * self.x[index] * e;
            Some(a * e)
        }
    }

    #[test]
    fn test_fits_exponential() {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let y = x.iter().map(|x| 2.0 * (-0.7 * x).exp()).collect();
        let problem = Exponential { x, y };

        let outcome = levenberg_marquardt(
            &problem,
            DVector::from_column_slice(&[1.0, 0.0]),
            &LevenbergMarquardtSettings::default(),
        )
        .unwrap();

        assert!((outcome.parameters[0] - 2.0).abs() < 1e-8);
        assert!((outcome.parameters[1] + 0.7).abs() < 1e-8);
        assert!(outcome.chi_sq < 1e-12);
        assert_eq!(outcome.covariance.shape(), (2, 2));
        assert!(outcome.covariance[(0, 0)] > 0.0);
        assert!(outcome.covariance[(1, 1)] > 0.0);
    }

    #[test]
    fn test_unevaluable_start_fails() {
        struct Broken;

        impl LeastSquaresProblem for Broken {
            fn parameter_count(&self) -> usize {
                1
            }
            fn sample_count(&self) -> usize {
                3
            }
            fn observed(&self, _index: usize) -> f64 {
                1.0
            }
            fn standard_deviation(&self, _index: usize) -> f64 {
                1.0
            }
            fn predict(
                &self,
                _parameters: &DVector<f64>,
                _index: usize,
                _gradient: &mut DVector<f64>,
            ) -> Option<f64> {
                None
            }
        }

        let result = levenberg_marquardt(
            &Broken,
            DVector::zeros(1),
            &LevenbergMarquardtSettings::default(),
        );
        assert!(result.is_err());
    }

    /// Only evaluable at the starting point, so no step is ever accepted
    struct Pinned;

    impl LeastSquaresProblem for Pinned {
        fn parameter_count(&self) -> usize {
            1
        }
        fn sample_count(&self) -> usize {
            3
        }
        fn observed(&self, _index: usize) -> f64 {
            1.0
        }
        fn standard_deviation(&self, _index: usize) -> f64 {
            1.0
        }
        fn predict(
            &self,
            parameters: &DVector<f64>,
            _index: usize,
            gradient: &mut DVector<f64>,
        ) -> Option<f64> {
            gradient[0] = 1.0;
            (parameters[0] == 0.0).then_some(0.0)
        }
    }

    #[test]
    fn test_saturated_damping_without_progress_fails() {
        let result = levenberg_marquardt(
            &Pinned,
            DVector::zeros(1),
            &LevenbergMarquardtSettings::default(),
        );
        assert!(matches!(
            result,
            Err(CalibrationError::Failed(FailureKind::NotConverged { iterations: 20 }))
        ));
    }

    /// Nearly singular normal equations keep only the observable direction
    #[test]
    fn test_covariance_of_rank_deficient_system() {
        let alpha = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0 + 1e-14]);
        assert!(alpha.clone().try_inverse().is_some());

        let covariance = covariance(&alpha).unwrap();
        for value in covariance.iter() {
            assert!((value - 0.25).abs() < 1e-9);
        }
    }

    #[test]
    fn test_covariance_of_zero_matrix_fails() {
        assert!(covariance(&DMatrix::zeros(3, 3)).is_err());
    }
}
