//! Generic consensus loop shared by every robust method

use log::{debug, trace};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use thiserror::Error;

use super::RobustMethod;
use super::sampler::{ProgressiveSampler, Sampler, UniformSampler};
use crate::error::{CalibrationError, FailureKind};
use crate::math::median;
use crate::residual::MAX_RESIDUAL;

/// Normalization of the median absolute residual to a Gaussian standard deviation
const MEDIAN_NORMALIZATION: f64 = 1.4826;

/// Errors raised by the consensus loop
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("{samples} samples cannot fill subsets of {subset_size}")]
    NotEnoughSamples { samples: usize, subset_size: usize },

    #[error("no candidate was supported by any sample")]
    NoConsensus,
}

impl From<ConsensusError> for CalibrationError {
    fn from(error: ConsensusError) -> Self {
        match error {
            ConsensusError::NotEnoughSamples { .. } => {
                CalibrationError::not_ready("not enough measurements for the preliminary subset size")
            }
            ConsensusError::NoConsensus => FailureKind::NoConsensus.into(),
        }
    }
}

/// Problem solved by [`run`]
pub(crate) trait ConsensusProblem {
    type Model;

    fn total_samples(&self) -> usize;

    fn subset_size(&self) -> usize;

    /// Append the candidates computed from `subset` to `solutions`
    ///
    /// Leaving `solutions` empty discards the subset.
    fn estimate_preliminary_solutions(&mut self, subset: &[usize], solutions: &mut Vec<Self::Model>);

    /// Residual of sample `index` under `model`
    fn residual(&self, model: &Self::Model, index: usize) -> f64;

    fn on_next_iteration(&mut self, _iteration: usize) {}

    fn on_progress_change(&mut self, _progress: f64) {}
}

/// Loop parameters
#[derive(Debug, Clone, Copy)]
pub(crate) struct EngineSettings {
    pub confidence: f64,
    pub max_iterations: usize,
    pub progress_delta: f64,
    pub seed: Option<u64>,
}

/// Inliers of the best candidate
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InliersData {
    /// `true` for each measurement accepted as an inlier
    pub inliers: Vec<bool>,
    /// Number of `true` entries in `inliers`
    pub num_inliers: usize,
    /// Residual of every measurement under the best candidate
    pub residuals: Vec<f64>,
}

/// Best candidate found by [`run`]
#[derive(Debug, Clone)]
pub(crate) struct Consensus<M> {
    pub model: M,
    pub inliers: InliersData,
    pub iterations: usize,
}

/// Score of a candidate; lower cost is better
#[derive(Debug, Clone, Copy)]
struct Score {
    cost: f64,
    num_inliers: usize,
    inlier_threshold: f64,
}

/// How candidates are scored
#[derive(Debug, Clone, Copy)]
enum Scoring {
    /// Count residuals at or below the threshold
    Count { threshold: f64 },
    /// Sum residuals truncated at the threshold
    Truncated { threshold: f64 },
    /// Median residual
    Median { stop_threshold: f64, inlier_factor: f64 },
}

impl Scoring {
    fn for_method(method: &RobustMethod) -> Self {
        match *method {
            RobustMethod::Ransac { threshold } | RobustMethod::Prosac { threshold, .. } => {
                Scoring::Count { threshold }
            }
            RobustMethod::Msac { threshold } => Scoring::Truncated { threshold },
            RobustMethod::Lmeds {
                stop_threshold,
                inlier_factor,
            }
            | RobustMethod::Promeds {
                stop_threshold,
                inlier_factor,
                ..
            } => Scoring::Median {
                stop_threshold,
                inlier_factor,
            },
        }
    }

    fn score(&self, residuals: &[f64], scratch: &mut Vec<f64>, subset_size: usize) -> Score {
        let count = |threshold: f64| residuals.iter().filter(|&&r| r <= threshold).count();

        match *self {
            Scoring::Count { threshold } => {
                let num_inliers = count(threshold);
                Score {
                    cost: -(num_inliers as f64),
                    num_inliers,
                    inlier_threshold: threshold,
                }
            }
            Scoring::Truncated { threshold } => Score {
                cost: residuals.iter().map(|r| r.min(threshold)).sum(),
                num_inliers: count(threshold),
                inlier_threshold: threshold,
            },
            Scoring::Median {
                stop_threshold,
                inlier_factor,
            } => {
                scratch.clear();
                scratch.extend_from_slice(residuals);
                let median_residual = median(scratch);
                if median_residual >= MAX_RESIDUAL {
                    return Score {
                        cost: MAX_RESIDUAL,
                        num_inliers: 0,
                        inlier_threshold: 0.0,
                    };
                }

                // Residuals are squared errors, so the threshold is squared too
                let n = residuals.len();
                let correction = if n > subset_size {
                    1.0 + 5.0 / (n - subset_size) as f64
                } else {
                    1.0
                };
                let sigma = MEDIAN_NORMALIZATION * correction * median_residual.sqrt();
                let inlier_threshold = (inlier_factor * sigma).powi(2).max(stop_threshold);

                Score {
                    cost: median_residual,
                    num_inliers: count(inlier_threshold),
                    inlier_threshold,
                }
            }
        }
    }

    fn should_stop(&self, best: &Score) -> bool {
        match *self {
            Scoring::Median { stop_threshold, .. } => best.cost <= stop_threshold,
            _ => false,
        }
    }
}

/// Iterations needed to draw an all-inlier subset with the given confidence
pub(crate) fn required_iterations(
    confidence: f64,
    inlier_ratio: f64,
    subset_size: usize,
    max_iterations: usize,
) -> usize {
    let all_inliers = inlier_ratio.powi(subset_size as i32);
    if all_inliers >= 1.0 {
        return 1;
    }
    if all_inliers <= 0.0 || confidence >= 1.0 {
        return max_iterations;
    }

    let iterations = ((1.0 - confidence).ln() / (1.0 - all_inliers).ln()).ceil();
    if iterations.is_finite() {
        (iterations as usize).clamp(1, max_iterations)
    } else {
        max_iterations
    }
}

enum AnySampler {
    Uniform(UniformSampler),
    Progressive(ProgressiveSampler),
}

impl AnySampler {
    fn draw(&mut self, rng: &mut Pcg64, subset: &mut Vec<usize>) {
        match self {
            AnySampler::Uniform(sampler) => sampler.draw(rng, subset),
            AnySampler::Progressive(sampler) => sampler.draw(rng, subset),
        }
    }
}

struct Best<M> {
    model: M,
    score: Score,
    residuals: Vec<f64>,
}

/// Run the consensus loop
///
/// Stops once the best candidate's inlier ratio says enough subsets were
/// drawn for `settings.confidence`, or after `settings.max_iterations`. The
/// first candidate to reach a score is kept on ties.
pub(crate) fn run<P: ConsensusProblem>(
    problem: &mut P,
    method: &RobustMethod,
    settings: &EngineSettings,
) -> Result<Consensus<P::Model>, ConsensusError> {
    let total = problem.total_samples();
    let subset_size = problem.subset_size();
    if subset_size == 0 || total < subset_size {
        return Err(ConsensusError::NotEnoughSamples {
            samples: total,
            subset_size,
        });
    }

    let scoring = Scoring::for_method(method);
    let mut sampler = match method.quality_scores() {
        Some(scores) if scores.len() == total => AnySampler::Progressive(ProgressiveSampler::new(
            scores,
            subset_size,
            settings.max_iterations,
        )),
        _ => AnySampler::Uniform(UniformSampler::new(total, subset_size)),
    };
    let mut rng = match settings.seed {
        Some(seed) => Pcg64::seed_from_u64(seed),
        None => Pcg64::from_rng(&mut rand::rng()),
    };

    let mut best: Option<Best<P::Model>> = None;
    let mut required = settings.max_iterations;
    let mut iteration = 0;
    let mut last_progress = 0.0;
    let mut subset = Vec::with_capacity(subset_size);
    let mut solutions = Vec::new();
    let mut residuals = vec![0.0; total];
    let mut scratch = Vec::with_capacity(total);

    while iteration < required {
        sampler.draw(&mut rng, &mut subset);
        solutions.clear();
        problem.estimate_preliminary_solutions(&subset, &mut solutions);
        if solutions.is_empty() {
            trace!("subset {:?} produced no candidate", subset);
        }

        for model in solutions.drain(..) {
            for (index, residual) in residuals.iter_mut().enumerate() {
                *residual = problem.residual(&model, index);
            }
            let score = scoring.score(&residuals, &mut scratch, subset_size);
            if score.num_inliers == 0 {
                continue;
            }

            let improved = best.as_ref().is_none_or(|best| score.cost < best.score.cost);
            if improved {
                let inlier_ratio = score.num_inliers as f64 / total as f64;
                required = required_iterations(
                    settings.confidence,
                    inlier_ratio,
                    subset_size,
                    settings.max_iterations,
                );
                debug!(
                    "{} iteration {}: {} inliers, cost {:e}, {} iterations required",
                    method.name(),
                    iteration + 1,
                    score.num_inliers,
                    score.cost,
                    required
                );
                best = Some(Best {
                    model,
                    score,
                    residuals: residuals.clone(),
                });
            }
        }

        iteration += 1;
        problem.on_next_iteration(iteration);

        let progress = (iteration as f64 / required.max(1) as f64).min(1.0);
        if progress - last_progress >= settings.progress_delta {
            last_progress = progress;
            problem.on_progress_change(progress);
        }

        if best
            .as_ref()
            .is_some_and(|best| scoring.should_stop(&best.score))
        {
            break;
        }
    }

    if last_progress < 1.0 {
        problem.on_progress_change(1.0);
    }

    let best = best.ok_or(ConsensusError::NoConsensus)?;
    debug!(
        "{} finished after {} iterations with {} of {} inliers",
        method.name(),
        iteration,
        best.score.num_inliers,
        total
    );

    let threshold = best.score.inlier_threshold;
    let inliers: Vec<bool> = best.residuals.iter().map(|&r| r <= threshold).collect();
    Ok(Consensus {
        model: best.model,
        inliers: InliersData {
            num_inliers: best.score.num_inliers,
            inliers,
            residuals: best.residuals,
        },
        iterations: iteration,
    })
}
