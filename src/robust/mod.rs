//! Robust estimation of the accelerometer calibration
//!
//! Candidates are computed from small measurement subsets, every measurement
//! is scored against each candidate, and the best supported candidate is
//! refined over its inliers. The five supported methods differ only in how
//! subsets are drawn and how candidates are scored:
//!
//! | Method  | Sampling    | Score                                   |
//! |---------|-------------|-----------------------------------------|
//! | RANSAC  | uniform     | number of residuals below `threshold`   |
//! | MSAC    | uniform     | sum of residuals truncated at threshold |
//! | LMedS   | uniform     | median residual                         |
//! | PROSAC  | progressive | number of residuals below `threshold`   |
//! | PROMedS | progressive | median residual                         |
//!
//! Progressive sampling draws from the measurements with the highest quality
//! scores first and widens the pool as iterations proceed.

mod calibrator;
mod engine;
mod sampler;

pub use calibrator::{RobustCalibratorListener, RobustEstimate, RobustKnownPositionCalibrator};
pub use engine::{ConsensusError, InliersData};

use crate::error::{CalibrationError, CalibrationResult};

/// Default squared residual threshold for RANSAC, MSAC and PROSAC
pub const DEFAULT_THRESHOLD: f64 = 1e-2;
/// Default median residual below which LMedS and PROMedS stop early
pub const DEFAULT_STOP_THRESHOLD: f64 = 1e-5;
/// Default multiple of the robust standard deviation that bounds LMedS inliers
pub const DEFAULT_INLIER_FACTOR: f64 = 1.5;

/// Robust estimation method and its tuning
///
/// # Example
/// ```
/// use inertial_calibration::RobustMethod;
///
/// let method = RobustMethod::msac();
/// assert_eq!(method, RobustMethod::Msac { threshold: 1e-2 });
/// assert!(method.quality_scores().is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RobustMethod {
    /// Random sample consensus
    Ransac { threshold: f64 },
    /// Least median of squares
    Lmeds { stop_threshold: f64, inlier_factor: f64 },
    /// M-estimator sample consensus
    Msac { threshold: f64 },
    /// Progressive sample consensus driven by per-measurement quality scores
    Prosac { threshold: f64, quality_scores: Vec<f64> },
    /// Progressive least median of squares
    Promeds {
        stop_threshold: f64,
        inlier_factor: f64,
        quality_scores: Vec<f64>,
    },
}

impl Default for RobustMethod {
    fn default() -> Self {
        Self::lmeds()
    }
}

impl RobustMethod {
    pub fn ransac() -> Self {
        Self::Ransac {
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn lmeds() -> Self {
        Self::Lmeds {
            stop_threshold: DEFAULT_STOP_THRESHOLD,
            inlier_factor: DEFAULT_INLIER_FACTOR,
        }
    }

    pub fn msac() -> Self {
        Self::Msac {
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// PROSAC with one quality score per measurement; higher is better
    pub fn prosac(quality_scores: Vec<f64>) -> Self {
        Self::Prosac {
            threshold: DEFAULT_THRESHOLD,
            quality_scores,
        }
    }

    /// PROMedS with one quality score per measurement; higher is better
    pub fn promeds(quality_scores: Vec<f64>) -> Self {
        Self::Promeds {
            stop_threshold: DEFAULT_STOP_THRESHOLD,
            inlier_factor: DEFAULT_INLIER_FACTOR,
            quality_scores,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ransac { .. } => "RANSAC",
            Self::Lmeds { .. } => "LMedS",
            Self::Msac { .. } => "MSAC",
            Self::Prosac { .. } => "PROSAC",
            Self::Promeds { .. } => "PROMedS",
        }
    }

    pub fn quality_scores(&self) -> Option<&[f64]> {
        match self {
            Self::Prosac { quality_scores, .. } | Self::Promeds { quality_scores, .. } => {
                Some(quality_scores)
            }
            _ => None,
        }
    }

    /// Check tuning values, and quality scores against the subset size
    pub fn validate(&self, subset_size: usize) -> CalibrationResult<()> {
        match self {
            Self::Ransac { threshold }
            | Self::Msac { threshold }
            | Self::Prosac { threshold, .. } => {
                if !(threshold.is_finite() && *threshold > 0.0) {
                    return Err(CalibrationError::invalid("threshold", "must be positive"));
                }
            }
            Self::Lmeds {
                stop_threshold,
                inlier_factor,
            }
            | Self::Promeds {
                stop_threshold,
                inlier_factor,
                ..
            } => {
                if !(stop_threshold.is_finite() && *stop_threshold >= 0.0) {
                    return Err(CalibrationError::invalid(
                        "stop_threshold",
                        "must be finite and non-negative",
                    ));
                }
                if !(inlier_factor.is_finite() && *inlier_factor > 0.0) {
                    return Err(CalibrationError::invalid("inlier_factor", "must be positive"));
                }
            }
        }

        if let Some(scores) = self.quality_scores() {
            if scores.len() < subset_size {
                return Err(CalibrationError::invalid(
                    "quality_scores",
                    "fewer scores than the preliminary subset size",
                ));
            }
            if !scores.iter().all(|score| score.is_finite()) {
                return Err(CalibrationError::invalid("quality_scores", "must be finite"));
            }
        }
        Ok(())
    }
}
