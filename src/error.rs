//! Error types for the calibration library
//!
//! Every fallible operation returns [`CalibrationResult`]. The variants map
//! onto the ways a calibrator can refuse or fail:
//!
//! - [`CalibrationError::Locked`]: a mutator was called while a calibration
//!   is running (only reachable from listener callbacks).
//! - [`CalibrationError::NotReady`]: `calibrate()` was called without enough
//!   data. Supply more measurements (or a position) and retry.
//! - [`CalibrationError::InvalidArgument`]: a setter or constructor received a
//!   value outside its domain. State is never mutated in that case.
//! - [`CalibrationError::Failed`]: the numerical work itself failed. Estimates
//!   keep whatever values they had before the call.

use thiserror::Error;

/// Result type for calibration operations
pub type CalibrationResult<T> = Result<T, CalibrationError>;

/// Errors raised by calibrators
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum CalibrationError {
    /// A calibration is in progress and the calibrator cannot be modified
    #[error("calibrator is locked while a calibration is running")]
    Locked,

    /// The calibrator does not have enough data to run
    #[error("calibrator is not ready: {reason}")]
    NotReady {
        /// What is missing
        reason: &'static str,
    },

    /// A provided value was rejected before any state was changed
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// Name of the offending parameter
        name: &'static str,
        /// Constraint that was violated
        reason: &'static str,
    },

    /// Numerical failure while estimating the calibration
    #[error("calibration failed: {0}")]
    Failed(#[from] FailureKind),
}

/// Numerical failure modes
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A linear system or `I + Ma` could not be inverted
    #[error("matrix is singular or ill-conditioned")]
    SingularMatrix,

    /// The iterative solver ran out of iterations
    #[error("solver did not converge after {iterations} iterations")]
    NotConverged {
        /// Iterations performed before giving up
        iterations: usize,
    },

    /// The robust estimator never produced a valid candidate
    #[error("no candidate solution was supported by the measurements")]
    NoConsensus,

    /// A NaN or infinite value appeared in the solution
    #[error("non-finite value in solution")]
    NonFinite,
}

impl CalibrationError {
    pub(crate) fn invalid(name: &'static str, reason: &'static str) -> Self {
        CalibrationError::InvalidArgument { name, reason }
    }

    pub(crate) fn not_ready(reason: &'static str) -> Self {
        CalibrationError::NotReady { reason }
    }
}
