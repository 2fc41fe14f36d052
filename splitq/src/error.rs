//! Error types for the bookkeeping core and the agent

use std::path::PathBuf;

use splitq_ml::ModelError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the agent and its bookkeeping
#[derive(Error, Debug)]
pub enum AgentError {
    /// An action coordinate or id outside the action space
    #[error("Invalid action index {index} for an action space of size {size}")]
    InvalidIndex {
        /// Offending index
        index: usize,
        /// Size of the dimension it was checked against
        size: usize,
    },

    /// A constraint or phase outside the state's shape
    #[error("Constraint {constraint} / phase {phase} is out of range")]
    OutOfRange {
        /// Constraint index
        constraint: usize,
        /// Phase index
        phase: usize,
    },

    /// A revisit index that is no longer (or never was) valid
    #[error("Index {index} is out of range for a pool of {len}")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Pool length at the time of the request
        len: usize,
    },

    /// Learning was requested with nothing to learn from
    #[error("Revisit pool is empty")]
    EmptyPool,

    /// The optimiser step was skipped because a gradient was NaN or infinite
    #[error("Non-finite gradient, optimiser step skipped")]
    NonFiniteGradient,

    /// Persisted estimator parameters could not be restored
    #[error("Failed to load estimator from {}: {reason}", path.display())]
    EstimatorLoadFailure {
        /// File that was read
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// State width does not match the estimator input
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected width
        expected: usize,
        /// Actual width
        got: usize,
    },

    /// Error from the estimator
    #[error("Estimator error: {0}")]
    Estimator(#[from] ModelError),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem error while persisting estimators
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;
