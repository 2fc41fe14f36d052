//! splitq-ml: action-value estimators for learned branch ordering
//!
//! This crate provides the estimator side of a branching agent:
//! - **Estimator boundary**: [`ActionValueEstimator`], an opaque
//!   `estimate(state) -> value per action` with a gradient-based update
//! - **Reference network**: [`QNetwork`], a small feedforward network with
//!   explicit backpropagation
//! - **Training pieces**: losses, optimizers (Adam with weight decay, SGD)
//!   and soft target updates
//!
//! # Gradient sanitation
//!
//! Training is split into computing gradients and applying them. An update
//! whose gradients contain NaN or infinity is refused with
//! [`ModelError::NonFiniteGradient`] and the parameters stay bit-identical.
//!
//! # Examples
//!
//! ```rust
//! use splitq_ml::{ActionValueEstimator, NetworkConfig, QNetwork, QSample};
//!
//! let config = NetworkConfig {
//!     hidden_sizes: vec![8],
//!     seed: Some(7),
//!     ..NetworkConfig::default()
//! };
//! let mut net = QNetwork::new(4, 4, config).unwrap();
//!
//! let values = net.estimate(&[1.0, 0.0, 0.0, 1.0]).unwrap();
//! assert_eq!(values.len(), 4);
//!
//! let batch = [QSample { features: vec![1.0, 0.0, 0.0, 1.0], action: 2, target: 1.0 }];
//! let loss = net.fit(&batch).unwrap();
//! assert!(loss.is_finite());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

/// Lightweight tensors
pub mod tensor;

/// Activation functions
pub mod activation;

/// Loss functions
pub mod loss;

/// Optimizers
pub mod optimizer;

/// The estimator trait and gradient containers
pub mod estimator;

/// Feedforward action-value network
pub mod network;

pub use activation::Activation;
pub use estimator::{ActionValueEstimator, Gradients, QSample, argmax};
pub use loss::Loss;
pub use network::{Layer, NetworkConfig, QNetwork};
pub use optimizer::{Adam, AnyOptimizer, Optimizer, OptimizerKind, SGD};
pub use tensor::{Tensor, TensorOps};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Model error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        got: usize,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Training error
    #[error("Training error: {0}")]
    TrainingError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A gradient held NaN or infinity; nothing was updated
    #[error("Non-finite gradient for parameter tensor {parameter}")]
    NonFiniteGradient {
        /// Index of the first offending parameter tensor
        parameter: usize,
    },

    /// Empty input
    #[error("Empty input provided")]
    EmptyInput,

    /// Training was requested while the estimator is in inference mode
    #[error("Estimator is in inference mode")]
    InferenceMode,
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;
