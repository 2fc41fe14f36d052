//! The estimator boundary seen by the agent
//!
//! An action-value estimator maps a state feature vector to one value per
//! action. Training is split into [`ActionValueEstimator::compute_gradients`]
//! and [`ActionValueEstimator::apply_gradients`] so that callers can inspect
//! gradients before any parameter moves.

use crate::tensor::Tensor;
use crate::{ModelError, ModelResult};

/// One regression target for the value of a single action
#[derive(Debug, Clone, PartialEq)]
pub struct QSample {
    /// State features
    pub features: Vec<f64>,
    /// Action whose output is regressed
    pub action: usize,
    /// Regression target for that output
    pub target: f64,
}

/// Gradients for every trainable tensor, in parameter order
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    tensors: Vec<Tensor>,
}

impl Gradients {
    /// Wrap per-parameter gradients
    pub fn new(tensors: Vec<Tensor>) -> Self {
        Self { tensors }
    }

    /// Number of parameter tensors covered
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// True when no parameter is covered
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Gradient tensors in parameter order
    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    /// Mutable access, e.g. for clipping
    pub fn tensors_mut(&mut self) -> &mut [Tensor] {
        &mut self.tensors
    }

    /// True if any entry of any tensor is NaN or infinite
    pub fn has_non_finite(&self) -> bool {
        self.tensors.iter().any(Tensor::has_non_finite)
    }

    /// Index of the first tensor holding a non-finite entry
    pub fn first_non_finite(&self) -> Option<usize> {
        self.tensors.iter().position(Tensor::has_non_finite)
    }

    /// Accumulate another set of gradients with the same layout
    pub fn accumulate(&mut self, other: &Gradients) -> ModelResult<()> {
        if self.tensors.len() != other.tensors.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.tensors.len(),
                got: other.tensors.len(),
            });
        }
        for (mine, theirs) in self.tensors.iter_mut().zip(&other.tensors) {
            mine.add_assign(theirs)?;
        }
        Ok(())
    }
}

/// Opaque `estimate(state) -> value-per-action` with a gradient-based update
pub trait ActionValueEstimator {
    /// Length of the feature vectors accepted by [`Self::estimate`]
    fn input_dim(&self) -> usize;

    /// Number of outputs, one per action id
    fn num_actions(&self) -> usize;

    /// Values of every action in the given state
    fn estimate(&self, features: &[f64]) -> ModelResult<Vec<f64>>;

    /// Mean loss of the batch and its gradients, without touching parameters.
    ///
    /// Fails with [`ModelError::InferenceMode`] outside training mode.
    fn compute_gradients(&self, batch: &[QSample]) -> ModelResult<(f64, Gradients)>;

    /// One optimizer step.
    ///
    /// Fails with [`ModelError::NonFiniteGradient`] and leaves every parameter
    /// untouched if any gradient entry is NaN or infinite.
    fn apply_gradients(&mut self, gradients: &Gradients) -> ModelResult<()>;

    /// Compute and apply gradients for one batch, returning the loss
    fn fit(&mut self, batch: &[QSample]) -> ModelResult<f64> {
        let (loss, gradients) = self.compute_gradients(batch)?;
        self.apply_gradients(&gradients)?;
        Ok(loss)
    }

    /// Move every parameter towards `online` by `tau`
    fn soft_update_from(&mut self, online: &Self, tau: f64) -> ModelResult<()>
    where
        Self: Sized;

    /// Switch between training and inference mode
    fn set_training(&mut self, training: bool);

    /// Whether the estimator is in training mode
    fn is_training(&self) -> bool;

    /// Trainable parameters in gradient order
    fn parameters(&self) -> Vec<&Tensor>;

    /// Serialize the parameters
    fn to_bytes(&self) -> ModelResult<Vec<u8>>;

    /// Replace the parameters with previously serialized ones
    fn load_bytes(&mut self, data: &[u8]) -> ModelResult<()>;
}

/// Index of the largest value; ties go to the lowest index
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
