//! Loss functions over a batch of gathered action values
//!
//! Both losses are batch means, so [`Loss::gradient_batch`] already carries the
//! `1 / n` factor and the per-sample gradients can be summed directly.

use serde::{Deserialize, Serialize};

use crate::{ModelError, ModelResult};

/// Loss function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Loss {
    /// Mean squared error, `mean((p - t)^2)`
    #[default]
    MSE,
    /// Huber loss with `delta = 1` (smooth L1)
    Huber,
}

impl Loss {
    /// Loss of a single prediction
    pub fn compute(&self, prediction: f64, target: f64) -> f64 {
        let diff = prediction - target;
        match self {
            Loss::MSE => diff * diff,
            Loss::Huber => {
                if diff.abs() <= 1.0 {
                    0.5 * diff * diff
                } else {
                    diff.abs() - 0.5
                }
            }
        }
    }

    /// Derivative of [`Loss::compute`] with respect to the prediction
    pub fn gradient(&self, prediction: f64, target: f64) -> f64 {
        let diff = prediction - target;
        match self {
            Loss::MSE => 2.0 * diff,
            Loss::Huber => diff.clamp(-1.0, 1.0),
        }
    }

    /// Mean loss over a batch
    pub fn compute_batch(&self, predictions: &[f64], targets: &[f64]) -> ModelResult<f64> {
        check_batch(predictions, targets)?;
        let sum: f64 = predictions
            .iter()
            .zip(targets)
            .map(|(&p, &t)| self.compute(p, t))
            .sum();
        Ok(sum / predictions.len() as f64)
    }

    /// Per-sample gradients of the batch mean
    pub fn gradient_batch(&self, predictions: &[f64], targets: &[f64]) -> ModelResult<Vec<f64>> {
        check_batch(predictions, targets)?;
        let n = predictions.len() as f64;
        Ok(predictions
            .iter()
            .zip(targets)
            .map(|(&p, &t)| self.gradient(p, t) / n)
            .collect())
    }
}

fn check_batch(predictions: &[f64], targets: &[f64]) -> ModelResult<()> {
    if predictions.is_empty() {
        return Err(ModelError::EmptyInput);
    }
    if predictions.len() != targets.len() {
        return Err(ModelError::DimensionMismatch {
            expected: predictions.len(),
            got: targets.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mse() {
        let loss = Loss::MSE;
        assert_eq!(loss.compute(5.0, 5.0), 0.0);
        assert_eq!(loss.compute(5.0, 3.0), 4.0);
        assert_eq!(loss.gradient(5.0, 3.0), 4.0);
        assert_eq!(loss.gradient(3.0, 5.0), -4.0);
    }

    #[test]
    fn test_huber() {
        let loss = Loss::Huber;
        assert_eq!(loss.compute(0.5, 0.0), 0.125);
        assert_eq!(loss.compute(5.0, 0.0), 4.5);
        assert_eq!(loss.gradient(5.0, 0.0), 1.0);
    }

    #[test]
    fn test_batch_mean() {
        let loss = Loss::MSE;
        let value = loss.compute_batch(&[1.0, 3.0], &[0.0, 0.0]).unwrap();
        assert_eq!(value, 5.0);

        let grads = loss.gradient_batch(&[1.0, 3.0], &[0.0, 0.0]).unwrap();
        assert_eq!(grads, vec![1.0, 3.0]);
    }

    #[test]
    fn test_batch_errors() {
        let loss = Loss::MSE;
        assert!(matches!(loss.compute_batch(&[], &[]), Err(ModelError::EmptyInput)));
        assert!(loss.gradient_batch(&[1.0], &[1.0, 2.0]).is_err());
    }
}
