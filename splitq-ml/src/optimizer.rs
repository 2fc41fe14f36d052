//! Optimization Algorithms for Training
//!
//! Optimizers keep per-parameter state keyed by a stable parameter id
//! (`layer * 2` for weights, `layer * 2 + 1` for biases).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::tensor::{Tensor, TensorOps};
use crate::ModelResult;

/// Optimizer trait
pub trait Optimizer {
    /// Update one parameter tensor given its gradient
    fn step(&mut self, param_id: usize, param: &mut Tensor, gradient: &Tensor) -> ModelResult<()>;

    /// Get learning rate
    fn learning_rate(&self) -> f64;

    /// Set learning rate
    fn set_learning_rate(&mut self, lr: f64);

    /// Drop all accumulated state
    fn reset(&mut self);

    /// Number of parameter updates applied
    fn num_steps(&self) -> usize;
}

/// Which optimizer a network is built with
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Plain or momentum SGD
    Sgd {
        /// Momentum coefficient
        momentum: f64,
    },
    /// Adam with coupled L2 weight decay
    Adam {
        /// L2 penalty added to the gradient
        weight_decay: f64,
    },
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::Adam { weight_decay: 1e-4 }
    }
}

impl OptimizerKind {
    /// Instantiate the optimizer
    pub fn build(self, learning_rate: f64) -> AnyOptimizer {
        match self {
            OptimizerKind::Sgd { momentum } => {
                AnyOptimizer::Sgd(SGD::with_momentum(learning_rate, momentum))
            }
            OptimizerKind::Adam { weight_decay } => {
                AnyOptimizer::Adam(Adam::with_weight_decay(learning_rate, weight_decay))
            }
        }
    }
}

/// Owned optimizer of either kind, so networks stay `Clone`
#[derive(Debug, Clone)]
pub enum AnyOptimizer {
    /// SGD state
    Sgd(SGD),
    /// Adam state
    Adam(Adam),
}

impl Default for AnyOptimizer {
    fn default() -> Self {
        OptimizerKind::default().build(5e-4)
    }
}

impl Optimizer for AnyOptimizer {
    fn step(&mut self, param_id: usize, param: &mut Tensor, gradient: &Tensor) -> ModelResult<()> {
        match self {
            AnyOptimizer::Sgd(o) => o.step(param_id, param, gradient),
            AnyOptimizer::Adam(o) => o.step(param_id, param, gradient),
        }
    }

    fn learning_rate(&self) -> f64 {
        match self {
            AnyOptimizer::Sgd(o) => o.learning_rate(),
            AnyOptimizer::Adam(o) => o.learning_rate(),
        }
    }

    fn set_learning_rate(&mut self, lr: f64) {
        match self {
            AnyOptimizer::Sgd(o) => o.set_learning_rate(lr),
            AnyOptimizer::Adam(o) => o.set_learning_rate(lr),
        }
    }

    fn reset(&mut self) {
        match self {
            AnyOptimizer::Sgd(o) => o.reset(),
            AnyOptimizer::Adam(o) => o.reset(),
        }
    }

    fn num_steps(&self) -> usize {
        match self {
            AnyOptimizer::Sgd(o) => o.num_steps(),
            AnyOptimizer::Adam(o) => o.num_steps(),
        }
    }
}

/// Stochastic Gradient Descent (with momentum)
#[derive(Debug, Clone)]
pub struct SGD {
    /// Learning rate
    pub learning_rate: f64,
    /// Momentum coefficient
    pub momentum: f64,
    velocity: FxHashMap<usize, Tensor>,
    steps: usize,
}

impl SGD {
    /// Create new SGD optimizer
    pub fn new(learning_rate: f64) -> Self {
        Self::with_momentum(learning_rate, 0.0)
    }

    /// Create SGD with momentum
    pub fn with_momentum(learning_rate: f64, momentum: f64) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: FxHashMap::default(),
            steps: 0,
        }
    }
}

impl Optimizer for SGD {
    fn step(&mut self, param_id: usize, param: &mut Tensor, gradient: &Tensor) -> ModelResult<()> {
        self.steps += 1;

        let direction = if self.momentum > 0.0 {
            let v = self
                .velocity
                .entry(param_id)
                .or_insert_with(|| Tensor::zeros(param.shape()));
            *v = v.scale(self.momentum).add(gradient)?;
            v.clone()
        } else {
            gradient.clone()
        };

        *param = param.sub(&direction.scale(self.learning_rate))?;
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn reset(&mut self) {
        self.velocity.clear();
        self.steps = 0;
    }

    fn num_steps(&self) -> usize {
        self.steps
    }
}

/// Adam optimizer (Adaptive Moment Estimation)
#[derive(Debug, Clone)]
pub struct Adam {
    /// Learning rate
    pub learning_rate: f64,
    /// Beta1 for first moment
    pub beta1: f64,
    /// Beta2 for second moment
    pub beta2: f64,
    /// Epsilon for numerical stability
    pub epsilon: f64,
    /// L2 penalty folded into the gradient
    pub weight_decay: f64,
    m: FxHashMap<usize, Tensor>,
    v: FxHashMap<usize, Tensor>,
    /// Bias-correction step per parameter
    t: FxHashMap<usize, i32>,
    steps: usize,
}

impl Adam {
    /// Create new Adam optimizer with default parameters
    pub fn new(learning_rate: f64) -> Self {
        Self::with_weight_decay(learning_rate, 0.0)
    }

    /// Adam with an L2 penalty on the parameters
    pub fn with_weight_decay(learning_rate: f64, weight_decay: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay,
            m: FxHashMap::default(),
            v: FxHashMap::default(),
            t: FxHashMap::default(),
            steps: 0,
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, param_id: usize, param: &mut Tensor, gradient: &Tensor) -> ModelResult<()> {
        self.steps += 1;

        let grad = if self.weight_decay > 0.0 {
            gradient.add(&param.scale(self.weight_decay))?
        } else {
            gradient.clone()
        };

        let t = self.t.entry(param_id).or_insert(0);
        *t += 1;
        let t = *t;

        let m = self
            .m
            .entry(param_id)
            .or_insert_with(|| Tensor::zeros(param.shape()));
        *m = m.scale(self.beta1).add(&grad.scale(1.0 - self.beta1))?;

        let v = self
            .v
            .entry(param_id)
            .or_insert_with(|| Tensor::zeros(param.shape()));
        *v = v.scale(self.beta2).add(&grad.mul(&grad)?.scale(1.0 - self.beta2))?;

        let bias_correction1 = 1.0 - self.beta1.powi(t);
        let bias_correction2 = 1.0 - self.beta2.powi(t);

        for ((p, &m_i), &v_i) in param.data.iter_mut().zip(&m.data).zip(&v.data) {
            let m_hat = m_i / bias_correction1;
            let v_hat = v_i / bias_correction2;
            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }

        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn reset(&mut self) {
        self.m.clear();
        self.v.clear();
        self.t.clear();
        self.steps = 0;
    }

    fn num_steps(&self) -> usize {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_step() {
        let mut opt = SGD::new(0.1);
        let mut param = Tensor::from_slice(&[1.0, 2.0]);
        let grad = Tensor::from_slice(&[1.0, -1.0]);

        opt.step(0, &mut param, &grad).unwrap();
        assert!((param.data[0] - 0.9).abs() < 1e-12);
        assert!((param.data[1] - 2.1).abs() < 1e-12);
        assert_eq!(opt.num_steps(), 1);
    }

    #[test]
    fn test_sgd_momentum_accumulates() {
        let mut opt = SGD::with_momentum(1.0, 0.5);
        let mut param = Tensor::from_slice(&[0.0]);
        let grad = Tensor::from_slice(&[1.0]);

        opt.step(0, &mut param, &grad).unwrap();
        opt.step(0, &mut param, &grad).unwrap();
        // v1 = 1, v2 = 1.5
        assert!((param.data[0] + 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_adam_first_step_magnitude() {
        let mut opt = Adam::new(0.01);
        let mut param = Tensor::from_slice(&[1.0]);
        let grad = Tensor::from_slice(&[5.0]);

        opt.step(0, &mut param, &grad).unwrap();
        // Bias-corrected first step is lr * sign(grad)
        assert!((param.data[0] - 0.99).abs() < 1e-6);
    }

    #[test]
    fn test_adam_tracks_params_independently() {
        let mut opt = Adam::new(0.01);
        let mut a = Tensor::from_slice(&[0.0]);
        let mut b = Tensor::from_slice(&[0.0, 0.0]);

        opt.step(0, &mut a, &Tensor::from_slice(&[1.0])).unwrap();
        opt.step(1, &mut b, &Tensor::from_slice(&[1.0, 1.0])).unwrap();
        assert!((a.data[0] - b.data[0]).abs() < 1e-12);

        opt.reset();
        assert_eq!(opt.num_steps(), 0);
    }

    #[test]
    fn test_optimizer_kind_build() {
        let opt = OptimizerKind::default().build(5e-4);
        assert!(matches!(opt, AnyOptimizer::Adam(_)));
        assert_eq!(opt.learning_rate(), 5e-4);

        let sgd = OptimizerKind::Sgd { momentum: 0.9 }.build(0.1);
        assert!(matches!(sgd, AnyOptimizer::Sgd(ref o) if o.momentum == 0.9));
    }
}
