//! Feedforward action-value network
//!
//! Maps a flattened phase pattern to one value per action. Gradients are
//! produced by explicit backpropagation so they can be inspected before the
//! optimizer is allowed to move any weight.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::activation::Activation;
use crate::estimator::{ActionValueEstimator, Gradients, QSample};
use crate::loss::Loss;
use crate::optimizer::{AnyOptimizer, Optimizer, OptimizerKind};
use crate::tensor::{Tensor, TensorOps};
use crate::{ModelError, ModelResult};

/// A single affine layer followed by an activation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Weight matrix \[output_dim, input_dim\]
    pub weights: Tensor,
    /// Bias vector \[output_dim\]
    pub bias: Tensor,
    /// Activation function
    pub activation: Activation,
}

/// Values cached by a training forward pass
struct LayerTrace {
    input: Tensor,
    z: Tensor,
}

impl Layer {
    /// Create a new layer with activation-appropriate initialisation
    pub fn new<R: Rng + ?Sized>(
        input_dim: usize,
        output_dim: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let shape = [output_dim, input_dim];
        let weights = if activation.prefers_he_init() {
            Tensor::he_init(&shape, rng)
        } else {
            Tensor::xavier_init(&shape, rng)
        };

        Self {
            weights,
            bias: Tensor::zeros(&[output_dim]),
            activation,
        }
    }

    /// Check that the tensors form a well-shaped affine layer
    fn check_consistent(&self) -> ModelResult<()> {
        let weight_shape = self.weights.shape();
        let bias_shape = self.bias.shape();
        if weight_shape.len() != 2 || bias_shape.len() != 1 {
            return Err(ModelError::SerializationError(format!(
                "layer tensors must be 2-D weights and 1-D bias, got {weight_shape:?} and {bias_shape:?}"
            )));
        }
        if self.weights.data.len() != weight_shape.iter().product::<usize>()
            || self.bias.data.len() != bias_shape[0]
        {
            return Err(ModelError::SerializationError(
                "layer data length does not match its shape".to_string(),
            ));
        }
        if bias_shape[0] != weight_shape[0] {
            return Err(ModelError::SerializationError(format!(
                "bias width {} does not match {} weight rows",
                bias_shape[0], weight_shape[0]
            )));
        }
        Ok(())
    }

    fn input_dim(&self) -> usize {
        self.weights.shape()[1]
    }

    fn output_dim(&self) -> usize {
        self.weights.shape()[0]
    }

    fn forward(&self, input: &Tensor) -> ModelResult<Tensor> {
        let z = self.weights.matmul_vec(input)?.add(&self.bias)?;
        Ok(z.map(|x| self.activation.apply(x)))
    }

    fn forward_traced(&self, input: Tensor) -> ModelResult<(Tensor, LayerTrace)> {
        let z = self.weights.matmul_vec(&input)?.add(&self.bias)?;
        let output = z.map(|x| self.activation.apply(x));
        Ok((output, LayerTrace { input, z }))
    }

    /// Returns `(grad_input, grad_weights, grad_bias)`
    fn backward(&self, trace: &LayerTrace, grad_output: &Tensor) -> ModelResult<(Tensor, Tensor, Tensor)> {
        let activation_grad = trace.z.map(|x| self.activation.derivative(x));
        let grad_z = grad_output.mul(&activation_grad)?;

        let grad_weights = Tensor::outer(&grad_z, &trace.input);
        let grad_input = self.weights.matmul_vec_transposed(&grad_z)?;

        Ok((grad_input, grad_weights, grad_z))
    }

    /// Get number of parameters
    pub fn num_parameters(&self) -> usize {
        self.weights.size() + self.bias.size()
    }
}

/// Network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Hidden layer widths between input and output
    pub hidden_sizes: Vec<usize>,
    /// Activation of every hidden layer; the output layer is linear
    pub hidden_activation: Activation,
    /// Regression loss on the gathered action values
    pub loss: Loss,
    /// Optimizer learning rate
    pub learning_rate: f64,
    /// Optimizer kind
    pub optimizer: OptimizerKind,
    /// Seed for weight initialisation; random when absent
    pub seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_sizes: vec![64, 128],
            hidden_activation: Activation::ReLU,
            loss: Loss::MSE,
            learning_rate: 5e-4,
            optimizer: OptimizerKind::default(),
            seed: None,
        }
    }
}

/// Serialized form: layout plus weights, no optimizer state
#[derive(Serialize, Deserialize)]
struct Snapshot {
    input_dim: usize,
    num_actions: usize,
    layers: Vec<Layer>,
}

/// Feedforward action-value network
#[derive(Debug, Clone)]
pub struct QNetwork {
    layers: Vec<Layer>,
    config: NetworkConfig,
    input_dim: usize,
    num_actions: usize,
    optimizer: AnyOptimizer,
    training: bool,
    training_steps: usize,
}

impl QNetwork {
    /// Build a network for `input_dim` features and `num_actions` outputs
    pub fn new(input_dim: usize, num_actions: usize, config: NetworkConfig) -> ModelResult<Self> {
        if input_dim == 0 || num_actions == 0 {
            return Err(ModelError::InvalidConfig(
                "input and output dimensions must be non-zero".to_string(),
            ));
        }
        if config.hidden_sizes.contains(&0) {
            return Err(ModelError::InvalidConfig(
                "hidden layers must be non-empty".to_string(),
            ));
        }
        if config.learning_rate.is_nan() || config.learning_rate <= 0.0 {
            return Err(ModelError::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                config.learning_rate
            )));
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut sizes = Vec::with_capacity(config.hidden_sizes.len() + 2);
        sizes.push(input_dim);
        sizes.extend_from_slice(&config.hidden_sizes);
        sizes.push(num_actions);

        let last = sizes.len() - 2;
        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let activation = if i == last {
                    Activation::Linear
                } else {
                    config.hidden_activation
                };
                Layer::new(w[0], w[1], activation, &mut rng)
            })
            .collect();

        Ok(Self {
            layers,
            optimizer: config.optimizer.build(config.learning_rate),
            config,
            input_dim,
            num_actions,
            training: true,
            training_steps: 0,
        })
    }

    /// Get configuration
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Network layers
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of optimizer steps applied
    pub fn num_training_steps(&self) -> usize {
        self.training_steps
    }

    /// Total number of trainable scalars
    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(Layer::num_parameters).sum()
    }

    fn check_input(&self, features: &[f64]) -> ModelResult<()> {
        if features.len() != self.input_dim {
            return Err(ModelError::DimensionMismatch {
                expected: self.input_dim,
                got: features.len(),
            });
        }
        Ok(())
    }

    fn sample_gradients(&self, sample: &QSample, loss_grad: f64) -> ModelResult<Gradients> {
        let mut current = Tensor::from_slice(&sample.features);
        let mut traces = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (output, trace) = layer.forward_traced(current)?;
            traces.push(trace);
            current = output;
        }

        // Only the taken action's output receives gradient
        let mut grad_output = Tensor::zeros(&[self.num_actions]);
        grad_output.data[sample.action] = loss_grad;

        let mut per_layer = Vec::with_capacity(self.layers.len());
        for (layer, trace) in self.layers.iter().zip(&traces).rev() {
            let (grad_input, grad_weights, grad_bias) = layer.backward(trace, &grad_output)?;
            per_layer.push((grad_weights, grad_bias));
            grad_output = grad_input;
        }
        per_layer.reverse();

        Ok(Gradients::new(
            per_layer.into_iter().flat_map(|(w, b)| [w, b]).collect(),
        ))
    }
}

impl ActionValueEstimator for QNetwork {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn estimate(&self, features: &[f64]) -> ModelResult<Vec<f64>> {
        self.check_input(features)?;
        let mut current = Tensor::from_slice(features);
        for layer in &self.layers {
            current = layer.forward(&current)?;
        }
        Ok(current.data)
    }

    fn compute_gradients(&self, batch: &[QSample]) -> ModelResult<(f64, Gradients)> {
        if !self.training {
            return Err(ModelError::InferenceMode);
        }
        if batch.is_empty() {
            return Err(ModelError::EmptyInput);
        }

        let mut predictions = Vec::with_capacity(batch.len());
        let mut targets = Vec::with_capacity(batch.len());
        for sample in batch {
            self.check_input(&sample.features)?;
            if sample.action >= self.num_actions {
                return Err(ModelError::DimensionMismatch {
                    expected: self.num_actions,
                    got: sample.action,
                });
            }
            predictions.push(self.estimate(&sample.features)?[sample.action]);
            targets.push(sample.target);
        }

        let loss = self.config.loss.compute_batch(&predictions, &targets)?;
        let loss_grads = self.config.loss.gradient_batch(&predictions, &targets)?;

        let mut total: Option<Gradients> = None;
        for (sample, &g) in batch.iter().zip(&loss_grads) {
            let grads = self.sample_gradients(sample, g)?;
            match total.as_mut() {
                Some(acc) => acc.accumulate(&grads)?,
                None => total = Some(grads),
            }
        }

        let gradients = total.ok_or(ModelError::EmptyInput)?;
        Ok((loss, gradients))
    }

    fn apply_gradients(&mut self, gradients: &Gradients) -> ModelResult<()> {
        let expected = self.layers.len() * 2;
        if gradients.len() != expected {
            return Err(ModelError::DimensionMismatch {
                expected,
                got: gradients.len(),
            });
        }
        if let Some(index) = gradients.first_non_finite() {
            debug!(parameter = index, "refusing update with non-finite gradient");
            return Err(ModelError::NonFiniteGradient { parameter: index });
        }
        for (gradient, parameter) in gradients.tensors().iter().zip(self.parameters()) {
            if gradient.shape() != parameter.shape() || gradient.data.len() != parameter.data.len() {
                return Err(ModelError::DimensionMismatch {
                    expected: parameter.size(),
                    got: gradient.size(),
                });
            }
        }

        let tensors = gradients.tensors();
        for (i, layer) in self.layers.iter_mut().enumerate() {
            self.optimizer.step(i * 2, &mut layer.weights, &tensors[i * 2])?;
            self.optimizer.step(i * 2 + 1, &mut layer.bias, &tensors[i * 2 + 1])?;
        }

        self.training_steps += 1;
        Ok(())
    }

    fn soft_update_from(&mut self, online: &Self, tau: f64) -> ModelResult<()> {
        if !(0.0..=1.0).contains(&tau) {
            return Err(ModelError::InvalidConfig(format!(
                "soft update factor must lie in [0, 1], got {tau}"
            )));
        }
        if self.layers.len() != online.layers.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.layers.len(),
                got: online.layers.len(),
            });
        }
        for (mine, theirs) in self.layers.iter_mut().zip(&online.layers) {
            mine.weights.lerp_towards(&theirs.weights, tau)?;
            mine.bias.lerp_towards(&theirs.bias, tau)?;
        }
        Ok(())
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.layers
            .iter()
            .flat_map(|l| [&l.weights, &l.bias])
            .collect()
    }

    fn to_bytes(&self) -> ModelResult<Vec<u8>> {
        let snapshot = Snapshot {
            input_dim: self.input_dim,
            num_actions: self.num_actions,
            layers: self.layers.clone(),
        };
        serde_json::to_vec(&snapshot).map_err(|e| ModelError::SerializationError(e.to_string()))
    }

    fn load_bytes(&mut self, data: &[u8]) -> ModelResult<()> {
        let snapshot: Snapshot = serde_json::from_slice(data)
            .map_err(|e| ModelError::SerializationError(e.to_string()))?;

        if snapshot.input_dim != self.input_dim || snapshot.num_actions != self.num_actions {
            return Err(ModelError::SerializationError(format!(
                "snapshot is {}x{}, network is {}x{}",
                snapshot.input_dim, snapshot.num_actions, self.input_dim, self.num_actions
            )));
        }
        if snapshot.layers.is_empty() {
            return Err(ModelError::SerializationError(
                "snapshot has no layers".to_string(),
            ));
        }
        let mut expected_in = self.input_dim;
        for layer in &snapshot.layers {
            layer.check_consistent()?;
            if layer.input_dim() != expected_in {
                return Err(ModelError::SerializationError(
                    "inconsistent layer shapes in snapshot".to_string(),
                ));
            }
            expected_in = layer.output_dim();
        }
        if expected_in != self.num_actions {
            return Err(ModelError::SerializationError(
                "snapshot output width does not match the action count".to_string(),
            ));
        }

        self.layers = snapshot.layers;
        self.optimizer.reset();
        self.training_steps = 0;
        Ok(())
    }
}
