//! Agent configuration
//!
//! Every field has a default, so a YAML file only needs to name what it
//! changes:
//!
//! ```yaml
//! batch_size: 32
//! network:
//!   hidden_sizes: [32, 32]
//! epsilon:
//!   decay: 0.99
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use splitq_ml::{Activation, NetworkConfig, OptimizerKind};
use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error when reading the file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed YAML
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// A value outside its allowed range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Rewards assigned when experiences are retired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardShaping {
    /// Reward of the terminal transition when the search succeeded
    pub success_reward: f64,
    /// Reward of the terminal transition when the search failed
    pub failure_reward: f64,
    /// Shaped reward when no split happened below a decision
    pub no_progress_reward: f64,
}

impl Default for RewardShaping {
    fn default() -> Self {
        Self {
            success_reward: 10.0,
            failure_reward: -10.0,
            no_progress_reward: 1.0,
        }
    }
}

impl RewardShaping {
    /// `1 / progress`, or the no-progress reward when nothing was split
    pub fn shaped(&self, progress: usize) -> f64 {
        if progress > 0 {
            1.0 / progress as f64
        } else {
            self.no_progress_reward
        }
    }

    /// Reward of the terminal transition
    pub fn terminal(&self, success: bool) -> f64 {
        if success {
            self.success_reward
        } else {
            self.failure_reward
        }
    }
}

/// Exploration schedule parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpsilonSettings {
    /// Initial exploration rate
    pub start: f64,
    /// Floor of the exploration rate
    pub end: f64,
    /// Multiplicative decay applied per episode
    pub decay: f64,
}

impl Default for EpsilonSettings {
    fn default() -> Self {
        Self {
            start: 1.0,
            end: 0.01,
            decay: 0.995,
        }
    }
}

/// Shape and optimiser of the action-value networks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Hidden layer widths
    pub hidden_sizes: Vec<usize>,
    /// Hidden activation
    pub activation: Activation,
    /// Optimiser learning rate
    pub learning_rate: f64,
    /// L2 weight decay of the Adam optimiser
    pub weight_decay: f64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            hidden_sizes: vec![64, 128],
            activation: Activation::ReLU,
            learning_rate: 5e-4,
            weight_decay: 1e-4,
        }
    }
}

/// Top-level agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Discount factor
    pub gamma: f64,
    /// Soft update factor of the target estimator
    pub tau: f64,
    /// Learn every this many recorded steps
    pub update_every: usize,
    /// Sampled minibatch size
    pub batch_size: usize,
    /// Revisit pool capacity
    pub buffer_size: usize,
    /// Seed for sampling, exploration and weight initialisation
    pub seed: Option<u64>,
    /// Network settings
    pub network: NetworkSettings,
    /// Reward settings
    pub rewards: RewardShaping,
    /// Exploration settings
    pub epsilon: EpsilonSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            tau: 1e-3,
            update_every: 4,
            batch_size: 10,
            buffer_size: 100_000,
            seed: None,
            network: NetworkSettings::default(),
            rewards: RewardShaping::default(),
            epsilon: EpsilonSettings::default(),
        }
    }
}

impl AgentConfig {
    /// Parse a YAML document, filling unspecified fields with defaults
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Serialize to YAML
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check every value against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn unit(name: &str, value: f64) -> Result<(), ConfigError> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!(
                    "{name} must lie in [0, 1], got {value}"
                )))
            }
        }

        unit("gamma", self.gamma)?;
        unit("tau", self.tau)?;
        unit("epsilon.start", self.epsilon.start)?;
        unit("epsilon.end", self.epsilon.end)?;
        unit("epsilon.decay", self.epsilon.decay)?;

        if self.epsilon.end > self.epsilon.start {
            return Err(ConfigError::Invalid(
                "epsilon.end must not exceed epsilon.start".to_string(),
            ));
        }
        if self.update_every == 0 {
            return Err(ConfigError::Invalid("update_every must be at least 1".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be at least 1".to_string()));
        }
        if self.network.learning_rate.is_nan() || self.network.learning_rate <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "network.learning_rate must be positive, got {}",
                self.network.learning_rate
            )));
        }
        if self.network.weight_decay.is_nan() || self.network.weight_decay < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "network.weight_decay must be non-negative, got {}",
                self.network.weight_decay
            )));
        }
        if self.network.hidden_sizes.contains(&0) {
            return Err(ConfigError::Invalid(
                "network.hidden_sizes must not contain zero".to_string(),
            ));
        }
        let rewards = [
            self.rewards.success_reward,
            self.rewards.failure_reward,
            self.rewards.no_progress_reward,
        ];
        if rewards.iter().any(|r| !r.is_finite()) {
            return Err(ConfigError::Invalid("rewards must be finite".to_string()));
        }
        Ok(())
    }

    /// Network configuration for one of the two estimators
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            hidden_sizes: self.network.hidden_sizes.clone(),
            hidden_activation: self.network.activation,
            learning_rate: self.network.learning_rate,
            optimizer: OptimizerKind::Adam {
                weight_decay: self.network.weight_decay,
            },
            seed: self.seed,
            ..NetworkConfig::default()
        }
    }
}
