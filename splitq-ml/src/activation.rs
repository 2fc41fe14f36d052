//! Activation functions for hidden and output layers

use serde::{Deserialize, Serialize};

/// Slope of [`Activation::LeakyReLU`] below zero
pub const LEAKY_SLOPE: f64 = 0.01;

/// Nonlinearity following each affine layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// max(0, x)
    ReLU,
    /// ReLU with a small negative slope
    LeakyReLU,
    /// tanh(x)
    Tanh,
    /// Identity; the action-value head is always linear
    Linear,
}

impl Activation {
    /// Value for a pre-activation `x`
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Self::ReLU => x.max(0.0),
            Self::LeakyReLU if x > 0.0 => x,
            Self::LeakyReLU => LEAKY_SLOPE * x,
            Self::Tanh => x.tanh(),
            Self::Linear => x,
        }
    }

    /// d(apply)/dx at the pre-activation `x`
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            Self::ReLU | Self::LeakyReLU if x > 0.0 => 1.0,
            Self::ReLU => 0.0,
            Self::LeakyReLU => LEAKY_SLOPE,
            Self::Tanh => 1.0 - x.tanh().powi(2),
            Self::Linear => 1.0,
        }
    }

    /// Whether He initialisation suits a layer feeding this activation
    pub fn prefers_he_init(&self) -> bool {
        matches!(self, Self::ReLU | Self::LeakyReLU)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu() {
        let act = Activation::ReLU;
        assert_eq!(act.apply(5.0), 5.0);
        assert_eq!(act.apply(-3.0), 0.0);
        assert_eq!(act.derivative(5.0), 1.0);
        assert_eq!(act.derivative(-3.0), 0.0);
    }

    #[test]
    fn test_leaky_relu() {
        let act = Activation::LeakyReLU;
        assert_eq!(act.apply(-2.0), -0.02);
        assert_eq!(act.derivative(-2.0), 0.01);
    }

    #[test]
    fn test_tanh_derivative_at_zero() {
        assert!((Activation::Tanh.derivative(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_linear_is_identity() {
        let act = Activation::Linear;
        assert_eq!(act.apply(-7.5), -7.5);
        assert_eq!(act.derivative(100.0), 1.0);
        assert!(!act.prefers_he_init());
    }
}
