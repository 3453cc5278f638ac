//! Optimizer abstractions for neural network parameter updates
//!
//! Each trainable tensor of a layer owns one optimizer instance, built lazily
//! from an [`OptimizerKind`] on the first update. Stateful optimizers such as
//! Adam therefore keep separate moment estimates for weights and biases.
//!
//! # Available Optimizers
//!
//! - SGD: Vanilla stochastic gradient descent
//! - Adam: Adaptive moment estimation with bias correction

pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::Sgd;

use crate::config::TrainingConfig;
use std::error::Error;

/// Core trait for neural network optimizers.
pub trait Optimizer {
    /// Update parameters in-place from their gradients.
    ///
    /// # Panics
    ///
    /// Implementations may panic if parameters and gradients have different lengths.
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]);

    /// Clear accumulated state (no-op for stateless optimizers).
    fn reset(&mut self);

    fn learning_rate(&self) -> f32;
}

/// Recipe for the optimizer instances attached to each parameter tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerKind {
    Sgd {
        learning_rate: f32,
    },
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
}

impl OptimizerKind {
    /// Optimizer selected by a training configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use mnist_param_export::config::TrainingConfig;
    /// use mnist_param_export::optimizers::OptimizerKind;
    ///
    /// let kind = OptimizerKind::from_config(&TrainingConfig::default()).unwrap();
    /// assert!(matches!(kind, OptimizerKind::Adam { .. }));
    /// ```
    pub fn from_config(config: &TrainingConfig) -> Result<Self, Box<dyn Error>> {
        match config.optimizer.to_lowercase().as_str() {
            "adam" => Ok(Self::Adam {
                learning_rate: config.learning_rate,
                beta1: config.beta1,
                beta2: config.beta2,
                epsilon: config.epsilon,
            }),
            "sgd" => Ok(Self::Sgd {
                learning_rate: config.learning_rate,
            }),
            other => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Invalid optimizer '{}'. Must be one of: adam, sgd", other),
            ))),
        }
    }

    pub fn learning_rate(&self) -> f32 {
        match *self {
            Self::Sgd { learning_rate } | Self::Adam { learning_rate, .. } => learning_rate,
        }
    }

    /// Build a fresh optimizer instance.
    pub fn build(&self) -> Box<dyn Optimizer> {
        match *self {
            Self::Sgd { learning_rate } => Box::new(Sgd::new(learning_rate)),
            Self::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(learning_rate, beta1, beta2, epsilon)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_sgd() {
        let config = TrainingConfig {
            optimizer: "SGD".to_string(),
            learning_rate: 0.1,
            ..TrainingConfig::default()
        };
        let kind = OptimizerKind::from_config(&config).unwrap();
        assert_eq!(kind, OptimizerKind::Sgd { learning_rate: 0.1 });
        assert_eq!(kind.build().learning_rate(), 0.1);
    }

    #[test]
    fn test_from_config_rejects_unknown() {
        let config = TrainingConfig {
            optimizer: "rmsprop".to_string(),
            ..TrainingConfig::default()
        };
        assert!(OptimizerKind::from_config(&config).is_err());
    }
}
