//! Stochastic Gradient Descent (SGD) optimizer implementation
//!
//! Performs the basic update: `parameter = parameter - learning_rate * gradient`

use crate::optimizers::Optimizer;

/// Vanilla SGD, no momentum.
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );
        for (p, g) in parameters.iter_mut().zip(gradients) {
            *p -= self.learning_rate * g;
        }
    }

    fn reset(&mut self) {}

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}
