//! Adam (Adaptive Moment Estimation) optimizer implementation

use crate::optimizers::Optimizer;

/// Adam optimizer.
///
/// The update rule is:
///
/// ```text
/// m_t = β1 * m_{t-1} + (1 - β1) * gradient
/// v_t = β2 * v_{t-1} + (1 - β2) * gradient²
/// m_hat = m_t / (1 - β1^t)
/// v_hat = v_t / (1 - β2^t)
/// parameter = parameter - α * m_hat / (√v_hat + ε)
/// ```
///
/// Moment vectors are sized on the first update, so one instance serves
/// exactly one parameter tensor.
///
/// # Reference
///
/// Kingma, D. P., & Ba, J. (2014). Adam: A method for stochastic optimization.
/// arXiv preprint arXiv:1412.6980.
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// First moment estimates (momentum)
    m: Vec<f32>,
    /// Second moment estimates (adaptive learning rate)
    v: Vec<f32>,
    /// Time step counter for bias correction
    t: usize,
}

impl Adam {
    /// # Examples
    ///
    /// ```
    /// use mnist_param_export::optimizers::{Adam, Optimizer};
    ///
    /// let optimizer = Adam::new(0.001, 0.9, 0.999, 1e-7);
    /// assert_eq!(optimizer.learning_rate(), 0.001);
    /// ```
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        if self.m.len() != parameters.len() {
            self.m = vec![0.0; parameters.len()];
            self.v = vec![0.0; parameters.len()];
            self.t = 0;
        }

        self.t += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t as i32);

        for ((p, &g), (m, v)) in parameters
            .iter_mut()
            .zip(gradients)
            .zip(self.m.iter_mut().zip(self.v.iter_mut()))
        {
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;

            let m_hat = *m / bias_correction1;
            let v_hat = *v / bias_correction2;
            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    fn reset(&mut self) {
        self.m.clear();
        self.v.clear();
        self.t = 0;
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adam_first_step_is_learning_rate() {
        // After bias correction the first step is lr * g / (|g| + eps) ≈ lr * sign(g)
        let mut optimizer = Adam::new(0.01, 0.9, 0.999, 1e-8);
        let mut params = vec![1.0, 2.0, -1.0];
        let grads = vec![0.5, -3.0, 0.0];

        optimizer.update(&mut params, &grads);

        assert!((params[0] - 0.99).abs() < 1e-5);
        assert!((params[1] - 2.01).abs() < 1e-5);
        assert_eq!(params[2], -1.0);
        assert_eq!(optimizer.t, 1);
    }

    #[test]
    fn test_adam_reset() {
        let mut optimizer = Adam::new(0.001, 0.9, 0.999, 1e-8);
        let mut params = vec![1.0, 2.0];
        optimizer.update(&mut params, &[0.1, 0.1]);
        optimizer.reset();

        assert!(optimizer.m.is_empty());
        assert!(optimizer.v.is_empty());
        assert_eq!(optimizer.t, 0);
    }

    #[test]
    fn test_adam_converges_on_quadratic() {
        // minimize (x - 3)^2
        let mut optimizer = Adam::new(0.1, 0.9, 0.999, 1e-8);
        let mut x = vec![0.0f32];
        for _ in 0..500 {
            let grad = vec![2.0 * (x[0] - 3.0)];
            optimizer.update(&mut x, &grad);
        }
        assert!((x[0] - 3.0).abs() < 0.1);
    }
}
