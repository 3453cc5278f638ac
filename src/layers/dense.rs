//! Dense (fully connected) layer implementation
//!
//! Performs the transformation: output = activation(input × weights + biases)

use crate::export::{ExportError, LayerParameters, ParamTensor, TensorView};
use crate::layers::Layer;
use crate::optimizers::{Optimizer, OptimizerKind};
use crate::utils::Activation;
use rand::Rng;
use std::cell::RefCell;

/// Dense (fully connected) layer with weights and biases.
///
/// # Fields
///
/// * `weights` - Weight matrix stored in row-major format (input_size × output_size)
/// * `biases` - Bias vector (output_size)
///
/// # Example
///
/// ```
/// use mnist_param_export::layers::{DenseLayer, Layer};
/// use mnist_param_export::utils::Activation;
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let mut rng = StdRng::seed_from_u64(42);
/// let layer = DenseLayer::new(784, 600, Activation::Sigmoid, &mut rng);
/// assert_eq!(layer.parameter_count(), 784 * 600 + 600);
/// ```
pub struct DenseLayer {
    input_size: usize,
    output_size: usize,
    activation: Activation,
    weights: Vec<f32>,
    biases: Vec<f32>,
    grad_weights: RefCell<Vec<f32>>,
    grad_biases: RefCell<Vec<f32>>,
    weight_optimizer: Option<Box<dyn Optimizer>>,
    bias_optimizer: Option<Box<dyn Optimizer>>,
}

impl DenseLayer {
    /// Create a new DenseLayer with Xavier initialization.
    ///
    /// Weights are sampled uniformly from [-limit, limit] with
    /// limit = sqrt(6 / (input_size + output_size)). Biases start at zero.
    pub fn new<R: Rng>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let limit = (6.0f32 / (input_size + output_size) as f32).sqrt();
        let weights = (0..input_size * output_size)
            .map(|_| rng.gen_range(-limit..=limit))
            .collect();

        Self::with_weights(input_size, output_size, activation, weights, vec![0.0; output_size])
    }

    /// Create a layer from existing `[input_size, output_size]` weights.
    pub fn from_parameters(
        weights: &ParamTensor,
        biases: &[f32],
        activation: Activation,
    ) -> Result<Self, ExportError> {
        let shape = weights.shape();
        if shape.len() != 2 || biases.len() != shape[1] {
            return Err(ExportError::LayerShape {
                kind: "dense",
                expected: vec![shape.first().copied().unwrap_or(0), biases.len()],
                actual: shape.to_vec(),
                outputs: shape.get(1).copied().unwrap_or(0),
                biases: biases.len(),
            });
        }
        Ok(Self::with_weights(
            shape[0],
            shape[1],
            activation,
            weights.data().to_vec(),
            biases.to_vec(),
        ))
    }

    fn with_weights(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        weights: Vec<f32>,
        biases: Vec<f32>,
    ) -> Self {
        Self {
            input_size,
            output_size,
            activation,
            grad_weights: RefCell::new(vec![0.0; weights.len()]),
            grad_biases: RefCell::new(vec![0.0; biases.len()]),
            weights,
            biases,
            weight_optimizer: None,
            bias_optimizer: None,
        }
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn biases(&self) -> &[f32] {
        &self.biases
    }
}

impl Layer for DenseLayer {
    fn kind(&self) -> &'static str {
        "dense"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let (n_in, n_out) = (self.input_size, self.output_size);

        for b in 0..batch_size {
            let x = &input[b * n_in..(b + 1) * n_in];
            let y = &mut output[b * n_out..(b + 1) * n_out];
            y.copy_from_slice(&self.biases);

            for (i, &xv) in x.iter().enumerate() {
                if xv == 0.0 {
                    continue;
                }
                let w_row = &self.weights[i * n_out..(i + 1) * n_out];
                for (acc, &w) in y.iter_mut().zip(w_row) {
                    *acc += xv * w;
                }
            }
        }

        self.activation
            .apply_rows(&mut output[..batch_size * n_out], batch_size, n_out);
    }

    fn backward(
        &self,
        input: &[f32],
        output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        let (n_in, n_out) = (self.input_size, self.output_size);
        let scale = 1.0f32 / batch_size as f32;
        let len = batch_size * n_out;

        let mut grad_pre = vec![0.0f32; len];
        self.activation
            .backprop_rows(&output[..len], &grad_output[..len], &mut grad_pre, n_out);

        let mut grad_w = self.grad_weights.borrow_mut();
        let mut grad_b = self.grad_biases.borrow_mut();

        for b in 0..batch_size {
            let x = &input[b * n_in..(b + 1) * n_in];
            let g = &grad_pre[b * n_out..(b + 1) * n_out];
            let gx = &mut grad_input[b * n_in..(b + 1) * n_in];

            for (gb, &gv) in grad_b.iter_mut().zip(g) {
                *gb += gv * scale;
            }

            for i in 0..n_in {
                let w_row = &self.weights[i * n_out..(i + 1) * n_out];
                let gw_row = &mut grad_w[i * n_out..(i + 1) * n_out];
                let xv = x[i] * scale;
                let mut acc = 0.0f32;
                for ((gw, &w), &gv) in gw_row.iter_mut().zip(w_row).zip(g) {
                    *gw += xv * gv;
                    acc += gv * w;
                }
                gx[i] = acc;
            }
        }
    }

    fn update_parameters(&mut self, optimizer: &OptimizerKind) {
        let grad_w = self.grad_weights.get_mut();
        let grad_b = self.grad_biases.get_mut();

        self.weight_optimizer
            .get_or_insert_with(|| optimizer.build())
            .update(&mut self.weights, grad_w);
        self.bias_optimizer
            .get_or_insert_with(|| optimizer.build())
            .update(&mut self.biases, grad_b);

        grad_w.fill(0.0);
        grad_b.fill(0.0);
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn parameters(&self) -> Option<LayerParameters<'_>> {
        let weights = TensorView::new(vec![self.input_size, self.output_size], &self.weights).ok()?;
        Some(LayerParameters {
            weights,
            biases: &self.biases,
            geometry: None,
        })
    }

    fn load_parameters(&mut self, weights: &ParamTensor, biases: &[f32]) -> Result<(), ExportError> {
        let expected = vec![self.input_size, self.output_size];
        if weights.shape() != expected.as_slice() || biases.len() != self.output_size {
            return Err(ExportError::LayerShape {
                kind: "dense",
                expected,
                actual: weights.shape().to_vec(),
                outputs: self.output_size,
                biases: biases.len(),
            });
        }
        self.weights.copy_from_slice(weights.data());
        self.biases.copy_from_slice(biases);
        for optimizer in self
            .weight_optimizer
            .iter_mut()
            .chain(self.bias_optimizer.iter_mut())
        {
            optimizer.reset();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_dense_layer_creation() {
        let mut rng = StdRng::seed_from_u64(42);
        let layer = DenseLayer::new(10, 5, Activation::Linear, &mut rng);

        assert_eq!(layer.input_size(), 10);
        assert_eq!(layer.output_size(), 5);
        assert_eq!(layer.weights.len(), 50);
        assert_eq!(layer.biases.len(), 5);
    }

    #[test]
    fn test_xavier_initialization() {
        let mut rng = StdRng::seed_from_u64(42);
        let layer = DenseLayer::new(100, 50, Activation::Sigmoid, &mut rng);
        let limit = (6.0f32 / 150.0).sqrt();

        for &weight in &layer.weights {
            assert!(weight >= -limit && weight <= limit);
        }
        assert!(layer.biases.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_forward_linear() {
        // weights [2, 2]: w[0][0]=1, w[0][1]=2, w[1][0]=3, w[1][1]=4
        let weights = ParamTensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let layer = DenseLayer::from_parameters(&weights, &[0.5, -0.5], Activation::Linear).unwrap();

        let mut output = vec![0.0f32; 4];
        layer.forward(&[1.0, 1.0, 2.0, 0.0], &mut output, 2);
        assert_eq!(output, vec![4.5, 5.5, 2.5, 3.5]);
    }

    #[test]
    fn test_parameters_view() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = DenseLayer::new(3, 2, Activation::Relu, &mut rng);
        let params = layer.parameters().unwrap();

        assert_eq!(params.weights.shape(), &[3, 2]);
        assert_eq!(params.biases.len(), 2);
        assert!(params.geometry.is_none());
    }

    #[test]
    fn test_load_parameters_shape_check() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut layer = DenseLayer::new(3, 2, Activation::Relu, &mut rng);

        let wrong = ParamTensor::zeros(vec![2, 3]);
        assert!(layer.load_parameters(&wrong, &[0.0, 0.0]).is_err());

        let right = ParamTensor::new(vec![3, 2], vec![1.0; 6]).unwrap();
        layer.load_parameters(&right, &[0.1, 0.2]).unwrap();
        assert_eq!(layer.weights(), &[1.0; 6]);
        assert_eq!(layer.biases(), &[0.1, 0.2]);
    }

    #[test]
    fn test_sgd_step_reduces_output() {
        let weights = ParamTensor::new(vec![1, 1], vec![1.0]).unwrap();
        let mut layer = DenseLayer::from_parameters(&weights, &[0.0], Activation::Linear).unwrap();

        let input = [2.0f32];
        let mut output = [0.0f32];
        layer.forward(&input, &mut output, 1);
        let mut grad_input = [0.0f32];
        layer.backward(&input, &output, &[1.0], &mut grad_input, 1);
        assert_eq!(grad_input[0], 1.0);

        layer.update_parameters(&OptimizerKind::Sgd { learning_rate: 0.1 });
        // w -= 0.1 * 2, b -= 0.1 * 1
        assert!((layer.weights()[0] - 0.8).abs() < 1e-6);
        assert!((layer.biases()[0] + 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_load_parameters_resets_adam_state() {
        let start = ParamTensor::new(vec![1, 1], vec![1.0]).unwrap();
        let mut layer = DenseLayer::from_parameters(&start, &[0.0], Activation::Linear).unwrap();
        let adam = OptimizerKind::Adam {
            learning_rate: 0.1,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        };

        let step = |layer: &mut DenseLayer, grad: f32| {
            let input = [1.0f32];
            let mut output = [0.0f32];
            let mut grad_input = [0.0f32];
            layer.forward(&input, &mut output, 1);
            layer.backward(&input, &output, &[grad], &mut grad_input, 1);
            layer.update_parameters(&adam);
        };

        for _ in 0..20 {
            step(&mut layer, 1.0);
        }
        layer.load_parameters(&start, &[0.0]).unwrap();

        // Fresh moments: the first step moves by lr against the gradient.
        // Stale momentum from the positive gradients would keep lowering w.
        step(&mut layer, -1.0);
        assert!((layer.weights()[0] - 1.1).abs() < 1e-4);
    }
}
