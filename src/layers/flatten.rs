//! Flatten layer
//!
//! Channels-last convolution output is already a flat buffer per sample, so
//! flattening only marks the boundary between the convolutional and the
//! fully connected part of a model.

use crate::layers::Layer;
use crate::optimizers::OptimizerKind;

/// Pass-through layer without parameters.
pub struct FlattenLayer {
    size: usize,
}

impl FlattenLayer {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl Layer for FlattenLayer {
    fn kind(&self) -> &'static str {
        "flatten"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let len = batch_size * self.size;
        output[..len].copy_from_slice(&input[..len]);
    }

    fn backward(
        &self,
        _input: &[f32],
        _output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        let len = batch_size * self.size;
        grad_input[..len].copy_from_slice(&grad_output[..len]);
    }

    fn update_parameters(&mut self, _optimizer: &OptimizerKind) {}

    fn input_size(&self) -> usize {
        self.size
    }

    fn output_size(&self) -> usize {
        self.size
    }

    fn parameter_count(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{ExportError, ParamTensor};

    #[test]
    fn test_flatten_is_identity() {
        let layer = FlattenLayer::new(3);
        let input = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut output = [0.0f32; 6];
        layer.forward(&input, &mut output, 2);
        assert_eq!(output, input);

        let mut grad_input = [0.0f32; 6];
        layer.backward(&input, &output, &[1.0; 6], &mut grad_input, 2);
        assert_eq!(grad_input, [1.0; 6]);
    }

    #[test]
    fn test_flatten_has_no_parameters() {
        let mut layer = FlattenLayer::new(4);
        assert!(layer.parameters().is_none());
        let result = layer.load_parameters(&ParamTensor::zeros(vec![4, 4]), &[0.0; 4]);
        assert!(matches!(result, Err(ExportError::NoParameters("flatten"))));
    }
}
