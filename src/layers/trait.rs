//! Layer trait definition for neural network layers
//!
//! The trait covers training (forward, backward, parameter updates) and the
//! parameter introspection used by the exporter and importer.

use crate::export::{ExportError, LayerParameters, ParamTensor};
use crate::optimizers::OptimizerKind;

/// Core trait for neural network layers.
///
/// Data is passed as flat `f32` buffers holding `batch_size` consecutive
/// samples. Buffers may be longer than `batch_size * size`; only the prefix
/// is read or written.
///
/// # Example
///
/// ```ignore
/// let mut output = vec![0.0f32; batch_size * layer.output_size()];
/// layer.forward(&input, &mut output, batch_size);
///
/// let mut grad_input = vec![0.0f32; batch_size * layer.input_size()];
/// layer.backward(&input, &output, &grad_output, &mut grad_input, batch_size);
/// layer.update_parameters(&optimizer);
/// ```
pub trait Layer {
    /// Short layer type name ("dense", "conv2d", "flatten").
    fn kind(&self) -> &'static str;

    /// Forward propagation, activation included.
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize);

    /// Backward propagation.
    ///
    /// `output` is the activated output of the matching forward pass and
    /// `grad_output` the loss gradient w.r.t. it. Writes the gradient w.r.t.
    /// the input into `grad_input` and accumulates parameter gradients
    /// (averaged over the batch) until `update_parameters` is called.
    fn backward(
        &self,
        input: &[f32],
        output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    );

    /// Apply accumulated gradients and clear them.
    fn update_parameters(&mut self, optimizer: &OptimizerKind);

    /// Number of input features per sample.
    fn input_size(&self) -> usize;

    /// Number of output features per sample.
    fn output_size(&self) -> usize;

    /// Total count of weights and biases.
    fn parameter_count(&self) -> usize;

    /// Weight tensor and bias vector, `None` for layers without parameters.
    fn parameters(&self) -> Option<LayerParameters<'_>> {
        None
    }

    /// Replace weights and biases with imported values.
    fn load_parameters(&mut self, weights: &ParamTensor, biases: &[f32]) -> Result<(), ExportError> {
        let _ = (weights, biases);
        Err(ExportError::NoParameters(self.kind()))
    }
}
