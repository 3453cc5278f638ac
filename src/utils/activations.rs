//! Activation functions for neural networks
//!
//! Layers apply their activation in-place on the batch output and map
//! gradients of the activated output back to the pre-activation values.

/// Activation applied by a Dense or Conv2D layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    Linear,
    Sigmoid,
    Relu,
    Tanh,
    Softmax,
}

impl Activation {
    /// Names accepted in architecture files.
    pub const NAMES: [&'static str; 5] = ["linear", "sigmoid", "relu", "tanh", "softmax"];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "linear" => Some(Self::Linear),
            "sigmoid" => Some(Self::Sigmoid),
            "relu" => Some(Self::Relu),
            "tanh" => Some(Self::Tanh),
            "softmax" => Some(Self::Softmax),
            _ => None,
        }
    }

    /// Apply the activation in-place to a `rows x cols` row-major buffer.
    pub fn apply_rows(&self, data: &mut [f32], rows: usize, cols: usize) {
        match self {
            Self::Linear => {}
            Self::Sigmoid => {
                for value in data.iter_mut() {
                    *value = sigmoid(*value);
                }
            }
            Self::Relu => relu_inplace(data),
            Self::Tanh => {
                for value in data.iter_mut() {
                    *value = value.tanh();
                }
            }
            Self::Softmax => softmax_rows(data, rows, cols),
        }
    }

    /// Gradient w.r.t. the pre-activation given the activated `output` and the
    /// gradient of the loss w.r.t. that output.
    pub fn backprop_rows(
        &self,
        output: &[f32],
        grad_output: &[f32],
        grad_pre: &mut [f32],
        cols: usize,
    ) {
        match self {
            Self::Linear => grad_pre.copy_from_slice(grad_output),
            Self::Sigmoid => {
                for ((g, &y), &go) in grad_pre.iter_mut().zip(output).zip(grad_output) {
                    *g = go * y * (1.0 - y);
                }
            }
            Self::Relu => {
                for ((g, &y), &go) in grad_pre.iter_mut().zip(output).zip(grad_output) {
                    *g = if y > 0.0 { go } else { 0.0 };
                }
            }
            Self::Tanh => {
                for ((g, &y), &go) in grad_pre.iter_mut().zip(output).zip(grad_output) {
                    *g = go * (1.0 - y * y);
                }
            }
            Self::Softmax => {
                // dz_i = y_i * (g_i - sum_k g_k y_k)
                for ((g_row, y_row), go_row) in grad_pre
                    .chunks_exact_mut(cols)
                    .zip(output.chunks_exact(cols))
                    .zip(grad_output.chunks_exact(cols))
                {
                    let dot: f32 = y_row.iter().zip(go_row).map(|(y, g)| y * g).sum();
                    for ((g, &y), &go) in g_row.iter_mut().zip(y_row).zip(go_row) {
                        *g = y * (go - dot);
                    }
                }
            }
        }
    }
}

/// Sigmoid activation: 1 / (1 + exp(-x))
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// ReLU activation function applied in-place.
///
/// Sets all negative values to 0.0, keeps positive values unchanged.
pub fn relu_inplace(data: &mut [f32]) {
    for value in data.iter_mut() {
        if *value < 0.0 {
            *value = 0.0;
        }
    }
}

/// Softmax activation function applied row-wise.
///
/// Uses the max-subtraction trick for numerical stability.
///
/// # Arguments
/// * `outputs` - Flat array containing row-major matrix data
/// * `rows` - Number of rows in the matrix
/// * `cols` - Number of columns in the matrix
pub fn softmax_rows(outputs: &mut [f32], rows: usize, cols: usize) {
    if cols == 0 {
        return;
    }
    assert_eq!(outputs.len(), rows * cols, "outputs length mismatch in softmax_rows");

    for row in outputs.chunks_exact_mut(cols).take(rows) {
        let max_value = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        let mut sum = 0.0f32;
        for value in row.iter_mut() {
            *value = (*value - max_value).exp();
            sum += *value;
        }

        let inv_sum = 1.0f32 / sum;
        for value in row.iter_mut() {
            *value *= inv_sum;
        }
    }
}
