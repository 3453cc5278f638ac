//! 2D Convolutional layer implementation
//!
//! Activations are channels-last: a sample is `height × width × channels`
//! with the channel index fastest. Kernels are stored
//! `[kernel, kernel, in_channels, out_channels]`.

use crate::export::{ConvGeometry, ExportError, LayerParameters, ParamTensor, TensorView};
use crate::layers::Layer;
use crate::optimizers::{Optimizer, OptimizerKind};
use crate::utils::Activation;
use rand::Rng;
use std::cell::RefCell;

/// 2D Convolutional layer with learnable filters.
///
/// Supports symmetric zero-padding and a configurable stride; kernels are
/// square.
///
/// # Example
///
/// ```
/// use mnist_param_export::layers::{Conv2DLayer, Layer};
/// use mnist_param_export::utils::Activation;
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let mut rng = StdRng::seed_from_u64(42);
/// // 1 input channel, 8 filters, 3x3 kernel, no padding, stride 1, 28x28 input
/// let layer = Conv2DLayer::new(1, 8, 3, 0, 1, 28, 28, Activation::Relu, &mut rng);
/// assert_eq!(layer.output_height(), 26);
/// assert_eq!(layer.output_size(), 26 * 26 * 8);
/// ```
pub struct Conv2DLayer {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    padding: isize,
    stride: usize,
    input_height: usize,
    input_width: usize,
    activation: Activation,
    weights: Vec<f32>, // [kernel_size * kernel_size * in_channels * out_channels]
    biases: Vec<f32>,  // [out_channels]
    grad_weights: RefCell<Vec<f32>>,
    grad_biases: RefCell<Vec<f32>>,
    weight_optimizer: Option<Box<dyn Optimizer>>,
    bias_optimizer: Option<Box<dyn Optimizer>>,
}

impl Conv2DLayer {
    /// Create a new Conv2DLayer with Xavier initialization.
    ///
    /// fan_in = in_channels × kernel_size², fan_out = out_channels × kernel_size²
    #[allow(clippy::too_many_arguments)]
    pub fn new<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: isize,
        stride: usize,
        input_height: usize,
        input_width: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let fan_in = (in_channels * kernel_size * kernel_size) as f32;
        let fan_out = (out_channels * kernel_size * kernel_size) as f32;
        let limit = (6.0f32 / (fan_in + fan_out)).sqrt();

        let weight_count = kernel_size * kernel_size * in_channels * out_channels;
        let weights = (0..weight_count)
            .map(|_| rng.gen_range(-limit..=limit))
            .collect();

        Self {
            in_channels,
            out_channels,
            kernel_size,
            padding,
            stride,
            input_height,
            input_width,
            activation,
            weights,
            biases: vec![0.0f32; out_channels],
            grad_weights: RefCell::new(vec![0.0f32; weight_count]),
            grad_biases: RefCell::new(vec![0.0f32; out_channels]),
            weight_optimizer: None,
            bias_optimizer: None,
        }
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn padding(&self) -> isize {
        self.padding
    }

    pub fn stride(&self) -> usize {
        self.stride
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

    pub fn geometry(&self) -> ConvGeometry {
        ConvGeometry {
            filters: self.out_channels,
            kernel_size: self.kernel_size,
            stride: self.stride,
            padding: self.padding,
            input_height: self.input_height,
            input_width: self.input_width,
        }
    }

    pub fn output_height(&self) -> usize {
        self.geometry().output_height()
    }

    pub fn output_width(&self) -> usize {
        self.geometry().output_width()
    }

    fn weight_shape(&self) -> Vec<usize> {
        vec![
            self.kernel_size,
            self.kernel_size,
            self.in_channels,
            self.out_channels,
        ]
    }

    /// Input row for kernel tap `k` at output position `o`, if inside the image.
    fn input_coord(&self, o: usize, k: usize, limit: usize) -> Option<usize> {
        let i = (o * self.stride + k) as isize - self.padding;
        (i >= 0 && (i as usize) < limit).then_some(i as usize)
    }
}

impl Layer for Conv2DLayer {
    fn kind(&self) -> &'static str {
        "conv2d"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let (out_h, out_w) = (self.output_height(), self.output_width());
        let (in_len, out_len) = (self.input_size(), self.output_size());
        let (k, c_in, c_out) = (self.kernel_size, self.in_channels, self.out_channels);

        for b in 0..batch_size {
            let x = &input[b * in_len..(b + 1) * in_len];
            let y = &mut output[b * out_len..(b + 1) * out_len];

            for oy in 0..out_h {
                for ox in 0..out_w {
                    let out_base = (oy * out_w + ox) * c_out;
                    let acc = &mut y[out_base..out_base + c_out];
                    acc.copy_from_slice(&self.biases);

                    for ky in 0..k {
                        let Some(iy) = self.input_coord(oy, ky, self.input_height) else {
                            continue;
                        };
                        for kx in 0..k {
                            let Some(ix) = self.input_coord(ox, kx, self.input_width) else {
                                continue;
                            };
                            let in_base = (iy * self.input_width + ix) * c_in;
                            let w_base = (ky * k + kx) * c_in * c_out;

                            for c in 0..c_in {
                                let xv = x[in_base + c];
                                if xv == 0.0 {
                                    continue;
                                }
                                let w_row = &self.weights[w_base + c * c_out..w_base + (c + 1) * c_out];
                                for (a, &w) in acc.iter_mut().zip(w_row) {
                                    *a += xv * w;
                                }
                            }
                        }
                    }
                }
            }
        }

        self.activation
            .apply_rows(&mut output[..batch_size * out_len], batch_size, out_len);
    }

    fn backward(
        &self,
        input: &[f32],
        output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        let (out_h, out_w) = (self.output_height(), self.output_width());
        let (in_len, out_len) = (self.input_size(), self.output_size());
        let (k, c_in, c_out) = (self.kernel_size, self.in_channels, self.out_channels);
        let scale = 1.0f32 / batch_size as f32;
        let len = batch_size * out_len;

        let mut grad_pre = vec![0.0f32; len];
        self.activation
            .backprop_rows(&output[..len], &grad_output[..len], &mut grad_pre, out_len);

        let mut grad_w = self.grad_weights.borrow_mut();
        let mut grad_b = self.grad_biases.borrow_mut();
        grad_input[..batch_size * in_len].fill(0.0);

        for b in 0..batch_size {
            let x = &input[b * in_len..(b + 1) * in_len];
            let gx = &mut grad_input[b * in_len..(b + 1) * in_len];

            for oy in 0..out_h {
                for ox in 0..out_w {
                    let g_base = b * out_len + (oy * out_w + ox) * c_out;
                    let g = &grad_pre[g_base..g_base + c_out];

                    for (gb, &gv) in grad_b.iter_mut().zip(g) {
                        *gb += gv * scale;
                    }

                    for ky in 0..k {
                        let Some(iy) = self.input_coord(oy, ky, self.input_height) else {
                            continue;
                        };
                        for kx in 0..k {
                            let Some(ix) = self.input_coord(ox, kx, self.input_width) else {
                                continue;
                            };
                            let in_base = (iy * self.input_width + ix) * c_in;
                            let w_base = (ky * k + kx) * c_in * c_out;

                            for c in 0..c_in {
                                let start = w_base + c * c_out;
                                let w_row = &self.weights[start..start + c_out];
                                let gw_row = &mut grad_w[start..start + c_out];
                                let xv = x[in_base + c] * scale;
                                let mut acc = 0.0f32;
                                for ((gw, &w), &gv) in gw_row.iter_mut().zip(w_row).zip(g) {
                                    *gw += xv * gv;
                                    acc += gv * w;
                                }
                                gx[in_base + c] += acc;
                            }
                        }
                    }
                }
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
        self.input_height * self.input_width * self.in_channels
    }

    fn output_size(&self) -> usize {
        self.output_height() * self.output_width() * self.out_channels
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn parameters(&self) -> Option<LayerParameters<'_>> {
        let weights = TensorView::new(self.weight_shape(), &self.weights).ok()?;
        Some(LayerParameters {
            weights,
            biases: &self.biases,
            geometry: Some(self.geometry()),
        })
    }

    fn load_parameters(&mut self, weights: &ParamTensor, biases: &[f32]) -> Result<(), ExportError> {
        let expected = self.weight_shape();
        if weights.shape() != expected.as_slice() || biases.len() != self.out_channels {
            return Err(ExportError::LayerShape {
                kind: "conv2d",
                expected,
                actual: weights.shape().to_vec(),
                outputs: self.out_channels,
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
