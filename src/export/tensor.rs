//! Parameter tensors in the model's memory layout
//!
//! Convolution kernels are stored `[kernel_h, kernel_w, in_channels, out_channels]`
//! and dense weights `[inputs, outputs]`, both row-major. Activations between
//! layers are channels-last, so a dense layer fed by a convolution sees the flat
//! input index `y * W * N + x * N + f`.

use crate::export::error::ExportError;
use serde::Deserialize;

/// Borrowed row-major view of a parameter tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorView<'a> {
    shape: Vec<usize>,
    data: &'a [f32],
}

impl<'a> TensorView<'a> {
    /// Wrap `data` with the given shape, checking the element count.
    pub fn new(shape: Vec<usize>, data: &'a [f32]) -> Result<Self, ExportError> {
        check_len(&shape, data.len())?;
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn data(&self) -> &'a [f32] {
        self.data
    }
}

/// Owned row-major parameter tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl ParamTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, ExportError> {
        check_len(&shape, data.len())?;
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: self.shape.clone(),
            data: &self.data,
        }
    }

    /// Store `value` at a multi-dimensional index.
    ///
    /// # Panics
    ///
    /// Panics if `index` has the wrong rank or is out of bounds.
    pub fn set(&mut self, index: &[usize], value: f32) {
        let i = flat_index(&self.shape, index);
        self.data[i] = value;
    }
}

fn check_len(shape: &[usize], len: usize) -> Result<(), ExportError> {
    let expected: usize = shape.iter().product();
    if expected != len {
        return Err(ExportError::ShapeMismatch {
            shape: shape.to_vec(),
            len,
        });
    }
    Ok(())
}

fn flat_index(shape: &[usize], index: &[usize]) -> usize {
    assert_eq!(shape.len(), index.len(), "index rank does not match tensor rank");
    let mut flat = 0usize;
    for (&dim, &i) in shape.iter().zip(index) {
        assert!(i < dim, "index {} out of bounds for dimension {}", i, dim);
        flat = flat * dim + i;
    }
    flat
}

/// Geometry of a convolution layer, needed to reinterpret the flat input of a
/// following dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub filters: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: isize,
    pub input_height: usize,
    pub input_width: usize,
}

impl ConvGeometry {
    /// Calculated as: (input_height + 2*padding - kernel_size) / stride + 1
    pub fn output_height(&self) -> usize {
        Self::output_dim(self.input_height, self.kernel_size, self.stride, self.padding)
    }

    /// Calculated as: (input_width + 2*padding - kernel_size) / stride + 1
    pub fn output_width(&self) -> usize {
        Self::output_dim(self.input_width, self.kernel_size, self.stride, self.padding)
    }

    pub fn flatten_layout(&self) -> FlattenLayout {
        FlattenLayout {
            filters: self.filters,
            height: self.output_height(),
            width: self.output_width(),
        }
    }

    fn output_dim(input: usize, kernel: usize, stride: usize, padding: isize) -> usize {
        let span = input as isize + 2 * padding - kernel as isize;
        if span < 0 || stride == 0 {
            return 0;
        }
        (span / stride as isize + 1) as usize
    }
}

/// Order in which a dense layer's inputs are written when it follows a
/// convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlattenOrder {
    /// Filter outermost, then y, then x.
    #[default]
    ChannelsFirst,
    /// y, then x, filter innermost (the model's own order).
    ChannelsLast,
}

/// Flattened conv output seen by a dense layer: `filters x height x width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlattenLayout {
    pub filters: usize,
    pub height: usize,
    pub width: usize,
}

impl FlattenLayout {
    /// Number of flattened inputs.
    pub fn size(&self) -> usize {
        self.filters * self.height * self.width
    }

    /// Row of the dense weight matrix written at `position` of an exported row.
    pub fn source_index(&self, position: usize, order: FlattenOrder) -> usize {
        match order {
            FlattenOrder::ChannelsLast => position,
            FlattenOrder::ChannelsFirst => {
                let spatial = self.height * self.width;
                let f = position / spatial;
                let y = (position % spatial) / self.width;
                let x = position % self.width;
                y * self.width * self.filters + x * self.filters + f
            }
        }
    }
}

/// Trainable parameters exposed by a layer for export.
#[derive(Debug, Clone)]
pub struct LayerParameters<'a> {
    pub weights: TensorView<'a>,
    pub biases: &'a [f32],
    pub geometry: Option<ConvGeometry>,
}
