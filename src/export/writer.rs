//! Flat-text parameter writer
//!
//! Each layer with trainable weights becomes one block:
//!
//! ```text
//! w,w,w,...      one line per filter (conv) or output node (dense)
//! *
//! b              one bias per line
//! ***
//! ```
//!
//! Layers without weights (flatten) are skipped and leave the convolution
//! state untouched, so a `conv -> flatten -> dense` stack re-orders the dense
//! inputs from the convolution's geometry.

use crate::export::error::ExportError;
use crate::export::tensor::{ConvGeometry, FlattenOrder, LayerParameters};
use crate::model::Sequential;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes layer parameters in the flat-text block format.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterExporter {
    order: FlattenOrder,
}

impl ParameterExporter {
    pub fn new(order: FlattenOrder) -> Self {
        Self { order }
    }

    /// Write one block per parameterized entry of `layers`.
    ///
    /// `None` entries stand for layers without trainable weights; they still
    /// count towards the layer index used in error messages.
    ///
    /// Returns the number of blocks written.
    pub fn write_layers<'a, W, I>(&self, writer: &mut W, layers: I) -> Result<usize, ExportError>
    where
        W: Write,
        I: IntoIterator<Item = Option<LayerParameters<'a>>>,
    {
        let mut previous_conv: Option<(usize, Option<ConvGeometry>)> = None;
        let mut blocks = 0usize;

        for (index, params) in layers.into_iter().enumerate() {
            let Some(params) = params else {
                continue;
            };

            match params.weights.rank() {
                4 => {
                    write_conv_block(writer, index, &params)?;
                    previous_conv = Some((index, params.geometry));
                }
                2 => {
                    self.write_dense_block(writer, index, &params, previous_conv)?;
                    previous_conv = None;
                }
                rank => return Err(ExportError::UnsupportedRank { layer: index, rank }),
            }
            blocks += 1;
        }

        Ok(blocks)
    }

    /// Write every layer of `model`.
    pub fn write_model<W: Write>(
        &self,
        writer: &mut W,
        model: &Sequential,
    ) -> Result<usize, ExportError> {
        self.write_layers(writer, model.layers().iter().map(|layer| layer.parameters()))
    }

    /// Create (or overwrite) `path` and write `model` into it.
    pub fn export_to_file<P: AsRef<Path>>(
        &self,
        model: &Sequential,
        path: P,
    ) -> Result<usize, ExportError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        let blocks = self.write_model(&mut writer, model)?;
        writer.flush()?;

        tracing::info!(path = %path.display(), blocks, "exported model parameters");
        Ok(blocks)
    }

    fn write_dense_block<W: Write>(
        &self,
        writer: &mut W,
        index: usize,
        params: &LayerParameters<'_>,
        previous_conv: Option<(usize, Option<ConvGeometry>)>,
    ) -> Result<(), ExportError> {
        let shape = params.weights.shape();
        let (inputs, outputs) = (shape[0], shape[1]);
        check_biases(index, params.biases, outputs)?;
        let weights = params.weights.data();

        match previous_conv {
            None => {
                tracing::debug!(layer = index, inputs, outputs, "fully connected layer");
                for j in 0..outputs {
                    write_row(writer, (0..inputs).map(|i| weights[i * outputs + j]))?;
                }
            }
            Some((conv_layer, geometry)) => {
                let geometry =
                    geometry.ok_or(ExportError::MissingGeometry { layer: index, conv_layer })?;
                let layout = geometry.flatten_layout();
                if layout.size() != inputs {
                    return Err(ExportError::FlattenMismatch {
                        layer: index,
                        conv_layer,
                        expected: layout.size(),
                        actual: inputs,
                    });
                }

                tracing::debug!(
                    layer = index,
                    conv_layer,
                    filters = layout.filters,
                    height = layout.height,
                    width = layout.width,
                    order = ?self.order,
                    "fully connected layer following convolution"
                );
                for j in 0..outputs {
                    write_row(
                        writer,
                        (0..inputs)
                            .map(|p| weights[layout.source_index(p, self.order) * outputs + j]),
                    )?;
                }
            }
        }

        write_biases(writer, params.biases)
    }
}

/// Export `model` to `path` using the default (channels-first) order.
pub fn export_model<P: AsRef<Path>>(model: &Sequential, path: P) -> Result<usize, ExportError> {
    ParameterExporter::default().export_to_file(model, path)
}

fn write_conv_block<W: Write>(
    writer: &mut W,
    index: usize,
    params: &LayerParameters<'_>,
) -> Result<(), ExportError> {
    let shape = params.weights.shape();
    let (kernel_h, kernel_w, in_channels, filters) = (shape[0], shape[1], shape[2], shape[3]);
    check_biases(index, params.biases, filters)?;
    let weights = params.weights.data();

    tracing::debug!(
        layer = index,
        filters,
        in_channels,
        kernel_h,
        kernel_w,
        "convolutional layer"
    );

    for f in 0..filters {
        let row = (0..in_channels).flat_map(move |c| {
            (0..kernel_h).flat_map(move |a| {
                (0..kernel_w).map(move |b| ((a * kernel_w + b) * in_channels + c) * filters + f)
            })
        });
        write_row(writer, row.map(|i| weights[i]))?;
    }

    write_biases(writer, params.biases)
}

fn check_biases(layer: usize, biases: &[f32], outputs: usize) -> Result<(), ExportError> {
    if biases.len() != outputs {
        return Err(ExportError::BiasMismatch {
            layer,
            biases: biases.len(),
            outputs,
        });
    }
    Ok(())
}

fn write_row<W: Write, I: Iterator<Item = f32>>(writer: &mut W, values: I) -> std::io::Result<()> {
    for (i, value) in values.enumerate() {
        if i > 0 {
            writer.write_all(b",")?;
        }
        write!(writer, "{}", value)?;
    }
    writer.write_all(b"\n")
}

fn write_biases<W: Write>(writer: &mut W, biases: &[f32]) -> Result<(), ExportError> {
    writer.write_all(b"*\n")?;
    for bias in biases {
        writeln!(writer, "{}", bias)?;
    }
    writer.write_all(b"***\n")?;
    Ok(())
}
