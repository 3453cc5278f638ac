//! Flat-text parameter reader and model importer
//!
//! The file carries no layer-type markers, so shapes come from the model the
//! blocks are loaded into.

use crate::export::error::ExportError;
use crate::export::tensor::{ConvGeometry, FlattenLayout, FlattenOrder, ParamTensor};
use crate::model::Sequential;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One `rows * biases ***` block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterBlock {
    pub rows: Vec<Vec<f32>>,
    pub biases: Vec<f32>,
}

impl ParameterBlock {
    /// Number of values per row, `None` if rows are ragged or absent.
    pub fn row_width(&self) -> Option<usize> {
        let first = self.rows.first()?.len();
        self.rows
            .iter()
            .all(|row| row.len() == first)
            .then_some(first)
    }

    /// Rebuild a `[kernel_h, kernel_w, in_channels, filters]` kernel.
    pub fn conv_tensor(
        &self,
        block: usize,
        kernel_h: usize,
        kernel_w: usize,
        in_channels: usize,
    ) -> Result<ParamTensor, ExportError> {
        let filters = self.rows.len();
        self.check_rows(block, filters, kernel_h * kernel_w * in_channels)?;
        self.check_biases(block, filters)?;

        let mut tensor = ParamTensor::zeros(vec![kernel_h, kernel_w, in_channels, filters]);
        for (f, row) in self.rows.iter().enumerate() {
            let mut values = row.iter();
            for c in 0..in_channels {
                for a in 0..kernel_h {
                    for b in 0..kernel_w {
                        if let Some(&v) = values.next() {
                            tensor.set(&[a, b, c, f], v);
                        }
                    }
                }
            }
        }
        Ok(tensor)
    }

    /// Rebuild an `[inputs, outputs]` dense matrix.
    ///
    /// `layout` is the geometry of a preceding convolution, whose re-ordering
    /// is undone using `order`.
    pub fn dense_tensor(
        &self,
        block: usize,
        inputs: usize,
        layout: Option<FlattenLayout>,
        order: FlattenOrder,
    ) -> Result<ParamTensor, ExportError> {
        let outputs = self.rows.len();
        self.check_rows(block, outputs, inputs)?;
        self.check_biases(block, outputs)?;
        if let Some(layout) = layout {
            if layout.size() != inputs {
                return Err(ExportError::BlockShape {
                    block,
                    message: format!(
                        "convolution output {} does not match dense input {}",
                        layout.size(),
                        inputs
                    ),
                });
            }
        }

        let mut data = vec![0.0f32; inputs * outputs];
        for (j, row) in self.rows.iter().enumerate() {
            for (p, &v) in row.iter().enumerate() {
                let i = match layout {
                    Some(layout) => layout.source_index(p, order),
                    None => p,
                };
                data[i * outputs + j] = v;
            }
        }
        ParamTensor::new(vec![inputs, outputs], data)
    }

    fn check_rows(&self, block: usize, rows: usize, width: usize) -> Result<(), ExportError> {
        if rows == 0 {
            return Err(ExportError::BlockShape {
                block,
                message: "block has no weight rows".to_string(),
            });
        }
        if let Some((r, row)) = self.rows.iter().enumerate().find(|(_, row)| row.len() != width) {
            return Err(ExportError::BlockShape {
                block,
                message: format!("row {} has {} values, expected {}", r, row.len(), width),
            });
        }
        Ok(())
    }

    fn check_biases(&self, block: usize, expected: usize) -> Result<(), ExportError> {
        if self.biases.len() != expected {
            return Err(ExportError::BlockShape {
                block,
                message: format!("{} biases, expected {}", self.biases.len(), expected),
            });
        }
        Ok(())
    }
}

enum Section {
    Weights,
    Biases,
}

/// Parse every block from `reader`.
pub fn parse_parameters<R: BufRead>(reader: R) -> Result<Vec<ParameterBlock>, ExportError> {
    let mut blocks = Vec::new();
    let mut current = ParameterBlock::default();
    let mut section = Section::Weights;
    let mut last_line = 0usize;

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        last_line = line_no;
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match (line, &section) {
            ("*", Section::Weights) => section = Section::Biases,
            ("***", Section::Biases) => {
                blocks.push(std::mem::take(&mut current));
                section = Section::Weights;
            }
            ("*", Section::Biases) | ("***", Section::Weights) => {
                return Err(ExportError::Parse {
                    line: line_no,
                    message: format!("unexpected delimiter '{}'", line),
                });
            }
            (_, Section::Weights) => {
                let row = line
                    .split(',')
                    .map(|v| parse_value(v, line_no))
                    .collect::<Result<Vec<_>, _>>()?;
                current.rows.push(row);
            }
            (_, Section::Biases) => current.biases.push(parse_value(line, line_no)?),
        }
    }

    if !current.rows.is_empty() || matches!(section, Section::Biases) {
        return Err(ExportError::Parse {
            line: last_line,
            message: "file ends inside a block".to_string(),
        });
    }

    Ok(blocks)
}

/// Parse the parameter file at `path`.
pub fn read_parameters<P: AsRef<Path>>(path: P) -> Result<Vec<ParameterBlock>, ExportError> {
    let file = File::open(path)?;
    parse_parameters(BufReader::new(file))
}

fn parse_value(text: &str, line: usize) -> Result<f32, ExportError> {
    text.trim().parse::<f32>().map_err(|e| ExportError::Parse {
        line,
        message: format!("invalid value '{}': {}", text.trim(), e),
    })
}

/// Load `blocks` into the parameterized layers of `model`, in order.
///
/// The convolution state follows the writer: a dense layer directly after a
/// convolution (ignoring layers without weights) has its rows re-ordered.
pub fn import_parameters(
    model: &mut Sequential,
    blocks: &[ParameterBlock],
    order: FlattenOrder,
) -> Result<(), ExportError> {
    let expected = model
        .layers()
        .iter()
        .filter(|layer| layer.parameters().is_some())
        .count();
    if expected != blocks.len() {
        return Err(ExportError::BlockCount {
            expected,
            found: blocks.len(),
        });
    }

    let mut previous_conv: Option<(usize, Option<ConvGeometry>)> = None;
    let mut next_block = blocks.iter().enumerate();

    for (position, layer) in model.layers_mut().iter_mut().enumerate() {
        let (weights, biases) = {
            let Some(params) = layer.parameters() else {
                continue;
            };
            let Some((index, block)) = next_block.next() else {
                break;
            };
            let shape = params.weights.shape().to_vec();

            match shape.len() {
                4 => {
                    previous_conv = Some((position, params.geometry));
                    let tensor = block.conv_tensor(index, shape[0], shape[1], shape[2])?;
                    (tensor, block.biases.clone())
                }
                2 => {
                    let layout = match previous_conv.take() {
                        None => None,
                        Some((_, Some(geometry))) => Some(geometry.flatten_layout()),
                        Some((conv_layer, None)) => {
                            return Err(ExportError::MissingGeometry {
                                layer: position,
                                conv_layer,
                            });
                        }
                    };
                    let tensor = block.dense_tensor(index, shape[0], layout, order)?;
                    (tensor, block.biases.clone())
                }
                rank => {
                    return Err(ExportError::UnsupportedRank { layer: position, rank });
                }
            }
        };
        layer.load_parameters(&weights, &biases)?;
    }

    tracing::info!(blocks = blocks.len(), "imported model parameters");
    Ok(())
}

/// Read `path` and load it into `model`.
pub fn import_model<P: AsRef<Path>>(
    model: &mut Sequential,
    path: P,
    order: FlattenOrder,
) -> Result<(), ExportError> {
    let blocks = read_parameters(path)?;
    import_parameters(model, &blocks, order)
}
