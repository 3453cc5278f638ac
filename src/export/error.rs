use thiserror::Error;

/// Errors raised while writing, parsing or importing a parameter file.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tensor shape {shape:?} does not hold {len} values")]
    ShapeMismatch { shape: Vec<usize>, len: usize },

    #[error("layer {layer}: weight rank {rank} is neither 2 (dense) nor 4 (conv)")]
    UnsupportedRank { layer: usize, rank: usize },

    #[error("layer {layer}: convolution layer {conv_layer} exposes no output geometry")]
    MissingGeometry { layer: usize, conv_layer: usize },

    #[error(
        "layer {layer}: dense input size {actual} does not match flattened output \
         {expected} of convolution layer {conv_layer}"
    )]
    FlattenMismatch {
        layer: usize,
        conv_layer: usize,
        expected: usize,
        actual: usize,
    },

    #[error("layer {layer}: {biases} biases for {outputs} outputs")]
    BiasMismatch {
        layer: usize,
        biases: usize,
        outputs: usize,
    },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("model has {expected} parameterized layers but the file holds {found} blocks")]
    BlockCount { expected: usize, found: usize },

    #[error("block {block}: {message}")]
    BlockShape { block: usize, message: String },

    #[error("{kind} layer expects weights {expected:?} and {outputs} biases, got {actual:?} and {biases}")]
    LayerShape {
        kind: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
        outputs: usize,
        biases: usize,
    },

    #[error("{0} layer has no trainable parameters")]
    NoParameters(&'static str),
}
