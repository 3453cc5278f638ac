//! Flat-text parameter files
//!
//! The writer emits one block per layer with trainable weights; the reader
//! parses blocks back and loads them into a model of the same architecture.
//! The format has no header or layer-type marker: a consumer must already
//! know the architecture to interpret it.

pub mod error;
pub mod reader;
pub mod tensor;
pub mod writer;

pub use error::ExportError;
pub use reader::{import_model, import_parameters, parse_parameters, read_parameters, ParameterBlock};
pub use tensor::{ConvGeometry, FlattenLayout, FlattenOrder, LayerParameters, ParamTensor, TensorView};
pub use writer::{export_model, ParameterExporter};
