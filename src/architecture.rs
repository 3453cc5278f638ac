//! Architecture configuration structures
//!
//! This module provides configuration structures for defining neural network architectures
//! via JSON configuration files, and builds a [`Sequential`] model from them.

use crate::layers::{Conv2DLayer, DenseLayer, FlattenLayer, Layer};
use crate::model::Sequential;
use crate::utils::Activation;
use rand::Rng;
use serde::Deserialize;
use std::error::Error;
use std::fs;

/// Configuration for a single layer in the neural network.
///
/// Defines the layer type and its parameters. Different layer types require different fields:
///
/// - **Dense**: Requires `input_size` and `output_size`
/// - **Conv2D**: Requires `in_channels`, `out_channels`, `kernel_size`, `input_height`, `input_width`,
///   and optional `padding` (default 0), `stride` (default 1)
/// - **Flatten**: Requires `size`
///
/// Dense and Conv2D layers take an optional `activation` (default "linear").
///
/// # Examples
///
/// ```json
/// {
///   "layer_type": "dense",
///   "input_size": 784,
///   "output_size": 600,
///   "activation": "sigmoid"
/// }
/// ```
///
/// ```json
/// {
///   "layer_type": "conv2d",
///   "in_channels": 1,
///   "out_channels": 8,
///   "kernel_size": 3,
///   "padding": 0,
///   "stride": 1,
///   "input_height": 28,
///   "input_width": 28,
///   "activation": "relu"
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayerConfig {
    /// Type of layer: "dense", "conv2d" or "flatten"
    pub layer_type: String,

    // Dense layer parameters
    /// Input size for Dense layer
    pub input_size: Option<usize>,
    /// Output size for Dense layer
    pub output_size: Option<usize>,

    // Conv2D layer parameters
    /// Number of input channels for Conv2D layer
    pub in_channels: Option<usize>,
    /// Number of output channels (filters) for Conv2D layer
    pub out_channels: Option<usize>,
    /// Kernel size for Conv2D layer (assumes square kernel)
    pub kernel_size: Option<usize>,
    /// Zero-padding for Conv2D layer (default: 0)
    pub padding: Option<isize>,
    /// Stride for Conv2D layer (default: 1)
    pub stride: Option<usize>,
    /// Input height for Conv2D layer
    pub input_height: Option<usize>,
    /// Input width for Conv2D layer
    pub input_width: Option<usize>,

    /// Size (number of features) for Flatten layer
    pub size: Option<usize>,

    /// Activation function name, see [`Activation::NAMES`]
    pub activation: Option<String>,
}

impl LayerConfig {
    pub fn dense(input_size: usize, output_size: usize, activation: &str) -> Self {
        Self {
            layer_type: "dense".to_string(),
            input_size: Some(input_size),
            output_size: Some(output_size),
            activation: Some(activation.to_string()),
            ..Self::default()
        }
    }

    pub fn flatten(size: usize) -> Self {
        Self {
            layer_type: "flatten".to_string(),
            size: Some(size),
            ..Self::default()
        }
    }

    fn activation(&self, index: usize) -> Result<Activation, Box<dyn Error>> {
        match &self.activation {
            None => Ok(Activation::Linear),
            Some(name) => Activation::from_name(name).ok_or_else(|| {
                invalid(format!(
                    "Layer {}: Invalid activation '{}'. Must be one of: {}",
                    index,
                    name,
                    Activation::NAMES.join(", ")
                ))
            }),
        }
    }
}

/// Configuration for the entire neural network architecture.
///
/// Layers are applied in the order they appear in the configuration.
///
/// # Example
///
/// ```json
/// {
///   "layers": [
///     { "layer_type": "conv2d", "in_channels": 1, "out_channels": 4, "kernel_size": 3,
///       "input_height": 28, "input_width": 28, "activation": "relu" },
///     { "layer_type": "flatten", "size": 2704 },
///     { "layer_type": "dense", "input_size": 2704, "output_size": 10, "activation": "softmax" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ArchitectureConfig {
    /// Sequence of layer configurations defining the network structure
    pub layers: Vec<LayerConfig>,
}

impl ArchitectureConfig {
    /// Fully connected 784-600-300-140-10 network with sigmoid activations.
    pub fn mnist_fully_connected() -> Self {
        Self {
            layers: vec![
                LayerConfig::dense(784, 600, "sigmoid"),
                LayerConfig::dense(600, 300, "sigmoid"),
                LayerConfig::dense(300, 140, "sigmoid"),
                LayerConfig::dense(140, 10, "sigmoid"),
            ],
        }
    }
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self::mnist_fully_connected()
    }
}

/// Loads an architecture configuration from a JSON file.
///
/// Reads the file at `path` and deserializes its JSON contents into an `ArchitectureConfig`,
/// then validates layer fields and connections.
///
/// # Examples
///
/// ```no_run
/// use mnist_param_export::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/fc_mnist.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: &str) -> Result<ArchitectureConfig, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

fn required(value: Option<usize>, index: usize, kind: &str, field: &str) -> Result<usize, Box<dyn Error>> {
    value.ok_or_else(|| invalid(format!("Layer {}: {} layer requires '{}'", index, kind, field)))
}

fn positive(value: Option<usize>, index: usize, kind: &str, field: &str) -> Result<usize, Box<dyn Error>> {
    let value = required(value, index, kind, field)?;
    if value == 0 {
        return Err(invalid(format!("Layer {}: {} must be greater than 0", index, field)));
    }
    Ok(value)
}

/// Input and output size of a validated layer configuration.
fn layer_sizes(layer: &LayerConfig, index: usize) -> Result<(usize, usize), Box<dyn Error>> {
    match layer.layer_type.to_lowercase().as_str() {
        "dense" => Ok((
            required(layer.input_size, index, "Dense", "input_size")?,
            required(layer.output_size, index, "Dense", "output_size")?,
        )),
        "conv2d" => {
            let in_channels = required(layer.in_channels, index, "Conv2D", "in_channels")?;
            let out_channels = required(layer.out_channels, index, "Conv2D", "out_channels")?;
            let kernel_size = required(layer.kernel_size, index, "Conv2D", "kernel_size")? as isize;
            let input_height = required(layer.input_height, index, "Conv2D", "input_height")?;
            let input_width = required(layer.input_width, index, "Conv2D", "input_width")?;
            let padding = layer.padding.unwrap_or(0);
            let stride = layer.stride.unwrap_or(1) as isize;

            let out_height = (input_height as isize + 2 * padding - kernel_size) / stride + 1;
            let out_width = (input_width as isize + 2 * padding - kernel_size) / stride + 1;

            Ok((
                in_channels * input_height * input_width,
                out_channels * out_height as usize * out_width as usize,
            ))
        }
        "flatten" => {
            let size = required(layer.size, index, "Flatten", "size")?;
            Ok((size, size))
        }
        _ => Err(invalid(format!(
            "Layer {}: Unknown layer type: {}",
            index, layer.layer_type
        ))),
    }
}

/// Validates an architecture configuration.
///
/// Checks that:
/// - Architecture has at least one layer
/// - Each layer has the required fields for its type
/// - Parameter values are within valid ranges
/// - Layer connections are valid (output size of layer i matches input size of layer i+1)
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<(), Box<dyn Error>> {
    if config.layers.is_empty() {
        return Err(invalid("Architecture must have at least one layer"));
    }

    for (i, layer) in config.layers.iter().enumerate() {
        validate_layer(layer, i)?;
    }

    for i in 0..config.layers.len() - 1 {
        let (_, current_output) = layer_sizes(&config.layers[i], i)?;
        let (next_input, _) = layer_sizes(&config.layers[i + 1], i + 1)?;

        if current_output != next_input {
            return Err(invalid(format!(
                "Layer connection mismatch: Layer {} output size ({}) does not match Layer {} input size ({})",
                i,
                current_output,
                i + 1,
                next_input
            )));
        }
    }

    Ok(())
}

/// Validates a single layer configuration.
///
/// Checks that the layer has all required fields for its type and that
/// parameter values are within valid ranges.
fn validate_layer(layer: &LayerConfig, index: usize) -> Result<(), Box<dyn Error>> {
    let activation = layer.activation(index)?;

    match layer.layer_type.to_lowercase().as_str() {
        "dense" => {
            positive(layer.input_size, index, "Dense", "input_size")?;
            positive(layer.output_size, index, "Dense", "output_size")?;
        }
        "conv2d" => {
            positive(layer.in_channels, index, "Conv2D", "in_channels")?;
            positive(layer.out_channels, index, "Conv2D", "out_channels")?;
            let kernel_size = positive(layer.kernel_size, index, "Conv2D", "kernel_size")?;
            let input_height = positive(layer.input_height, index, "Conv2D", "input_height")?;
            let input_width = positive(layer.input_width, index, "Conv2D", "input_width")?;

            if layer.stride == Some(0) {
                return Err(invalid(format!(
                    "Layer {}: stride must be greater than 0",
                    index
                )));
            }
            let padding = layer.padding.unwrap_or(0);
            if padding < 0 {
                return Err(invalid(format!(
                    "Layer {}: padding must be non-negative",
                    index
                )));
            }
            let smallest = input_height.min(input_width) as isize + 2 * padding;
            if (kernel_size as isize) > smallest {
                return Err(invalid(format!(
                    "Layer {}: kernel_size {} exceeds padded input {}",
                    index, kernel_size, smallest
                )));
            }
            if activation == Activation::Softmax {
                return Err(invalid(format!(
                    "Layer {}: softmax is only supported on dense layers",
                    index
                )));
            }
        }
        "flatten" => {
            positive(layer.size, index, "Flatten", "size")?;
            if layer.activation.is_some() {
                return Err(invalid(format!(
                    "Layer {}: Flatten layer takes no activation",
                    index
                )));
            }
        }
        _ => {
            return Err(invalid(format!(
                "Layer {}: Invalid layer type '{}'. Must be one of: dense, conv2d, flatten",
                index, layer.layer_type
            )));
        }
    }

    Ok(())
}

/// Builds a neural network model from architecture configuration.
///
/// The configuration is validated first; each layer is then initialized with
/// weights drawn from `rng`.
///
/// # Examples
///
/// ```
/// use mnist_param_export::architecture::{build_model, ArchitectureConfig};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let config = ArchitectureConfig::mnist_fully_connected();
/// let mut rng = StdRng::seed_from_u64(1);
/// let model = build_model(&config, &mut rng).unwrap();
/// assert_eq!(model.layers().len(), 4);
/// assert_eq!(model.output_size(), 10);
/// ```
pub fn build_model<R: Rng>(
    config: &ArchitectureConfig,
    rng: &mut R,
) -> Result<Sequential, Box<dyn Error>> {
    validate_architecture(config)?;
    let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(config.layers.len());

    for (i, layer_config) in config.layers.iter().enumerate() {
        let activation = layer_config.activation(i)?;

        match layer_config.layer_type.to_lowercase().as_str() {
            "dense" => {
                let input_size = required(layer_config.input_size, i, "Dense", "input_size")?;
                let output_size = required(layer_config.output_size, i, "Dense", "output_size")?;
                layers.push(Box::new(DenseLayer::new(input_size, output_size, activation, rng)));
            }
            "conv2d" => {
                let layer = Conv2DLayer::new(
                    required(layer_config.in_channels, i, "Conv2D", "in_channels")?,
                    required(layer_config.out_channels, i, "Conv2D", "out_channels")?,
                    required(layer_config.kernel_size, i, "Conv2D", "kernel_size")?,
                    layer_config.padding.unwrap_or(0),
                    layer_config.stride.unwrap_or(1),
                    required(layer_config.input_height, i, "Conv2D", "input_height")?,
                    required(layer_config.input_width, i, "Conv2D", "input_width")?,
                    activation,
                    rng,
                );
                layers.push(Box::new(layer));
            }
            "flatten" => {
                let size = required(layer_config.size, i, "Flatten", "size")?;
                layers.push(Box::new(FlattenLayer::new(size)));
            }
            _ => {
                return Err(invalid(format!(
                    "Layer {}: Invalid layer type '{}'. Must be one of: dense, conv2d, flatten",
                    i, layer_config.layer_type
                )));
            }
        }
    }

    Ok(Sequential::new(layers))
}

fn invalid(message: impl Into<String>) -> Box<dyn Error> {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message.into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn conv(in_channels: usize, out_channels: usize, kernel_size: usize, hw: usize) -> LayerConfig {
        LayerConfig {
            layer_type: "conv2d".to_string(),
            in_channels: Some(in_channels),
            out_channels: Some(out_channels),
            kernel_size: Some(kernel_size),
            input_height: Some(hw),
            input_width: Some(hw),
            activation: Some("relu".to_string()),
            ..LayerConfig::default()
        }
    }

    #[test]
    fn test_validate_dense_layer() {
        assert!(validate_layer(&LayerConfig::dense(784, 600, "sigmoid"), 0).is_ok());
    }

    #[test]
    fn test_validate_dense_layer_missing_fields() {
        let layer = LayerConfig {
            input_size: None,
            ..LayerConfig::dense(784, 600, "sigmoid")
        };
        assert!(validate_layer(&layer, 0).is_err());
    }

    #[test]
    fn test_validate_invalid_layer_type() {
        let layer = LayerConfig {
            layer_type: "dropout".to_string(),
            ..LayerConfig::default()
        };
        assert!(validate_layer(&layer, 0).is_err());
    }

    #[test]
    fn test_validate_unknown_activation() {
        let err = validate_layer(&LayerConfig::dense(4, 2, "swish"), 3).unwrap_err();
        assert!(err.to_string().contains("Layer 3"));
        assert!(err.to_string().contains("swish"));
    }

    #[test]
    fn test_validate_conv_rejects_softmax() {
        let layer = LayerConfig {
            activation: Some("softmax".to_string()),
            ..conv(1, 4, 3, 28)
        };
        assert!(validate_layer(&layer, 0).is_err());
    }

    #[test]
    fn test_validate_conv_kernel_too_large() {
        assert!(validate_layer(&conv(1, 4, 7, 5), 0).is_err());
    }

    #[test]
    fn test_validate_empty_architecture() {
        let config = ArchitectureConfig { layers: vec![] };
        assert!(validate_architecture(&config).is_err());
    }

    #[test]
    fn test_validate_layer_connection_mismatch() {
        let config = ArchitectureConfig {
            layers: vec![
                LayerConfig::dense(784, 300, "sigmoid"),
                LayerConfig::dense(256, 10, "sigmoid"),
            ],
        };
        let err = validate_architecture(&config).unwrap_err();
        assert!(err.to_string().contains("Layer connection mismatch"));
    }

    #[test]
    fn test_validate_conv_flatten_dense_connection() {
        // 28x28, 3x3 kernel, no padding: 26 * 26 * 4 = 2704
        let config = ArchitectureConfig {
            layers: vec![
                conv(1, 4, 3, 28),
                LayerConfig::flatten(2704),
                LayerConfig::dense(2704, 10, "softmax"),
            ],
        };
        assert!(validate_architecture(&config).is_ok());
    }

    #[test]
    fn test_load_architecture() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let json_content = r#"{
  "layers": [
    {
      "layer_type": "dense",
      "input_size": 784,
      "output_size": 256,
      "activation": "relu"
    },
    {
      "layer_type": "dense",
      "input_size": 256,
      "output_size": 10
    }
  ]
}"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(json_content.as_bytes()).unwrap();
        let temp_path = temp_file.path().to_str().unwrap();

        let config = load_architecture(temp_path).unwrap();
        assert_eq!(config.layers.len(), 2);
        assert_eq!(config.layers[0].activation.as_deref(), Some("relu"));
        assert_eq!(config.layers[1].activation, None);
        assert_eq!(config.layers[1].output_size, Some(10));
    }

    #[test]
    fn test_build_model() {
        let mut rng = StdRng::seed_from_u64(42);
        let model = build_model(&ArchitectureConfig::default(), &mut rng).unwrap();

        let kinds: Vec<&str> = model.layers().iter().map(|layer| layer.kind()).collect();
        assert_eq!(kinds, vec!["dense"; 4]);
        assert_eq!(model.input_size(), 784);
        assert_eq!(model.output_size(), 10);
    }

    #[test]
    fn test_build_model_conv2d() {
        let config = ArchitectureConfig {
            layers: vec![
                conv(1, 4, 3, 28),
                LayerConfig::flatten(2704),
                LayerConfig::dense(2704, 10, "softmax"),
            ],
        };
        let mut rng = StdRng::seed_from_u64(42);
        let model = build_model(&config, &mut rng).unwrap();

        assert_eq!(model.layers()[0].kind(), "conv2d");
        assert_eq!(model.layers()[0].parameter_count(), 3 * 3 * 4 + 4);
        assert_eq!(model.layers()[1].parameter_count(), 0);
    }

    #[test]
    fn test_example_configs() {
        let fc = load_architecture("config/architectures/fc_mnist.json").unwrap();
        assert_eq!(fc.layers.len(), 4);
        assert_eq!(fc.layers[0].output_size, Some(600));
        assert_eq!(fc.layers[3].output_size, Some(10));

        let cnn = load_architecture("config/architectures/cnn_mnist.json").unwrap();
        assert_eq!(cnn.layers[0].layer_type, "conv2d");
        assert_eq!(cnn.layers[1].layer_type, "flatten");
    }
}
