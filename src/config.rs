//! Configuration structures for training
//!
//! This module provides the training configuration read from JSON files:
//! epoch and batch settings, the optimizer and its hyperparameters, and the
//! input order used when exporting a dense layer that follows a convolution.

use crate::export::FlattenOrder;
use serde::Deserialize;
use std::error::Error;
use std::fs;

/// Configuration for training and export.
///
/// Every field is optional in the JSON file; missing fields take the values
/// of [`TrainingConfig::default`].
///
/// - **adam**: uses `learning_rate`, `beta1`, `beta2` and `epsilon`
/// - **sgd**: uses `learning_rate` only
///
/// # Example
///
/// ```json
/// {
///   "epochs": 10,
///   "batch_size": 128,
///   "optimizer": "adam",
///   "learning_rate": 0.001,
///   "flatten_order": "channels_first"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of passes over the training set
    pub epochs: usize,

    /// Samples per optimizer step
    pub batch_size: usize,

    /// Optimizer name: "adam" or "sgd"
    pub optimizer: String,

    pub learning_rate: f32,

    /// Adam first moment decay
    pub beta1: f32,

    /// Adam second moment decay
    pub beta2: f32,

    /// Adam denominator offset
    pub epsilon: f32,

    /// Seed for weight initialization and shuffling
    pub seed: u64,

    /// Input order of a dense layer exported after a convolution
    pub flatten_order: FlattenOrder,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 128,
            optimizer: "adam".to_string(),
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            seed: 1,
            flatten_order: FlattenOrder::default(),
        }
    }
}

/// Loads a training configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it into a [`TrainingConfig`] and
/// validates the values.
///
/// # Examples
///
/// ```no_run
/// use mnist_param_export::config::load_config;
///
/// let config = load_config("config/training.json").unwrap();
/// assert!(config.batch_size > 0);
/// ```
pub fn load_config(path: &str) -> Result<TrainingConfig, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks value ranges of a training configuration.
pub fn validate_config(config: &TrainingConfig) -> Result<(), Box<dyn Error>> {
    if config.epochs == 0 {
        return Err(invalid("epochs must be greater than 0"));
    }

    if config.batch_size == 0 {
        return Err(invalid("batch_size must be greater than 0"));
    }

    let valid_optimizers = ["adam", "sgd"];
    if !valid_optimizers.contains(&config.optimizer.to_lowercase().as_str()) {
        return Err(invalid(format!(
            "Invalid optimizer '{}'. Must be one of: {}",
            config.optimizer,
            valid_optimizers.join(", ")
        )));
    }

    if config.learning_rate <= 0.0 {
        return Err(invalid("learning_rate must be positive"));
    }

    if !(0.0..1.0).contains(&config.beta1) {
        return Err(invalid("beta1 must be in range [0.0, 1.0)"));
    }

    if !(0.0..1.0).contains(&config.beta2) {
        return Err(invalid("beta2 must be in range [0.0, 1.0)"));
    }

    if config.epsilon <= 0.0 {
        return Err(invalid("epsilon must be positive"));
    }

    Ok(())
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
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_values() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, 10);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.optimizer, "adam");
        assert_eq!(config.learning_rate, 0.001);
        assert_eq!(config.epsilon, 1e-7);
        assert_eq!(config.flatten_order, FlattenOrder::ChannelsFirst);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_load_partial_config() {
        let file = write_config(
            r#"{
  "epochs": 3,
  "optimizer": "sgd",
  "learning_rate": 0.05,
  "flatten_order": "channels_last"
}"#,
        );

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.optimizer, "sgd");
        assert_eq!(config.learning_rate, 0.05);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.flatten_order, FlattenOrder::ChannelsLast);
    }

    #[test]
    fn test_rejects_unknown_optimizer() {
        let file = write_config(r#"{"optimizer": "rmsprop"}"#);
        let err = load_config(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("rmsprop"));
    }

    #[test]
    fn test_rejects_unknown_flatten_order() {
        let file = write_config(r#"{"flatten_order": "diagonal"}"#);
        assert!(load_config(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = TrainingConfig::default();
        config.batch_size = 0;
        assert!(validate_config(&config).is_err());

        let mut config = TrainingConfig::default();
        config.beta2 = 1.0;
        assert!(validate_config(&config).is_err());

        let mut config = TrainingConfig::default();
        config.learning_rate = -0.1;
        assert!(validate_config(&config).is_err());
    }
}
