//! MNIST parameter export library
//!
//! Trains small sequential networks on handwritten digits and writes their
//! weights and biases to the flat-text parameter format read by an external
//! inference engine.
//!
//! # Modules
//!
//! - `layers`: Layer trait and implementations (Dense, Conv2D, Flatten)
//! - `optimizers`: Optimizer trait and implementations (SGD, Adam)
//! - `utils`: Activation functions and loss
//! - `config`: Training configuration structures
//! - `architecture`: Architecture configuration and model building
//! - `model`: Sequential model with training and evaluation
//! - `data`: IDX dataset loading and batching
//! - `export`: Parameter file writer, reader and importer

pub mod architecture;
pub mod config;
pub mod data;
pub mod export;
pub mod layers;
pub mod model;
pub mod optimizers;
pub mod utils;
