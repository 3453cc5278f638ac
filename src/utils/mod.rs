//! Shared utilities for neural network implementations
//!
//! Activation functions and the training loss.

pub mod activations;
pub mod loss;

pub use activations::{relu_inplace, sigmoid, softmax_rows, Activation};
pub use loss::categorical_crossentropy;
