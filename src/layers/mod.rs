//! Layer abstractions for neural networks
//!
//! This module provides the Layer trait and the dense, convolutional and
//! flatten layers a [`Sequential`](crate::model::Sequential) model is built from.

mod r#trait;
pub mod conv2d;
pub mod dense;
pub mod flatten;

// Re-export the Layer trait for convenience
pub use conv2d::Conv2DLayer;
pub use dense::DenseLayer;
pub use flatten::FlattenLayer;
pub use r#trait::Layer;
