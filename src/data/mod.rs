//! Dataset loading and batching
//!
//! - `mnist`: IDX image and label files
//! - [`Dataset`]: flattened inputs with class labels

pub mod mnist;

pub use mnist::{parse_idx_images, parse_idx_labels, read_idx_images, read_idx_labels, IdxImages};

use std::io::{self, ErrorKind};
use std::path::Path;

/// Number of digit classes.
pub const MNIST_CLASSES: usize = 10;

/// Samples stored as one flat row of `input_size` features each.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub inputs: Vec<f32>,
    pub labels: Vec<u8>,
    pub input_size: usize,
    pub num_classes: usize,
}

impl Dataset {
    pub fn new(
        inputs: Vec<f32>,
        labels: Vec<u8>,
        input_size: usize,
        num_classes: usize,
    ) -> io::Result<Self> {
        if input_size == 0 || inputs.len() != labels.len() * input_size {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "{} input values do not form {} samples of {} features",
                    inputs.len(),
                    labels.len(),
                    input_size
                ),
            ));
        }
        if let Some(&label) = labels.iter().find(|&&label| label as usize >= num_classes) {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("label {} outside of {} classes", label, num_classes),
            ));
        }
        Ok(Self {
            inputs,
            labels,
            input_size,
            num_classes,
        })
    }

    pub fn from_idx(images: IdxImages, labels: Vec<u8>) -> io::Result<Self> {
        if images.count != labels.len() {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("{} images but {} labels", images.count, labels.len()),
            ));
        }
        Self::new(images.pixels, labels, images.rows * images.cols, MNIST_CLASSES)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Copies the samples at `indices` into `out_inputs` and writes one-hot
    /// targets into `out_targets`.
    pub fn gather_batch(&self, indices: &[usize], out_inputs: &mut [f32], out_targets: &mut [f32]) {
        let stride = self.input_size;
        let classes = self.num_classes;
        out_targets[..indices.len() * classes].fill(0.0);

        for (i, &src) in indices.iter().enumerate() {
            out_inputs[i * stride..(i + 1) * stride]
                .copy_from_slice(&self.inputs[src * stride..(src + 1) * stride]);
            out_targets[i * classes + self.labels[src] as usize] = 1.0;
        }
    }
}

/// Loads the MNIST training or test split from `dir`.
pub fn load_mnist<P: AsRef<Path>>(dir: P, train: bool, limit: Option<usize>) -> io::Result<Dataset> {
    let dir = dir.as_ref();
    let (images, labels) = if train {
        (mnist::TRAIN_IMAGES, mnist::TRAIN_LABELS)
    } else {
        (mnist::TEST_IMAGES, mnist::TEST_LABELS)
    };

    let images = read_idx_images(dir.join(images), limit)?;
    let labels = read_idx_labels(dir.join(labels), limit)?;
    tracing::debug!(samples = images.count, rows = images.rows, cols = images.cols, train, "loaded IDX files");
    Dataset::from_idx(images, labels)
}

#[cfg(test)]
mod tests {
    use super::mnist::{encode_idx_images, encode_idx_labels};
    use super::*;

    #[test]
    fn test_gather_batch_one_hot() {
        let dataset = Dataset::new(vec![0.0, 0.1, 1.0, 1.1, 2.0, 2.1], vec![2, 0, 1], 2, 3).unwrap();

        let mut inputs = vec![0.0f32; 4];
        let mut targets = vec![9.0f32; 6];
        dataset.gather_batch(&[2, 0], &mut inputs, &mut targets);

        assert_eq!(inputs, vec![2.0, 2.1, 0.0, 0.1]);
        assert_eq!(targets, vec![0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_dataset_rejects_bad_labels() {
        assert!(Dataset::new(vec![0.0; 2], vec![5], 2, 3).is_err());
        assert!(Dataset::new(vec![0.0; 3], vec![0], 2, 3).is_err());
    }

    #[test]
    fn test_load_mnist_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(mnist::TEST_IMAGES),
            encode_idx_images(&[0, 255, 255, 0, 255, 0, 0, 255], 2, 2, 2),
        )
        .unwrap();
        std::fs::write(dir.path().join(mnist::TEST_LABELS), encode_idx_labels(&[7, 3])).unwrap();

        let dataset = load_mnist(dir.path(), false, None).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.input_size, 4);
        assert_eq!(dataset.labels, vec![7, 3]);

        assert!(load_mnist(dir.path(), true, None).is_err());
    }
}
