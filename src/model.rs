//! Sequential model
//!
//! A stack of [`Layer`]s applied in order, trained with mini-batch gradient
//! descent on categorical cross-entropy.

use crate::config::{validate_config, TrainingConfig};
use crate::data::Dataset;
use crate::layers::Layer;
use crate::optimizers::OptimizerKind;
use crate::utils::categorical_crossentropy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::error::Error;
use std::time::Instant;

/// Batch size used by [`Sequential::predict`].
const PREDICT_BATCH: usize = 256;

/// Loss and accuracy over a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Mean cross-entropy per sample
    pub loss: f32,
    /// Fraction of samples whose highest output is the label
    pub accuracy: f32,
}

/// Summary of one training epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// 1-based epoch number
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub seconds: f32,
    pub validation: Option<Evaluation>,
}

/// Layers applied in sequence, the output of each feeding the next.
pub struct Sequential {
    layers: Vec<Box<dyn Layer>>,
}

impl Sequential {
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Box<dyn Layer>] {
        &mut self.layers
    }

    /// Features per sample accepted by the first layer (0 when empty).
    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |layer| layer.input_size())
    }

    /// Features per sample produced by the last layer (0 when empty).
    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |layer| layer.output_size())
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.parameter_count()).sum()
    }

    /// Runs a batch through every layer and returns each layer's output.
    pub fn forward(&self, input: &[f32], batch_size: usize) -> Vec<Vec<f32>> {
        let mut outputs: Vec<Vec<f32>> = Vec::with_capacity(self.layers.len());

        for (i, layer) in self.layers.iter().enumerate() {
            let mut output = vec![0.0f32; batch_size * layer.output_size()];
            let layer_input = if i == 0 { input } else { &outputs[i - 1] };
            layer.forward(layer_input, &mut output, batch_size);
            outputs.push(output);
        }

        outputs
    }

    /// Predicted class (index of the highest output) for every sample in `inputs`.
    pub fn predict(&self, inputs: &[f32]) -> Vec<usize> {
        let input_size = self.input_size();
        let classes = self.output_size();
        if input_size == 0 || classes == 0 {
            return Vec::new();
        }

        let mut predictions = Vec::with_capacity(inputs.len() / input_size);
        for chunk in inputs.chunks(PREDICT_BATCH * input_size) {
            let batch = chunk.len() / input_size;
            let outputs = self.forward(chunk, batch);
            if let Some(last) = outputs.last() {
                predictions.extend(last.chunks(classes).map(argmax));
            }
        }
        predictions
    }

    /// One optimizer step on a batch.
    ///
    /// Returns the summed loss and the number of correctly classified samples.
    pub fn train_batch(
        &mut self,
        inputs: &[f32],
        targets: &[f32],
        batch_size: usize,
        optimizer: &OptimizerKind,
    ) -> (f32, usize) {
        let classes = self.output_size();
        let outputs = self.forward(inputs, batch_size);
        let Some(predictions) = outputs.last() else {
            return (0.0, 0);
        };

        let mut grad = vec![0.0f32; batch_size * classes];
        let loss = categorical_crossentropy(predictions, targets, batch_size, classes, &mut grad);
        let correct = count_correct(predictions, targets, classes);

        for (i, layer) in self.layers.iter().enumerate().rev() {
            let layer_input = if i == 0 { inputs } else { &outputs[i - 1] };
            let mut grad_input = vec![0.0f32; batch_size * layer.input_size()];
            layer.backward(layer_input, &outputs[i], &grad, &mut grad_input, batch_size);
            grad = grad_input;
        }

        for layer in self.layers.iter_mut() {
            layer.update_parameters(optimizer);
        }

        (loss, correct)
    }

    /// Trains for `config.epochs` epochs over shuffled mini-batches.
    ///
    /// Validation data, if given, is evaluated after every epoch.
    pub fn fit(
        &mut self,
        train: &Dataset,
        config: &TrainingConfig,
        validation: Option<&Dataset>,
    ) -> Result<Vec<EpochReport>, Box<dyn Error>> {
        validate_config(config)?;
        self.check_dataset(train)?;
        if let Some(validation) = validation {
            self.check_dataset(validation)?;
        }
        if train.is_empty() {
            return Err(invalid("training set is empty"));
        }

        let optimizer = OptimizerKind::from_config(config)?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut indices: Vec<usize> = (0..train.len()).collect();

        let mut batch_inputs = vec![0.0f32; config.batch_size * train.input_size];
        let mut batch_targets = vec![0.0f32; config.batch_size * train.num_classes];
        let mut reports = Vec::with_capacity(config.epochs);

        tracing::info!(
            samples = train.len(),
            epochs = config.epochs,
            batch_size = config.batch_size,
            parameters = self.parameter_count(),
            "training started"
        );

        for epoch in 1..=config.epochs {
            let start_time = Instant::now();
            indices.shuffle(&mut rng);

            let mut total_loss = 0.0f32;
            let mut correct = 0usize;
            for batch in indices.chunks(config.batch_size) {
                let count = batch.len();
                let inputs = &mut batch_inputs[..count * train.input_size];
                let targets = &mut batch_targets[..count * train.num_classes];
                train.gather_batch(batch, inputs, targets);

                let (loss, hits) = self.train_batch(inputs, targets, count, &optimizer);
                total_loss += loss;
                correct += hits;
            }

            let validation = validation
                .map(|data| self.evaluate(data, config.batch_size))
                .transpose()?;
            let report = EpochReport {
                epoch,
                loss: total_loss / train.len() as f32,
                accuracy: correct as f32 / train.len() as f32,
                seconds: start_time.elapsed().as_secs_f32(),
                validation,
            };

            match report.validation {
                Some(val) => tracing::info!(
                    epoch,
                    loss = report.loss,
                    accuracy = report.accuracy,
                    val_loss = val.loss,
                    val_accuracy = val.accuracy,
                    seconds = report.seconds,
                    "epoch finished"
                ),
                None => tracing::info!(
                    epoch,
                    loss = report.loss,
                    accuracy = report.accuracy,
                    seconds = report.seconds,
                    "epoch finished"
                ),
            }
            reports.push(report);
        }

        Ok(reports)
    }

    /// Mean loss and accuracy over `dataset`.
    pub fn evaluate(&self, dataset: &Dataset, batch_size: usize) -> Result<Evaluation, Box<dyn Error>> {
        self.check_dataset(dataset)?;
        if dataset.is_empty() {
            return Ok(Evaluation {
                loss: 0.0,
                accuracy: 0.0,
            });
        }

        let batch_size = batch_size.max(1);
        let classes = dataset.num_classes;
        let mut inputs = vec![0.0f32; batch_size * dataset.input_size];
        let mut targets = vec![0.0f32; batch_size * classes];
        let mut grad = vec![0.0f32; batch_size * classes];
        let indices: Vec<usize> = (0..dataset.len()).collect();

        let mut total_loss = 0.0f32;
        let mut correct = 0usize;
        for batch in indices.chunks(batch_size) {
            let count = batch.len();
            let inputs = &mut inputs[..count * dataset.input_size];
            let targets = &mut targets[..count * classes];
            dataset.gather_batch(batch, inputs, targets);

            let outputs = self.forward(inputs, count);
            if let Some(predictions) = outputs.last() {
                total_loss +=
                    categorical_crossentropy(predictions, targets, count, classes, &mut grad);
                correct += count_correct(predictions, targets, classes);
            }
        }

        Ok(Evaluation {
            loss: total_loss / dataset.len() as f32,
            accuracy: correct as f32 / dataset.len() as f32,
        })
    }

    fn check_dataset(&self, dataset: &Dataset) -> Result<(), Box<dyn Error>> {
        if self.layers.is_empty() {
            return Err(invalid("model has no layers"));
        }
        if dataset.input_size != self.input_size() {
            return Err(invalid(format!(
                "dataset has {} features per sample but the model expects {}",
                dataset.input_size,
                self.input_size()
            )));
        }
        if dataset.num_classes != self.output_size() {
            return Err(invalid(format!(
                "dataset has {} classes but the model outputs {}",
                dataset.num_classes,
                self.output_size()
            )));
        }
        Ok(())
    }
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

fn count_correct(predictions: &[f32], targets: &[f32], classes: usize) -> usize {
    predictions
        .chunks(classes)
        .zip(targets.chunks(classes))
        .filter(|(p, t)| argmax(p) == argmax(t))
        .count()
}

fn invalid(message: impl Into<String>) -> Box<dyn Error> {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message.into(),
    ))
}
