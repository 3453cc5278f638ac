//! End-to-end training tests on tiny synthetic datasets.

use mnist_param_export::architecture::{build_model, ArchitectureConfig, LayerConfig};
use mnist_param_export::config::TrainingConfig;
use mnist_param_export::data::Dataset;
use mnist_param_export::model::Sequential;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Two clusters around (1, 0) and (0, 1).
fn clusters() -> Dataset {
    let mut inputs = Vec::new();
    let mut labels = Vec::new();
    for i in 0..16 {
        let jitter = (i % 4) as f32 * 0.05;
        if i % 2 == 0 {
            inputs.extend_from_slice(&[1.0 - jitter, jitter]);
            labels.push(0);
        } else {
            inputs.extend_from_slice(&[jitter, 1.0 - jitter]);
            labels.push(1);
        }
    }
    Dataset::new(inputs, labels, 2, 2).unwrap()
}

/// 4x4 images with a vertical (class 0) or horizontal (class 1) bar.
fn bars() -> Dataset {
    let mut inputs = Vec::new();
    let mut labels = Vec::new();
    for k in 0..4 {
        for class in 0..2u8 {
            for y in 0..4 {
                for x in 0..4 {
                    let on = if class == 0 { x == k } else { y == k };
                    inputs.push(if on { 1.0 } else { 0.0 });
                }
            }
            labels.push(class);
        }
    }
    Dataset::new(inputs, labels, 16, 2).unwrap()
}

fn config(epochs: usize, batch_size: usize, optimizer: &str, learning_rate: f32) -> TrainingConfig {
    TrainingConfig {
        epochs,
        batch_size,
        optimizer: optimizer.to_string(),
        learning_rate,
        ..TrainingConfig::default()
    }
}

fn mlp(output_activation: &str) -> Sequential {
    let architecture = ArchitectureConfig {
        layers: vec![
            LayerConfig::dense(2, 8, "tanh"),
            LayerConfig::dense(8, 2, output_activation),
        ],
    };
    build_model(&architecture, &mut StdRng::seed_from_u64(7)).unwrap()
}

#[test]
fn test_adam_softmax_learns_clusters() {
    let data = clusters();
    let mut model = mlp("softmax");

    let reports = model.fit(&data, &config(40, 4, "adam", 0.05), None).unwrap();
    assert_eq!(reports.len(), 40);
    assert_eq!(reports[0].epoch, 1);
    assert!(reports.last().unwrap().loss < reports[0].loss);

    let evaluation = model.evaluate(&data, 8).unwrap();
    assert_eq!(evaluation.accuracy, 1.0);
}

#[test]
fn test_sigmoid_outputs_train_with_crossentropy() {
    let data = clusters();
    let mut model = mlp("sigmoid");

    let reports = model.fit(&data, &config(60, 4, "adam", 0.05), None).unwrap();
    assert!(reports.last().unwrap().loss < reports[0].loss);
    assert_eq!(model.predict(&data.inputs), vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
}

#[test]
fn test_sgd_lowers_loss() {
    let data = clusters();
    let mut model = mlp("softmax");
    let before = model.evaluate(&data, 16).unwrap().loss;

    model.fit(&data, &config(30, 2, "sgd", 0.2), None).unwrap();
    assert!(model.evaluate(&data, 16).unwrap().loss < before);
}

#[test]
fn test_conv_model_lowers_loss() {
    let data = bars();
    let architecture = ArchitectureConfig {
        layers: vec![
            LayerConfig {
                layer_type: "conv2d".to_string(),
                in_channels: Some(1),
                out_channels: Some(2),
                kernel_size: Some(3),
                input_height: Some(4),
                input_width: Some(4),
                activation: Some("tanh".to_string()),
                ..LayerConfig::default()
            },
            LayerConfig::flatten(8),
            LayerConfig::dense(8, 2, "softmax"),
        ],
    };
    let mut model = build_model(&architecture, &mut StdRng::seed_from_u64(3)).unwrap();

    let reports = model
        .fit(&data, &config(50, 8, "adam", 0.05), Some(&data))
        .unwrap();
    let first = reports[0].validation.unwrap();
    let last = reports.last().unwrap().validation.unwrap();
    assert!(last.loss < first.loss);
}

#[test]
fn test_training_is_deterministic_for_a_seed() {
    let data = clusters();
    let losses = |seed: u64| {
        let mut model = mlp("softmax");
        let mut config = config(5, 3, "adam", 0.01);
        config.seed = seed;
        model
            .fit(&data, &config, None)
            .unwrap()
            .iter()
            .map(|report| report.loss)
            .collect::<Vec<f32>>()
    };

    assert_eq!(losses(1), losses(1));
}

#[test]
fn test_fit_rejects_invalid_config() {
    let data = clusters();
    let mut model = mlp("softmax");
    assert!(model.fit(&data, &config(1, 0, "adam", 0.01), None).is_err());
    assert!(model.fit(&data, &config(1, 4, "lbfgs", 0.01), None).is_err());
}
