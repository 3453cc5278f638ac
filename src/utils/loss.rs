//! Categorical cross-entropy
//!
//! Predictions are normalized by their row sum before the log, so sigmoid
//! output layers train the same way as softmax ones.

/// Clip applied to normalized probabilities.
pub const PROBABILITY_EPSILON: f32 = 1e-7;

/// Computes the summed cross-entropy over `rows` samples and writes the
/// gradient w.r.t. each raw prediction into `grad`.
///
/// With `s = sum(y)` and `p = y / s`, the per-sample loss is
/// `-sum(t * ln p)` and `dL/dy_k = (sum(t) - t_k / p_k) / s`.
///
/// # Parameters
///
/// - `predictions`: row-major `rows x cols` model outputs (non-negative)
/// - `targets`: row-major one-hot targets of the same shape
/// - `grad`: buffer of the same shape receiving the gradient
pub fn categorical_crossentropy(
    predictions: &[f32],
    targets: &[f32],
    rows: usize,
    cols: usize,
    grad: &mut [f32],
) -> f32 {
    let mut total_loss = 0.0f32;

    for r in 0..rows {
        let start = r * cols;
        let y = &predictions[start..start + cols];
        let t = &targets[start..start + cols];
        let g = &mut grad[start..start + cols];

        let sum = y.iter().sum::<f32>().max(PROBABILITY_EPSILON);
        let target_sum: f32 = t.iter().sum();

        for k in 0..cols {
            let p = (y[k] / sum).clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
            if t[k] != 0.0 {
                total_loss -= t[k] * p.ln();
            }
            g[k] = (target_sum - t[k] / p) / sum;
        }
    }

    total_loss
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_outputs_loss() {
        let predictions = [0.7f32, 0.2, 0.1];
        let targets = [1.0f32, 0.0, 0.0];
        let mut grad = [0.0f32; 3];

        let loss = categorical_crossentropy(&predictions, &targets, 1, 3, &mut grad);
        assert!((loss + 0.7f32.ln()).abs() < 1e-6);
        // sum(y) = 1: dL/dy = 1 - t/y
        assert!((grad[0] - (1.0 - 1.0 / 0.7)).abs() < 1e-5);
        assert!((grad[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_unnormalized_outputs() {
        // sigmoid-like outputs that do not sum to one
        let predictions = [0.9f32, 0.9];
        let targets = [0.0f32, 1.0];
        let mut grad = [0.0f32; 2];

        let loss = categorical_crossentropy(&predictions, &targets, 1, 2, &mut grad);
        assert!((loss - 2.0f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let predictions = [0.3f32, 0.6, 0.2, 0.1, 0.4, 0.8];
        let targets = [0.0f32, 1.0, 0.0, 0.0, 0.0, 1.0];
        let mut grad = [0.0f32; 6];
        categorical_crossentropy(&predictions, &targets, 2, 3, &mut grad);

        let h = 1e-3f32;
        let mut scratch = [0.0f32; 6];
        for i in 0..6 {
            let mut plus = predictions;
            let mut minus = predictions;
            plus[i] += h;
            minus[i] -= h;
            let numeric = (categorical_crossentropy(&plus, &targets, 2, 3, &mut scratch)
                - categorical_crossentropy(&minus, &targets, 2, 3, &mut scratch))
                / (2.0 * h);
            assert!((numeric - grad[i]).abs() < 1e-2, "index {}: {} vs {}", i, numeric, grad[i]);
        }
    }
}
