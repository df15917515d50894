//! Softmax + cross-entropy, the one loss pairing the backward pass supports.
//!
//! With `p = softmax(z)` and `L = -ln p[label]`, the gradient w.r.t. the logits collapses to
//! `p - one_hot(label)`. The backward engine starts from that closed form instead of chaining
//! through the softmax Jacobian.

use crate::Matrix;

/// Probabilities are clamped to this floor before taking `ln`.
pub const PROB_FLOOR: f32 = 1e-7;

/// Panics unless every label indexes one of `classes` columns.
pub(crate) fn assert_labels_in_range(labels: &[usize], classes: usize) {
    if let Some(&bad) = labels.iter().find(|&&l| l >= classes) {
        panic!("label {bad} out of range for {classes} classes");
    }
}

/// `(labels.len(), classes)` one-hot encoding.
///
/// # Panics
///
/// If any label is `>= classes`.
pub fn one_hot(labels: &[usize], classes: usize) -> Matrix {
    assert_labels_in_range(labels, classes);
    let mut m = Matrix::zeros(labels.len(), classes);
    for (r, &label) in labels.iter().enumerate() {
        m.set(r, label, 1.0);
    }
    m
}

/// Output-layer delta for softmax + cross-entropy: `output - one_hot(labels)`.
///
/// Shape contract: `output.rows() == labels.len()` and every label `< output.cols()`.
pub fn softmax_cross_entropy_delta(output: &Matrix, labels: &[usize]) -> Matrix {
    assert_eq!(
        output.rows(),
        labels.len(),
        "output rows {} do not match label count {}",
        output.rows(),
        labels.len()
    );
    assert_labels_in_range(labels, output.cols());
    let mut delta = output.clone();
    for (r, &label) in labels.iter().enumerate() {
        let row = delta.row_mut(r);
        row[label] -= 1.0;
    }
    delta
}

/// Mean cross-entropy of `predictions` (row-wise probabilities) against integer labels.
///
/// # Panics
///
/// If the row count differs from `labels.len()` or a label is `>= predictions.cols()`.
pub fn cross_entropy(predictions: &Matrix, labels: &[usize]) -> f32 {
    assert_eq!(
        predictions.rows(),
        labels.len(),
        "prediction rows {} do not match label count {}",
        predictions.rows(),
        labels.len()
    );
    assert_labels_in_range(labels, predictions.cols());
    if labels.is_empty() {
        return 0.0;
    }
    let total: f32 = labels
        .iter()
        .enumerate()
        .map(|(r, &label)| -predictions.get(r, label).max(PROB_FLOOR).ln())
        .sum();
    total / labels.len() as f32
}
