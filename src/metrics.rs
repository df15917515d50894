//! Classification statistics.
//!
//! Metrics are evaluation helpers; they never participate in backprop.

use crate::{Matrix, loss};

/// Accuracy and mean cross-entropy of a batch of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stats {
    pub accuracy: f32,
    pub cross_entropy: f32,
}

impl Stats {
    /// Argmax accuracy and mean cross-entropy of row-wise probabilities.
    ///
    /// # Panics
    ///
    /// If the row count differs from `labels.len()` or a label is `>= predictions.cols()`.
    pub fn compute(predictions: &Matrix, labels: &[usize]) -> Self {
        assert_eq!(
            predictions.rows(),
            labels.len(),
            "prediction rows {} do not match label count {}",
            predictions.rows(),
            labels.len()
        );
        loss::assert_labels_in_range(labels, predictions.cols());
        if labels.is_empty() {
            return Self::default();
        }

        let correct = labels
            .iter()
            .enumerate()
            .filter(|&(r, &label)| argmax(predictions.row(r)) == label)
            .count();

        Self {
            accuracy: correct as f32 / labels.len() as f32,
            cross_entropy: loss::cross_entropy(predictions, labels),
        }
    }

    /// Unweighted mean over `stats`; the default value when empty.
    pub fn average(stats: &[Stats]) -> Self {
        if stats.is_empty() {
            return Self::default();
        }
        let n = stats.len() as f32;
        let (acc, ce) = stats.iter().fold((0.0_f32, 0.0_f32), |(a, c), s| {
            (a + s.accuracy, c + s.cross_entropy)
        });
        Self {
            accuracy: acc / n,
            cross_entropy: ce / n,
        }
    }
}

fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}
