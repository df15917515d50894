//! Labeled datasets and the train/validation split the training loop consumes.
//!
//! Features are a row-major [`Matrix`]; labels are class indices, one per row. The loop
//! reshuffles the training rows in place between epochs and slices them into row-contiguous
//! mini-batches.

use std::ops::Range;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::parallel::partition_rows;
use crate::{Error, Matrix, Result};

/// Shuffling policy for the training rows.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shuffle {
    /// Keep the original row order every epoch.
    None,
    /// Reshuffle every epoch from an RNG seeded once per fit call.
    Seeded(u64),
}

impl Default for Shuffle {
    fn default() -> Self {
        Shuffle::Seeded(0)
    }
}

/// Features `(len, input_dim)` paired with one class label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledData {
    features: Matrix,
    labels: Vec<usize>,
}

impl LabeledData {
    pub fn new(features: Matrix, labels: Vec<usize>) -> Result<Self> {
        if features.rows() != labels.len() {
            return Err(Error::InvalidData(format!(
                "feature rows {} do not match label count {}",
                features.rows(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    /// Convenience constructor from per-sample rows.
    pub fn from_rows(rows: &[Vec<f32>], labels: &[usize]) -> Result<Self> {
        Self::new(Matrix::from_rows(rows)?, labels.to_vec())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.features.cols()
    }

    #[inline]
    pub fn features(&self) -> &Matrix {
        &self.features
    }

    #[inline]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Largest label + 1 (0 for an empty set).
    pub fn num_classes(&self) -> usize {
        self.labels.iter().max().map_or(0, |&m| m + 1)
    }

    pub fn select_rows(&self, range: Range<usize>) -> LabeledData {
        LabeledData {
            features: self.features.select_rows(range.clone()),
            labels: self.labels[range].to_vec(),
        }
    }

    /// Permute rows in place; feature/label pairing is preserved.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        self.features = self.features.gather_rows(&order);
        self.labels = order.iter().map(|&i| self.labels[i]).collect();
    }

    /// Row-contiguous mini-batches of `size` rows; the last one may be smaller.
    pub fn batches(&self, size: usize) -> Vec<LabeledData> {
        assert!(size > 0, "batch size must be > 0");
        self.features
            .batches(size)
            .into_iter()
            .zip(self.labels.chunks(size))
            .map(|(features, labels)| LabeledData {
                features,
                labels: labels.to_vec(),
            })
            .collect()
    }

    /// `n` contiguous parts whose sizes differ by at most one row (empty parts dropped).
    ///
    /// # Panics
    ///
    /// If `n == 0`.
    pub fn partition(&self, n: usize) -> Vec<LabeledData> {
        partition_rows(self.len(), n)
            .into_iter()
            .map(|range| self.select_rows(range))
            .collect()
    }
}

/// Training and held-out validation data.
#[derive(Debug, Clone)]
pub struct TrainValSplit {
    pub train: LabeledData,
    pub validation: LabeledData,
}

impl TrainValSplit {
    pub fn new(train: LabeledData, validation: LabeledData) -> Result<Self> {
        if train.is_empty() {
            return Err(Error::InvalidData("train set must not be empty".to_owned()));
        }
        if validation.is_empty() {
            return Err(Error::InvalidData(
                "validation set must not be empty".to_owned(),
            ));
        }
        if train.input_dim() != validation.input_dim() {
            return Err(Error::InvalidData(format!(
                "train input_dim {} does not match validation input_dim {}",
                train.input_dim(),
                validation.input_dim()
            )));
        }
        Ok(Self { train, validation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn numbered(len: usize) -> LabeledData {
        // Feature value encodes the row's label so pairing can be checked after shuffling.
        let rows: Vec<Vec<f32>> = (0..len).map(|i| vec![i as f32, -(i as f32)]).collect();
        let labels: Vec<usize> = (0..len).collect();
        LabeledData::from_rows(&rows, &labels).unwrap()
    }

    #[test]
    fn new_validates_label_count() {
        assert!(LabeledData::new(Matrix::zeros(3, 2), vec![0, 1]).is_err());
    }

    #[test]
    fn shuffle_preserves_pairing() {
        let mut data = numbered(50);
        let mut rng = StdRng::seed_from_u64(3);
        data.shuffle(&mut rng);

        assert_ne!(data.labels(), numbered(50).labels());
        for r in 0..data.len() {
            assert_eq!(data.features().get(r, 0), data.labels()[r] as f32);
            assert_eq!(data.features().get(r, 1), -(data.labels()[r] as f32));
        }
        let mut sorted = data.labels().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn batches_and_partitions_cover_all_rows() {
        let data = numbered(10);
        let batches = data.batches(4);
        assert_eq!(batches.iter().map(LabeledData::len).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert_eq!(batches[2].labels(), &[8, 9]);

        let parts = data.partition(3);
        assert_eq!(parts.iter().map(LabeledData::len).collect::<Vec<_>>(), vec![4, 3, 3]);
        assert_eq!(parts[1].labels(), &[4, 5, 6]);
    }

    #[test]
    #[should_panic(expected = "partition count must be > 0")]
    fn partition_into_zero_parts_panics() {
        let _ = numbered(4).partition(0);
    }

    #[test]
    fn split_rejects_mismatched_widths() {
        let train = numbered(4);
        let val = LabeledData::new(Matrix::zeros(2, 3), vec![0, 1]).unwrap();
        assert!(TrainValSplit::new(train, val).is_err());
    }
}
