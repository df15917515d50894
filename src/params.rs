//! Parameter storage.
//!
//! `ParameterStore` owns, for each of the `L - 1` parameterized layers:
//! - `W_i` with shape `(width_i, width_{i+1})` so a batch propagates as `A_i · W_i`
//! - `b_i` with length `width_{i+1}`
//! - a cached `W_iᵗ` read by the backward pass
//!
//! Every mutation goes through [`ParameterStore::modify`] or [`ParameterStore::decay`], both of
//! which refresh the transposed cache before returning.

use rand::Rng;

use crate::{Activation, Error, Matrix, Result, Topology};

/// Weight initialization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    /// Uniform in `±sqrt(6 / (fan_in + fan_out))`.
    Xavier,
    /// Uniform in `±sqrt(6 / fan_in)`.
    He,
    Zeros,
}

impl Init {
    pub fn for_activation(act: Activation) -> Self {
        match act {
            Activation::ReLU | Activation::LeakyReLU { .. } => Init::He,
            Activation::Identity | Activation::Sigmoid | Activation::Tanh | Activation::Softmax => {
                Init::Xavier
            }
        }
    }

    fn sample<R: Rng + ?Sized>(self, fan_in: usize, fan_out: usize, rng: &mut R) -> f32 {
        let limit = match self {
            Init::Xavier => (6.0 / (fan_in + fan_out) as f32).sqrt(),
            Init::He => (6.0 / fan_in as f32).sqrt(),
            Init::Zeros => return 0.0,
        };
        rng.gen_range(-limit..limit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterStore {
    weights: Vec<Matrix>,
    weights_t: Vec<Matrix>,
    biases: Vec<Vec<f32>>,
}

impl ParameterStore {
    /// Random weights (scheme picked per layer activation), zero biases.
    pub fn init_with_rng<R: Rng + ?Sized>(topology: &Topology, rng: &mut R) -> Self {
        let layers = topology.layers();
        let mut weights = Vec::with_capacity(layers.len() - 1);
        let mut biases = Vec::with_capacity(layers.len() - 1);
        for pair in layers.windows(2) {
            let (fan_in, fan_out) = (pair[0].width, pair[1].width);
            let init = Init::for_activation(pair[1].activation);
            let mut w = Matrix::zeros(fan_in, fan_out);
            w.map_inplace(|_| init.sample(fan_in, fan_out, rng));
            weights.push(w);
            biases.push(vec![0.0; fan_out]);
        }
        Self::with_transposes(weights, biases)
    }

    /// All-zero weights and biases.
    pub fn zeros(topology: &Topology) -> Self {
        let layers = topology.layers();
        let weights = layers
            .windows(2)
            .map(|p| Matrix::zeros(p[0].width, p[1].width))
            .collect();
        let biases = layers[1..].iter().map(|l| vec![0.0; l.width]).collect();
        Self::with_transposes(weights, biases)
    }

    /// Build from explicit weights and biases, checking the chaining invariants.
    pub fn from_parts(weights: Vec<Matrix>, biases: Vec<Vec<f32>>) -> Result<Self> {
        if weights.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one weight matrix is required".to_owned(),
            ));
        }
        if weights.len() != biases.len() {
            return Err(Error::ShapeMismatch {
                context: "bias vector count",
                expected: weights.len(),
                got: biases.len(),
            });
        }
        for (i, (w, b)) in weights.iter().zip(&biases).enumerate() {
            if w.rows() == 0 || w.cols() == 0 {
                return Err(Error::InvalidConfig(format!("weights {i} must be non-empty")));
            }
            if w.cols() != b.len() {
                return Err(Error::ShapeMismatch {
                    context: "bias length vs weight cols",
                    expected: w.cols(),
                    got: b.len(),
                });
            }
            if let Some(next) = weights.get(i + 1) {
                if next.rows() != w.cols() {
                    return Err(Error::ShapeMismatch {
                        context: "weight chaining (next rows vs cols)",
                        expected: w.cols(),
                        got: next.rows(),
                    });
                }
            }
        }
        Ok(Self::with_transposes(weights, biases))
    }

    fn with_transposes(weights: Vec<Matrix>, biases: Vec<Vec<f32>>) -> Self {
        let weights_t = weights.iter().map(Matrix::transpose).collect();
        Self {
            weights,
            weights_t,
            biases,
        }
    }

    /// Number of parameterized layers (`L - 1`).
    #[inline]
    pub fn num_layers(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    pub fn weights(&self, layer: usize) -> &Matrix {
        &self.weights[layer]
    }

    #[inline]
    pub fn weights_t(&self, layer: usize) -> &Matrix {
        &self.weights_t[layer]
    }

    #[inline]
    pub fn biases(&self, layer: usize) -> &[f32] {
        &self.biases[layer]
    }

    /// Mutate one layer's weights and biases in place, then refresh its transpose.
    pub fn modify<F>(&mut self, layer: usize, f: F)
    where
        F: FnOnce(&mut Matrix, &mut [f32]),
    {
        f(&mut self.weights[layer], &mut self.biases[layer]);
        let w = &self.weights[layer];
        assert_eq!(
            w.cols(),
            self.biases[layer].len(),
            "modify must not reshape layer {layer}"
        );
        w.transpose_into(&mut self.weights_t[layer]);
    }

    /// Weight decay: `W ← W · (1 − lambda)` for every weight matrix.
    ///
    /// `lambda == 0` leaves the parameters untouched. Biases are not decayed.
    pub fn decay(&mut self, lambda: f32) {
        if lambda == 0.0 {
            return;
        }
        let coeff = 1.0 - lambda;
        for layer in 0..self.weights.len() {
            self.modify(layer, |w, _| w.scale(coeff));
        }
    }
}
