//! Optimizers.
//!
//! An optimizer turns one batch's [`Gradients`] into an in-place update of the
//! [`ParameterStore`]. It is called exactly once per batch, on the training thread, after
//! weight decay.
//!
//! Design notes:
//! - Optimizer *state* (momentum/Adam moments) lives outside the network.
//! - The training loop owns the optimizer state and reuses it across steps.
//! - The weight gradient is `A_iᵗ · G_i / batch_size`; the bias gradient is the per-layer
//!   column mean already stored in `Gradients`.

use crate::{Error, Gradients, Matrix, ParameterStore, Result};

/// Weight-update rule plugged into the training loop.
pub trait Optimize {
    /// Apply one update.
    ///
    /// `activations` are the forward buffers of the same batch (`activations[i]` feeds layer
    /// `i`); `batch_size` is the number of rows they hold.
    fn update(
        &mut self,
        params: &mut ParameterStore,
        grads: &Gradients,
        activations: &[Matrix],
        batch_size: usize,
        lr: f32,
    ) -> Result<()>;
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
/// Optimizer choice for training.
pub enum Optimizer {
    /// Plain SGD.
    #[default]
    Sgd,
    /// SGD with momentum.
    SgdMomentum { momentum: f32 },
    /// Adam (bias-corrected).
    Adam { beta1: f32, beta2: f32, eps: f32 },
}

impl Optimizer {
    /// Validate optimizer hyperparameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Optimizer::Sgd => Ok(()),
            Optimizer::SgdMomentum { momentum } => {
                if !(momentum.is_finite() && (0.0..1.0).contains(&momentum)) {
                    return Err(Error::InvalidConfig(format!(
                        "momentum must be finite and in [0,1), got {momentum}"
                    )));
                }
                Ok(())
            }
            Optimizer::Adam { beta1, beta2, eps } => {
                if !(beta1.is_finite() && (0.0..1.0).contains(&beta1)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta1 must be finite and in [0,1), got {beta1}"
                    )));
                }
                if !(beta2.is_finite() && (0.0..1.0).contains(&beta2)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta2 must be finite and in [0,1), got {beta2}"
                    )));
                }
                if !(eps.is_finite() && eps > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "adam eps must be finite and > 0, got {eps}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Allocate optimizer state shaped like `params`.
    pub fn state(self, params: &ParameterStore) -> Result<OptimizerState> {
        self.validate()?;

        match self {
            Optimizer::Sgd => Ok(OptimizerState::Sgd),
            Optimizer::SgdMomentum { momentum } => {
                let (vw, vb) = zeros_like(params);
                Ok(OptimizerState::SgdMomentum {
                    momentum,
                    v_weights: vw,
                    v_biases: vb,
                })
            }
            Optimizer::Adam { beta1, beta2, eps } => {
                let (mw, mb) = zeros_like(params);
                let (vw, vb) = zeros_like(params);
                Ok(OptimizerState::Adam {
                    beta1,
                    beta2,
                    eps,
                    beta1_pow: 1.0,
                    beta2_pow: 1.0,
                    m_weights: mw,
                    m_biases: mb,
                    v_weights: vw,
                    v_biases: vb,
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
/// Owned optimizer state.
pub enum OptimizerState {
    Sgd,
    SgdMomentum {
        momentum: f32,
        v_weights: Vec<Matrix>,
        v_biases: Vec<Vec<f32>>,
    },
    Adam {
        beta1: f32,
        beta2: f32,
        eps: f32,
        beta1_pow: f32,
        beta2_pow: f32,
        m_weights: Vec<Matrix>,
        m_biases: Vec<Vec<f32>>,
        v_weights: Vec<Matrix>,
        v_biases: Vec<Vec<f32>>,
    },
}

impl Optimize for OptimizerState {
    fn update(
        &mut self,
        params: &mut ParameterStore,
        grads: &Gradients,
        activations: &[Matrix],
        batch_size: usize,
        lr: f32,
    ) -> Result<()> {
        let layers = params.num_layers();
        if grads.num_layers() != layers {
            return Err(Error::ShapeMismatch {
                context: "gradient layer count",
                expected: layers,
                got: grads.num_layers(),
            });
        }
        if activations.len() != layers + 1 {
            return Err(Error::ShapeMismatch {
                context: "activation buffer count",
                expected: layers + 1,
                got: activations.len(),
            });
        }
        if batch_size != activations[0].rows() {
            return Err(Error::ShapeMismatch {
                context: "batch size vs activation rows",
                expected: activations[0].rows(),
                got: batch_size,
            });
        }

        if let OptimizerState::Adam {
            beta1,
            beta2,
            beta1_pow,
            beta2_pow,
            ..
        } = self
        {
            *beta1_pow *= *beta1;
            *beta2_pow *= *beta2;
        }

        for layer in 0..layers {
            let mut dw = grads.weight_gradient(activations, layer);
            let mut db = grads.bias(layer).to_vec();

            match self {
                OptimizerState::Sgd => {}
                OptimizerState::SgdMomentum {
                    momentum,
                    v_weights,
                    v_biases,
                } => {
                    momentum_step(*momentum, v_weights[layer].as_mut_slice(), dw.as_mut_slice());
                    momentum_step(*momentum, &mut v_biases[layer], &mut db);
                }
                OptimizerState::Adam {
                    beta1,
                    beta2,
                    eps,
                    beta1_pow,
                    beta2_pow,
                    m_weights,
                    m_biases,
                    v_weights,
                    v_biases,
                } => {
                    let adam = AdamCoeffs {
                        beta1: *beta1,
                        beta2: *beta2,
                        eps: *eps,
                        corr1: 1.0 - *beta1_pow,
                        corr2: 1.0 - *beta2_pow,
                    };
                    adam.step(
                        m_weights[layer].as_mut_slice(),
                        v_weights[layer].as_mut_slice(),
                        dw.as_mut_slice(),
                    );
                    adam.step(&mut m_biases[layer], &mut v_biases[layer], &mut db);
                }
            }

            params.modify(layer, |w, b| {
                sgd_step(w.as_mut_slice(), dw.as_slice(), lr);
                sgd_step(b, &db, lr);
            });
        }
        Ok(())
    }
}

#[inline]
fn sgd_step(params: &mut [f32], update: &[f32], lr: f32) {
    debug_assert_eq!(params.len(), update.len());
    for (p, &u) in params.iter_mut().zip(update) {
        *p -= lr * u;
    }
}

/// `v = momentum * v + g`, then overwrite `g` with `v`.
#[inline]
fn momentum_step(momentum: f32, v: &mut [f32], g: &mut [f32]) {
    debug_assert_eq!(v.len(), g.len());
    for (vi, gi) in v.iter_mut().zip(g.iter_mut()) {
        *vi = momentum * *vi + *gi;
        *gi = *vi;
    }
}

struct AdamCoeffs {
    beta1: f32,
    beta2: f32,
    eps: f32,
    corr1: f32,
    corr2: f32,
}

impl AdamCoeffs {
    /// Update the moments and overwrite `g` with the bias-corrected Adam direction.
    #[inline]
    fn step(&self, m: &mut [f32], v: &mut [f32], g: &mut [f32]) {
        for ((mi, vi), gi) in m.iter_mut().zip(v.iter_mut()).zip(g.iter_mut()) {
            *mi = self.beta1 * *mi + (1.0 - self.beta1) * *gi;
            *vi = self.beta2 * *vi + (1.0 - self.beta2) * (*gi * *gi);
            let m_hat = *mi / self.corr1;
            let v_hat = *vi / self.corr2;
            *gi = m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

fn zeros_like(params: &ParameterStore) -> (Vec<Matrix>, Vec<Vec<f32>>) {
    let ws = (0..params.num_layers())
        .map(|i| {
            let (r, c) = params.weights(i).shape();
            Matrix::zeros(r, c)
        })
        .collect();
    let bs = (0..params.num_layers())
        .map(|i| vec![0.0; params.biases(i).len()])
        .collect();
    (ws, bs)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Activation, Network, NetworkBuilder};

    /// 1 → 2 softmax network with `w = [[1, -1]]`, `b = [0, 0]`, and one batch row `x = 1`
    /// labeled 0.
    fn tiny() -> (Network, Matrix, Vec<usize>) {
        let mut net = NetworkBuilder::from_sizes(&[1, 2], &[Activation::Softmax])
            .unwrap()
            .build_zeroed()
            .unwrap();
        net.params_mut().modify(0, |w, _| {
            w.set(0, 0, 1.0);
            w.set(0, 1, -1.0);
        });
        let x = Matrix::from_vec(1, 1, vec![1.0]).unwrap();
        (net, x, vec![0])
    }

    #[test]
    fn optimizer_validation_rejects_bad_hyperparams() {
        assert!(Optimizer::SgdMomentum { momentum: 1.0 }.validate().is_err());
        assert!(
            Optimizer::SgdMomentum { momentum: -0.1 }
                .validate()
                .is_err()
        );
        assert!(
            Optimizer::Adam {
                beta1: 1.0,
                beta2: 0.999,
                eps: 1e-8
            }
            .validate()
            .is_err()
        );
        assert!(
            Optimizer::Adam {
                beta1: 0.9,
                beta2: 0.999,
                eps: 0.0
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn sgd_moves_against_the_gradient() {
        let (mut net, x, labels) = tiny();
        let pass = net.forward(&x).unwrap();
        let grads = net.backward(&pass, &labels).unwrap();
        let dw = grads.weight_gradient(pass.activations(), 0);
        let before = net.params().clone();

        let mut opt = Optimizer::Sgd.state(net.params()).unwrap();
        opt.update(net.params_mut(), &grads, pass.activations(), 1, 0.5)
            .unwrap();

        for c in 0..2 {
            let expected = before.weights(0).get(0, c) - 0.5 * dw.get(0, c);
            assert!((net.params().weights(0).get(0, c) - expected).abs() < 1e-6);
            let expected_b = before.biases(0)[c] - 0.5 * grads.bias(0)[c];
            assert!((net.params().biases(0)[c] - expected_b).abs() < 1e-6);
        }
        assert_eq!(net.params().weights(0).transpose(), *net.params().weights_t(0));
    }

    #[test]
    fn zero_learning_rate_leaves_params_unchanged() {
        let (mut net, x, labels) = tiny();
        let pass = net.forward(&x).unwrap();
        let grads = net.backward(&pass, &labels).unwrap();
        let before = net.params().clone();

        let mut opt = Optimizer::Sgd.state(net.params()).unwrap();
        opt.update(net.params_mut(), &grads, pass.activations(), 1, 0.0)
            .unwrap();
        assert_eq!(*net.params(), before);
    }

    #[test]
    fn sgd_momentum_updates_like_sgd_on_first_step() {
        let (mut a, x, labels) = tiny();
        let mut b = a.clone();
        let pass = a.forward(&x).unwrap();
        let grads = a.backward(&pass, &labels).unwrap();

        let mut sgd = Optimizer::Sgd.state(a.params()).unwrap();
        let mut mom = Optimizer::SgdMomentum { momentum: 0.9 }
            .state(b.params())
            .unwrap();
        sgd.update(a.params_mut(), &grads, pass.activations(), 1, 0.1)
            .unwrap();
        mom.update(b.params_mut(), &grads, pass.activations(), 1, 0.1)
            .unwrap();
        assert_eq!(a.params(), b.params());
    }

    #[test]
    fn adam_first_step_has_unit_magnitude_direction() {
        let (mut net, x, labels) = tiny();
        let pass = net.forward(&x).unwrap();
        let grads = net.backward(&pass, &labels).unwrap();
        let before = net.params().clone();

        let mut opt = Optimizer::Adam {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
        .state(net.params())
        .unwrap();
        opt.update(net.params_mut(), &grads, pass.activations(), 1, 0.1)
            .unwrap();

        // First bias-corrected Adam step is lr * sign(g) for every non-zero gradient.
        for c in 0..2 {
            let moved = before.weights(0).get(0, c) - net.params().weights(0).get(0, c);
            assert!((moved.abs() - 0.1).abs() < 1e-4);
        }
    }

    #[test]
    fn update_rejects_mismatched_batch_size() {
        let (mut net, x, labels) = tiny();
        let pass = net.forward(&x).unwrap();
        let grads = net.backward(&pass, &labels).unwrap();
        let mut opt = Optimizer::Sgd.state(net.params()).unwrap();
        assert!(
            opt.update(net.params_mut(), &grads, pass.activations(), 4, 0.1)
                .is_err()
        );
    }
}
