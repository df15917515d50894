//! The network and its forward/backward engines.
//!
//! Batched computation over row-major matrices:
//! - forward: `A_{i+1} = act_{i+1}(A_i · W_i + b_i)`, keeping every activation and the
//!   derivative of every non-final layer evaluated on its own output
//! - backward: starts from `softmax_output - one_hot(labels)` and chains
//!   `G_{i-1} = (G_i · W_iᵗ) ⊙ D_{i-1}`
//!
//! Both engines read parameters only; updates happen in [`crate::optim`] and
//! [`ParameterStore::decay`].

use crate::{Activation, Error, LabeledData, Matrix, ParameterStore, Result, Stats, Topology, loss};

#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    topology: Topology,
    params: ParameterStore,
}

/// Buffers produced by one forward pass.
///
/// - `activations`: `L` matrices, `activations[0]` is the input batch
/// - `derivatives`: `L - 1` entries, `derivatives[i]` belongs to `activations[i + 1]`; the last
///   entry is `None` because the output layer's gradient comes from the loss shortcut
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardPass {
    activations: Vec<Matrix>,
    derivatives: Vec<Option<Matrix>>,
}

/// Gradients produced by one backward pass (overwrite semantics: a fresh value per pass).
///
/// `deltas[i]` has the shape of `activations[i + 1]` (`batch × width_{i+1}`) and holds
/// `dL/dz` for that layer; `biases[i]` is its column mean.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    deltas: Vec<Matrix>,
    biases: Vec<Vec<f32>>,
}

impl Network {
    /// Pair a topology with parameters, checking every parameter shape against it.
    pub fn from_parts(topology: Topology, params: ParameterStore) -> Result<Self> {
        if params.num_layers() != topology.num_layers() - 1 {
            return Err(Error::ShapeMismatch {
                context: "parameterized layer count",
                expected: topology.num_layers() - 1,
                got: params.num_layers(),
            });
        }
        for i in 0..params.num_layers() {
            let w = params.weights(i);
            let (rows, cols) = (topology.layer(i).width, topology.layer(i + 1).width);
            if w.rows() != rows {
                return Err(Error::ShapeMismatch {
                    context: "weight rows vs layer width",
                    expected: rows,
                    got: w.rows(),
                });
            }
            if w.cols() != cols {
                return Err(Error::ShapeMismatch {
                    context: "weight cols vs next layer width",
                    expected: cols,
                    got: w.cols(),
                });
            }
        }
        Ok(Self { topology, params })
    }

    #[inline]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    #[inline]
    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    #[inline]
    pub fn params_mut(&mut self) -> &mut ParameterStore {
        &mut self.params
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.topology.input_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.topology.output_dim()
    }

    fn check_input(&self, input: &Matrix) -> Result<()> {
        if input.rows() == 0 {
            return Err(Error::InvalidData("input batch must not be empty".to_owned()));
        }
        if input.cols() != self.input_dim() {
            return Err(Error::ShapeMismatch {
                context: "input cols vs network input_dim",
                expected: self.input_dim(),
                got: input.cols(),
            });
        }
        Ok(())
    }

    fn check_labels(&self, rows: usize, labels: &[usize]) -> Result<()> {
        if labels.len() != rows {
            return Err(Error::ShapeMismatch {
                context: "label count vs batch rows",
                expected: rows,
                got: labels.len(),
            });
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= self.output_dim()) {
            return Err(Error::InvalidData(format!(
                "label {bad} out of range for {} output classes",
                self.output_dim()
            )));
        }
        Ok(())
    }

    /// Every buffer of `pass` must match the layer widths and the batch row count.
    fn check_pass_widths(&self, pass: &ForwardPass) -> Result<()> {
        let rows = pass.batch_rows();
        for (spec, a) in self.topology.layers().iter().zip(&pass.activations) {
            if a.cols() != spec.width {
                return Err(Error::ShapeMismatch {
                    context: "forward pass activation cols vs layer width",
                    expected: spec.width,
                    got: a.cols(),
                });
            }
            if a.rows() != rows {
                return Err(Error::ShapeMismatch {
                    context: "forward pass activation rows vs batch rows",
                    expected: rows,
                    got: a.rows(),
                });
            }
        }
        for (i, d) in pass.derivatives.iter().enumerate() {
            if let Some(d) = d {
                if d.shape() != pass.activations[i + 1].shape() {
                    return Err(Error::ShapeMismatch {
                        context: "forward pass derivative cols vs activation cols",
                        expected: pass.activations[i + 1].cols(),
                        got: d.cols(),
                    });
                }
            }
        }
        Ok(())
    }

    /// `act_{i+1}(a · W_i + b_i)`
    fn layer_output(&self, i: usize, a: &Matrix) -> Matrix {
        let mut z = a.matmul(self.params.weights(i));
        z.add_row_broadcast(self.params.biases(i));
        self.topology.layer(i + 1).activation.apply(&mut z);
        z
    }

    /// Forward pass over a batch, keeping every buffer the backward pass needs.
    pub fn forward(&self, input: &Matrix) -> Result<ForwardPass> {
        self.check_input(input)?;

        let n = self.params.num_layers();
        let mut activations = Vec::with_capacity(n + 1);
        let mut derivatives = Vec::with_capacity(n);
        activations.push(input.clone());

        for i in 0..n {
            let out = self.layer_output(i, &activations[i]);
            if i + 1 < n {
                let mut d = out.clone();
                self.topology
                    .layer(i + 1)
                    .activation
                    .derivative_from_output(&mut d);
                derivatives.push(Some(d));
            } else {
                derivatives.push(None);
            }
            activations.push(out);
        }

        Ok(ForwardPass {
            activations,
            derivatives,
        })
    }

    /// Backward pass for softmax + cross-entropy.
    ///
    /// Fails with [`Error::InvalidActivationForBackprop`] before touching anything when the
    /// output layer is not softmax.
    pub fn backward(&self, pass: &ForwardPass, labels: &[usize]) -> Result<Gradients> {
        let found = self.topology.output_activation();
        if found != Activation::Softmax {
            return Err(Error::InvalidActivationForBackprop { found });
        }
        let n = self.params.num_layers();
        if pass.activations.len() != n + 1 || pass.derivatives.len() != n {
            return Err(Error::ShapeMismatch {
                context: "forward pass layer count",
                expected: n + 1,
                got: pass.activations.len(),
            });
        }
        self.check_pass_widths(pass)?;
        self.check_labels(pass.output().rows(), labels)?;

        // Collected output-first, reversed at the end.
        let mut deltas = Vec::with_capacity(n);
        let mut upstream = loss::softmax_cross_entropy_delta(pass.output(), labels);

        for i in (1..n).rev() {
            let d = pass.derivatives[i - 1].as_ref().ok_or_else(|| {
                Error::InvalidData(format!(
                    "forward pass is missing the derivative of hidden layer {i}"
                ))
            })?;
            let mut g = upstream.matmul(self.params.weights_t(i));
            g.hadamard_assign(d);
            deltas.push(std::mem::replace(&mut upstream, g));
        }
        deltas.push(upstream);
        deltas.reverse();

        let biases = deltas.iter().map(column_means).collect();

        Ok(Gradients { deltas, biases })
    }

    /// Network output for `data` without keeping intermediates.
    pub fn predict(&self, data: &Matrix) -> Result<Matrix> {
        self.check_input(data)?;
        let mut out = self.layer_output(0, data);
        for i in 1..self.params.num_layers() {
            out = self.layer_output(i, &out);
        }
        Ok(out)
    }

    /// Statistics of the network's predictions on `data`.
    pub fn evaluate(&self, data: &LabeledData) -> Result<Stats> {
        let predictions = self.predict(data.features())?;
        self.check_labels(predictions.rows(), data.labels())?;
        Ok(Stats::compute(&predictions, data.labels()))
    }
}

fn column_means(m: &Matrix) -> Vec<f32> {
    let inv = 1.0 / m.rows() as f32;
    m.column_sums().into_iter().map(|s| s * inv).collect()
}

impl ForwardPass {
    /// Assemble a pass from externally computed buffers.
    pub(crate) fn from_parts(activations: Vec<Matrix>, derivatives: Vec<Option<Matrix>>) -> Self {
        Self {
            activations,
            derivatives,
        }
    }

    #[inline]
    pub fn activations(&self) -> &[Matrix] {
        &self.activations
    }

    #[inline]
    pub fn derivatives(&self) -> &[Option<Matrix>] {
        &self.derivatives
    }

    /// Final-layer activations.
    #[inline]
    pub fn output(&self) -> &Matrix {
        &self.activations[self.activations.len() - 1]
    }

    /// Rows in the batch.
    #[inline]
    pub fn batch_rows(&self) -> usize {
        self.activations[0].rows()
    }
}

impl Gradients {
    pub(crate) fn from_parts(deltas: Vec<Matrix>, biases: Vec<Vec<f32>>) -> Self {
        Self { deltas, biases }
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.deltas.len()
    }

    #[inline]
    pub fn deltas(&self) -> &[Matrix] {
        &self.deltas
    }

    #[inline]
    pub fn delta(&self, layer: usize) -> &Matrix {
        &self.deltas[layer]
    }

    #[inline]
    pub fn bias(&self, layer: usize) -> &[f32] {
        &self.biases[layer]
    }

    /// `A_iᵗ · G_i / batch_rows`: the mean loss gradient w.r.t. `W_i`.
    pub fn weight_gradient(&self, activations: &[Matrix], layer: usize) -> Matrix {
        let a = &activations[layer];
        let mut g = a.t_matmul(&self.deltas[layer]);
        g.scale(1.0 / a.rows() as f32);
        g
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NetworkBuilder;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn assert_close(analytic: f32, numeric: f32, abs_tol: f32, rel_tol: f32) {
        let diff = (analytic - numeric).abs();
        let scale = analytic.abs().max(numeric.abs()).max(1.0);
        assert!(
            diff <= abs_tol || diff / scale <= rel_tol,
            "analytic={analytic} numeric={numeric} diff={diff}"
        );
    }

    fn random_batch(rows: usize, cols: usize, classes: usize, seed: u64) -> (Matrix, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = Matrix::zeros(rows, cols);
        x.map_inplace(|_| rng.gen_range(-1.0..1.0));
        let labels = (0..rows).map(|_| rng.gen_range(0..classes)).collect();
        (x, labels)
    }

    #[test]
    fn forward_returns_one_buffer_per_layer() {
        let net = NetworkBuilder::new(4)
            .unwrap()
            .add_layer(6, Activation::Tanh)
            .unwrap()
            .add_layer(5, Activation::ReLU)
            .unwrap()
            .add_layer(3, Activation::Softmax)
            .unwrap()
            .build_with_seed(1)
            .unwrap();
        let (x, _) = random_batch(7, 4, 3, 0);
        let pass = net.forward(&x).unwrap();

        assert_eq!(pass.activations().len(), 4);
        assert_eq!(pass.derivatives().len(), 3);
        assert!(pass.derivatives()[2].is_none());
        assert!(pass.derivatives()[..2].iter().all(Option::is_some));
        assert_eq!(pass.activations()[0], x);
        assert_eq!(pass.output().shape(), (7, 3));
        assert_eq!(pass.derivatives()[1].as_ref().unwrap().shape(), (7, 5));
        assert_eq!(*pass.output(), net.predict(&x).unwrap());
    }

    #[test]
    fn forward_rejects_wrong_input_width() {
        let net = NetworkBuilder::from_sizes(&[3, 2], &[Activation::Softmax])
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        let err = net.forward(&Matrix::zeros(2, 4)).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 3, got: 4, .. }));
        assert!(net.forward(&Matrix::zeros(0, 3)).is_err());
    }

    #[test]
    fn zero_network_gradient_is_uniform_minus_one_hot() {
        let net = NetworkBuilder::from_sizes(&[2, 3], &[Activation::Softmax])
            .unwrap()
            .build_zeroed()
            .unwrap();
        let x = Matrix::from_vec(4, 2, vec![0.5, -1.0, 2.0, 0.0, -0.3, 0.7, 1.0, 1.0]).unwrap();
        let labels = [0, 1, 2, 0];

        let pass = net.forward(&x).unwrap();
        let grads = net.backward(&pass, &labels).unwrap();

        let g = grads.delta(0);
        assert_eq!(g.shape(), (4, 3));
        for (r, &label) in labels.iter().enumerate() {
            for c in 0..3 {
                let expected = 1.0 / 3.0 - if c == label { 1.0 } else { 0.0 };
                assert!((g.get(r, c) - expected).abs() < 1e-6);
            }
        }
        let col_means = column_means(g);
        assert_eq!(grads.bias(0), col_means.as_slice());
        assert!((grads.bias(0)[0] - (1.0 / 3.0 - 0.5)).abs() < 1e-6);
    }

    #[test]
    fn backward_requires_softmax_output() {
        let net = NetworkBuilder::from_sizes(&[2, 4, 3], &[Activation::Tanh, Activation::Sigmoid])
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        let (x, labels) = random_batch(5, 2, 3, 2);
        let pass = net.forward(&x).unwrap();
        let err = net.backward(&pass, &labels).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidActivationForBackprop {
                found: Activation::Sigmoid
            }
        );
    }

    #[test]
    fn backward_rejects_pass_from_a_wider_network() {
        let net = NetworkBuilder::from_sizes(&[2, 4, 3], &[Activation::Tanh, Activation::Softmax])
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        let other = NetworkBuilder::from_sizes(&[2, 6, 3], &[Activation::Tanh, Activation::Softmax])
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        let (x, labels) = random_batch(5, 2, 3, 1);
        let pass = other.forward(&x).unwrap();
        let err = net.backward(&pass, &labels).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 4, got: 6, .. }));
    }

    #[test]
    fn backward_rejects_out_of_range_labels() {
        let net = NetworkBuilder::from_sizes(&[2, 3], &[Activation::Softmax])
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        let (x, _) = random_batch(2, 2, 3, 0);
        let pass = net.forward(&x).unwrap();
        assert!(net.backward(&pass, &[0, 3]).is_err());
        assert!(net.backward(&pass, &[0]).is_err());
    }

    #[test]
    fn backward_matches_numeric_gradients() {
        let mut net = NetworkBuilder::from_sizes(&[3, 5, 4], &[Activation::Tanh, Activation::Softmax])
            .unwrap()
            .build_with_seed(11)
            .unwrap();
        let (x, labels) = random_batch(6, 3, 4, 5);

        let pass = net.forward(&x).unwrap();
        let grads = net.backward(&pass, &labels).unwrap();

        let loss = |net: &Network| -> f32 {
            let p = net.predict(&x).unwrap();
            crate::loss::cross_entropy(&p, &labels)
        };

        let eps = 1e-2_f32;
        let (abs_tol, rel_tol) = (1e-3_f32, 1e-3_f32);

        for layer in 0..net.params().num_layers() {
            let analytic = grads.weight_gradient(pass.activations(), layer);
            let (rows, cols) = net.params().weights(layer).shape();
            for r in 0..rows {
                for c in 0..cols {
                    let orig = net.params().weights(layer).get(r, c);
                    net.params_mut().modify(layer, |w, _| w.set(r, c, orig + eps));
                    let plus = loss(&net);
                    net.params_mut().modify(layer, |w, _| w.set(r, c, orig - eps));
                    let minus = loss(&net);
                    net.params_mut().modify(layer, |w, _| w.set(r, c, orig));

                    let numeric = (plus - minus) / (2.0 * eps);
                    assert_close(analytic.get(r, c), numeric, abs_tol, rel_tol);
                }
            }

            for k in 0..cols {
                let orig = net.params().biases(layer)[k];
                net.params_mut().modify(layer, |_, b| b[k] = orig + eps);
                let plus = loss(&net);
                net.params_mut().modify(layer, |_, b| b[k] = orig - eps);
                let minus = loss(&net);
                net.params_mut().modify(layer, |_, b| b[k] = orig);

                let numeric = (plus - minus) / (2.0 * eps);
                assert_close(grads.bias(layer)[k], numeric, abs_tol, rel_tol);
            }
        }
    }

    #[test]
    fn from_parts_rejects_params_for_other_topology() {
        let a = NetworkBuilder::from_sizes(&[2, 3], &[Activation::Softmax])
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        let b = NetworkBuilder::from_sizes(&[2, 4], &[Activation::Softmax])
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        assert!(Network::from_parts(a.topology().clone(), b.params().clone()).is_err());
    }
}
