//! Activation functions.
//!
//! A layer computes `z = A · W + b` and then applies its activation to the whole batch:
//! element-wise for most functions, row-wise for [`Activation::Softmax`].
//!
//! The forward pass keeps only post-activation outputs `y`, and every derivative here is
//! expressed in terms of `y`. That is what lets the forward engine evaluate the derivative
//! on the output buffer itself instead of keeping `z` around.

use crate::{Error, Matrix, Result};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    Identity,
    Sigmoid,
    Tanh,
    ReLU,
    LeakyReLU { alpha: f32 },
    /// Row-wise softmax. Required on the output layer for backprop.
    Softmax,
}

impl Activation {
    /// Validate activation parameters.
    pub fn validate(self) -> Result<()> {
        if let Activation::LeakyReLU { alpha } = self {
            if !(alpha.is_finite() && alpha >= 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "leaky ReLU alpha must be finite and >= 0, got {alpha}"
                )));
            }
        }
        Ok(())
    }

    /// Apply the activation in place to a `(batch, width)` buffer.
    pub fn apply(self, m: &mut Matrix) {
        match self {
            Activation::Identity => {}
            Activation::Sigmoid => m.map_inplace(sigmoid),
            Activation::Tanh => m.map_inplace(f32::tanh),
            Activation::ReLU => m.map_inplace(|x| x.max(0.0)),
            Activation::LeakyReLU { alpha } => {
                m.map_inplace(|x| if x > 0.0 { x } else { alpha * x })
            }
            Activation::Softmax => {
                for r in 0..m.rows() {
                    softmax_in_place(m.row_mut(r));
                }
            }
        }
    }

    /// Overwrite an output buffer `y` with `d act / d z` evaluated through `y`.
    ///
    /// Softmax has no element-wise derivative; its diagonal `y (1 - y)` is used, which is
    /// only reached when softmax sits on a hidden layer.
    pub fn derivative_from_output(self, y: &mut Matrix) {
        y.map_inplace(|v| self.grad_from_output(v));
    }

    #[inline]
    pub(crate) fn grad_from_output(self, y: f32) -> f32 {
        match self {
            Activation::Identity => 1.0,
            Activation::Sigmoid | Activation::Softmax => y * (1.0 - y),
            Activation::Tanh => 1.0 - y * y,
            Activation::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyReLU { alpha } => {
                if y > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
        }
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

fn softmax_in_place(row: &mut [f32]) {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0_f32;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }
    let inv = 1.0 / sum;
    for x in row.iter_mut() {
        *x *= inv;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaky_relu_alpha_must_be_finite_and_non_negative() {
        assert!(
            Activation::LeakyReLU { alpha: f32::NAN }
                .validate()
                .is_err()
        );
        assert!(Activation::LeakyReLU { alpha: -0.1 }.validate().is_err());
        assert!(Activation::LeakyReLU { alpha: 0.1 }.validate().is_ok());
    }

    #[test]
    fn softmax_rows_sum_to_one_and_survive_large_logits() {
        let mut m = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 1000.0, 1000.0, 1000.0]).unwrap();
        Activation::Softmax.apply(&mut m);
        for r in 0..2 {
            let sum: f32 = m.row(r).iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
            assert!(m.row(r).iter().all(|v| v.is_finite()));
        }
        assert!((m.get(1, 0) - 1.0 / 3.0).abs() < 1e-6);
        assert!(m.get(0, 2) > m.get(0, 1));
    }

    #[test]
    fn derivatives_are_taken_from_outputs() {
        let mut y = Matrix::from_vec(1, 2, vec![0.5, -0.2]).unwrap();
        Activation::Tanh.derivative_from_output(&mut y);
        assert!((y.get(0, 0) - 0.75).abs() < 1e-6);
        assert!((y.get(0, 1) - 0.96).abs() < 1e-6);

        let mut y = Matrix::from_vec(1, 2, vec![0.0, 2.0]).unwrap();
        Activation::ReLU.derivative_from_output(&mut y);
        assert_eq!(y.as_slice(), &[0.0, 1.0]);

        let act = Activation::LeakyReLU { alpha: 0.1 };
        assert_eq!(act.grad_from_output(-0.2), 0.1);
        assert_eq!(Activation::Sigmoid.grad_from_output(0.5), 0.25);
    }

    #[test]
    fn sigmoid_basic_values() {
        let mut m = Matrix::from_vec(1, 3, vec![0.0, 10.0, -10.0]).unwrap();
        Activation::Sigmoid.apply(&mut m);
        assert!((m.get(0, 0) - 0.5).abs() < 1e-6);
        assert!(m.get(0, 1) > 0.999);
        assert!(m.get(0, 2) < 0.001);
    }
}
