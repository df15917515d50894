//! Mini-batch SGD for feed-forward classifiers, with fork-join data parallelism.
//!
//! `fjnet` trains dense networks whose output layer is softmax, paired with cross-entropy.
//! Each mini-batch runs forward and backward either on the calling thread or split by rows
//! across a fixed pool of workers ([`ParallelExecutor`]); both paths produce the same
//! gradients up to floating-point summation order.
//!
//! # Panics vs `Result`
//!
//! - Low-level [`Matrix`] primitives `assert!` on shape misuse (programmer error).
//! - Entry points ([`Network::forward`], [`Network::backward`], [`Network::predict`],
//!   [`Network::fit`], [`Network::parallel_fit`], constructors) validate their inputs and
//!   return [`Result`].
//!
//! # Data layout and shapes
//!
//! - Scalars are `f32`; matrices are row-major, one sample per row.
//! - Layer `i` carries weights `W_i` of shape `(width_i, width_{i+1})` and bias `b_i` of length
//!   `width_{i+1}`, so a layer computes `act(A · W_i + b_i)`.
//! - Labels are class indices in `0..output_dim`.
//!
//! # MSRV
//!
//! This crate's minimum supported Rust version (MSRV) is specified in `Cargo.toml`.
//!
//! # Quick start
//!
//! ```rust
//! use fjnet::{Activation, FitConfig, LabeledData, NetworkBuilder, ParallelExecutor, TrainValSplit};
//!
//! # fn main() -> fjnet::Result<()> {
//! let xs = vec![
//!     vec![-1.0, -1.0],
//!     vec![-1.2, -0.8],
//!     vec![1.0, 1.0],
//!     vec![0.9, 1.1],
//! ];
//! let data = LabeledData::from_rows(&xs, &[0, 0, 1, 1])?;
//! let split = TrainValSplit::new(data.clone(), data)?;
//!
//! let mut net = NetworkBuilder::new(2)?
//!     .add_layer(8, Activation::Tanh)?
//!     .add_layer(2, Activation::Softmax)?
//!     .build_with_seed(0)?;
//!
//! let cfg = FitConfig {
//!     epochs: 50,
//!     batch_size: 2,
//!     lr: 0.1,
//!     ..FitConfig::default()
//! };
//! let report = net.fit(&split, &cfg)?;
//! assert_eq!(report.epochs.len(), 50);
//!
//! let executor = ParallelExecutor::new(2)?;
//! let _report = net.parallel_fit(&split, &cfg, &executor)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Driving a step yourself
//!
//! ```rust
//! use fjnet::{Activation, Matrix, NetworkBuilder, Optimize, Optimizer};
//!
//! # fn main() -> fjnet::Result<()> {
//! let mut net = NetworkBuilder::from_sizes(&[3, 8, 2], &[Activation::ReLU, Activation::Softmax])?
//!     .build_with_seed(0)?;
//! let mut opt = Optimizer::Sgd.state(net.params())?;
//!
//! let x = Matrix::from_rows(&[vec![0.1, -0.2, 0.3], vec![0.5, 0.0, -0.1]])?;
//! let labels = [1, 0];
//!
//! let pass = net.forward(&x)?;
//! let grads = net.backward(&pass, &labels)?;
//! net.params_mut().decay(1e-4);
//! opt.update(net.params_mut(), &grads, pass.activations(), x.rows(), 1e-2)?;
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod builder;
pub mod config;
pub mod data;
pub mod error;
pub mod loss;
pub(crate) mod matmul;
pub mod matrix;
pub mod metrics;
pub mod network;
pub mod optim;
pub mod parallel;
pub mod params;
pub mod report;
pub mod schedule;
pub mod topology;
pub mod train;

#[cfg(feature = "serde")]
pub mod serde_model;

pub use activation::Activation;
pub use builder::NetworkBuilder;
pub use config::FitConfig;
pub use data::{LabeledData, Shuffle, TrainValSplit};
pub use error::{Error, Result};
pub use matrix::Matrix;
pub use metrics::Stats;
pub use network::{ForwardPass, Gradients, Network};
pub use optim::{Optimize, Optimizer, OptimizerState};
pub use parallel::{ParallelExecutor, ParallelStep, Partial, Reduction};
pub use params::{Init, ParameterStore};
pub use report::{ConsoleReporter, NullReporter, Reporter, Verbosity, WeightStats};
pub use schedule::{LrSchedule, LrScheduler, Scheduler};
pub use topology::{LayerSpec, Topology};
pub use train::{EarlyStopping, EpochReport, FitReport, StopReason};
