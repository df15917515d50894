//! Training progress reporting.
//!
//! The training loop calls a [`Reporter`] at fixed points:
//! - after every epoch, with an [`EpochReport`]
//! - after every epoch, once per layer, with [`WeightStats`] (only at [`Verbosity::Weights`])
//! - when the wall-clock budget stops training
//!
//! [`ConsoleReporter`] prints to stdout, gated by its [`Verbosity`]:
//!
//! ```text
//! epoch   3/20 | train acc 0.9120 ce 0.2841 | val acc 0.9035 ce 0.3012
//!   epoch time 412.337ms | lr 0.048112
//!   W[0] mean -0.0012 std 0.2187 min -0.9011 max 0.8874
//! ```

use std::time::Duration;

use crate::Matrix;
use crate::train::EpochReport;

/// How much the console reporter prints. Each level includes the ones below it.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    #[default]
    Silent,
    /// One progress line per epoch.
    Progress,
    /// Plus epoch duration and the current learning rate.
    Timing,
    /// Plus per-layer weight statistics.
    Weights,
}

/// Summary statistics of one weight matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightStats {
    pub mean: f32,
    pub std: f32,
    pub min: f32,
    pub max: f32,
}

impl WeightStats {
    /// Population statistics over every entry of `m`.
    pub fn of(m: &Matrix) -> Self {
        let data = m.as_slice();
        if data.is_empty() {
            return Self {
                mean: 0.0,
                std: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }
        let n = data.len() as f32;
        let mean = data.iter().sum::<f32>() / n;
        let var = data.iter().map(|&x| (x - mean) * (x - mean)).sum::<f32>() / n;
        let (min, max) = data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        Self {
            mean,
            std: var.sqrt(),
            min,
            max,
        }
    }
}

/// Hook points of the training loop. Every method defaults to doing nothing.
pub trait Reporter {
    fn epoch(&mut self, _report: &EpochReport, _total_epochs: usize) {}

    fn weights(&mut self, _layer: usize, _stats: &WeightStats) {}

    fn time_exceeded(&mut self, _elapsed: Duration) {}
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {}

/// Prints reports to stdout.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    verbosity: Verbosity,
}

impl ConsoleReporter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }
}

impl Reporter for ConsoleReporter {
    fn epoch(&mut self, report: &EpochReport, total_epochs: usize) {
        if self.verbosity < Verbosity::Progress {
            return;
        }
        println!(
            "epoch {:>3}/{} | train acc {:.4} ce {:.4} | val acc {:.4} ce {:.4}",
            report.epoch + 1,
            total_epochs,
            report.train.accuracy,
            report.train.cross_entropy,
            report.validation.accuracy,
            report.validation.cross_entropy,
        );
        if self.verbosity >= Verbosity::Timing {
            println!("  epoch time {:.3?} | lr {:.6}", report.duration, report.lr);
        }
    }

    fn weights(&mut self, layer: usize, stats: &WeightStats) {
        if self.verbosity < Verbosity::Weights {
            return;
        }
        println!(
            "  W[{layer}] mean {:.4} std {:.4} min {:.4} max {:.4}",
            stats.mean, stats.std, stats.min, stats.max
        );
    }

    fn time_exceeded(&mut self, elapsed: Duration) {
        if self.verbosity >= Verbosity::Progress {
            println!("time budget exceeded after {elapsed:.3?}");
        }
    }
}
