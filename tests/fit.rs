//! End-to-end training on a small synthetic problem.

use std::time::Duration;

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fjnet::{
    Activation, EpochReport, Error, FitConfig, LabeledData, LrSchedule, LrScheduler, Matrix,
    Network, NetworkBuilder, NullReporter, Optimizer, ParallelExecutor, Reporter, Scheduler,
    Shuffle, StopReason, TrainValSplit, Verbosity, WeightStats,
};

/// Three blobs in 2D, one per class.
fn blobs(per_class: usize, seed: u64) -> LabeledData {
    let centers = [[-1.0_f32, -1.0], [1.0, -1.0], [0.0, 1.0]];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut x = Matrix::zeros(3 * per_class, 2);
    let mut labels = Vec::with_capacity(3 * per_class);
    for (class, center) in centers.iter().enumerate() {
        for _ in 0..per_class {
            let r = labels.len();
            x.set(r, 0, center[0] + rng.gen_range(-0.3..0.3));
            x.set(r, 1, center[1] + rng.gen_range(-0.3..0.3));
            labels.push(class);
        }
    }
    LabeledData::new(x, labels).unwrap()
}

fn split() -> TrainValSplit {
    TrainValSplit::new(blobs(40, 0), blobs(20, 1)).unwrap()
}

fn network() -> Network {
    NetworkBuilder::new(2)
        .unwrap()
        .add_layer(16, Activation::ReLU)
        .unwrap()
        .add_layer(3, Activation::Softmax)
        .unwrap()
        .build_with_seed(0)
        .unwrap()
}

#[derive(Default)]
struct Recorder {
    epochs: Vec<EpochReport>,
    weight_calls: usize,
    time_exceeded: usize,
}

impl Reporter for Recorder {
    fn epoch(&mut self, report: &EpochReport, _total_epochs: usize) {
        self.epochs.push(report.clone());
    }

    fn weights(&mut self, _layer: usize, _stats: &WeightStats) {
        self.weight_calls += 1;
    }

    fn time_exceeded(&mut self, _elapsed: Duration) {
        self.time_exceeded += 1;
    }
}

#[test]
fn serial_and_parallel_fit_both_learn() {
    let data = split();
    let cfg = FitConfig {
        epochs: 40,
        batch_size: 16,
        lr: 0.1,
        optimizer: Optimizer::SgdMomentum { momentum: 0.9 },
        ..FitConfig::default()
    };

    let mut serial = network();
    let report = serial.fit(&data, &cfg).unwrap();
    assert!(report.last().unwrap().validation.accuracy > 0.95);

    let mut parallel = network();
    let exec = ParallelExecutor::new(4).unwrap();
    let report = parallel.parallel_fit(&data, &cfg, &exec).unwrap();
    assert!(report.last().unwrap().validation.accuracy > 0.95);
}

#[test]
fn reporter_sees_every_epoch_and_weight_stats() {
    let data = split();
    let mut net = network();
    let cfg = FitConfig {
        epochs: 3,
        verbosity: Verbosity::Weights,
        ..FitConfig::default()
    };
    let mut scheduler = Scheduler::new(LrSchedule::Constant).unwrap();
    let mut opt = cfg.optimizer.state(net.params()).unwrap();
    let mut rec = Recorder::default();

    let report = net
        .fit_with(&data, &cfg, &mut scheduler, &mut opt, &mut rec)
        .unwrap();
    assert_eq!(rec.epochs, report.epochs);
    assert_eq!(rec.weight_calls, 3 * 2);
    assert_eq!(rec.time_exceeded, 0);

    let cfg = FitConfig {
        epochs: 3,
        ..FitConfig::default()
    };
    let mut rec = Recorder::default();
    net.fit_with(&data, &cfg, &mut scheduler, &mut opt, &mut rec)
        .unwrap();
    assert_eq!(rec.weight_calls, 0);
}

#[test]
fn time_budget_is_reported_once() {
    let data = split();
    let mut net = network();
    let cfg = FitConfig {
        epochs: 5,
        time_budget: Some(Duration::ZERO),
        ..FitConfig::default()
    };
    let exec = ParallelExecutor::new(2).unwrap();
    let mut scheduler = Scheduler::new(cfg.lr_schedule).unwrap();
    let mut opt = cfg.optimizer.state(net.params()).unwrap();
    let mut rec = Recorder::default();

    let report = net
        .parallel_fit_with(&data, &cfg, &exec, &mut scheduler, &mut opt, &mut rec)
        .unwrap();
    assert_eq!(report.stop, StopReason::TimeBudget);
    assert_eq!(report.epochs.len(), 1);
    assert_eq!(rec.time_exceeded, 1);
}

#[test]
fn schedule_is_driven_by_samples_seen() {
    let data = split();
    let mut net = network();
    let cfg = FitConfig {
        epochs: 2,
        batch_size: 40,
        lr: 0.5,
        lr_schedule: LrSchedule::Step {
            gamma: 0.5,
            step_size: 120,
        },
        shuffle: Shuffle::None,
        ..FitConfig::default()
    };
    let report = net.fit(&data, &cfg).unwrap();

    // 120 rows per epoch in batches of 40: last steps are t = 80 and t = 200.
    assert_relative_eq!(report.epochs[0].lr, 0.5);
    assert_relative_eq!(report.epochs[1].lr, 0.25);

    let mut s = Scheduler::new(cfg.lr_schedule).unwrap();
    s.set_eta(cfg.lr);
    assert_relative_eq!(s.rate(200), report.epochs[1].lr);
}

#[test]
fn backprop_requires_a_softmax_head() {
    let data = split();
    let mut net = NetworkBuilder::from_sizes(&[2, 4, 3], &[Activation::Tanh, Activation::Sigmoid])
        .unwrap()
        .build_with_seed(0)
        .unwrap();
    let before = net.clone();
    // Non-zero decay and rate, so any decay or update before the failure would show.
    let cfg = FitConfig {
        lr: 0.5,
        weight_decay: 0.1,
        ..FitConfig::default()
    };
    let expected = Error::InvalidActivationForBackprop {
        found: Activation::Sigmoid,
    };

    assert_eq!(net.fit(&data, &cfg).unwrap_err(), expected);
    assert_eq!(net, before);

    let exec = ParallelExecutor::new(3).unwrap();
    assert_eq!(net.parallel_fit(&data, &cfg, &exec).unwrap_err(), expected);
    assert_eq!(net, before);
}

#[test]
fn weight_decay_shrinks_weights() {
    let data = split();
    let cfg = FitConfig {
        epochs: 5,
        lr: 0.0,
        weight_decay: 0.01,
        ..FitConfig::default()
    };
    let mut net = network();
    let before: f32 = net.params().weights(0).as_slice().iter().map(|w| w * w).sum();
    let mut scheduler = Scheduler::new(LrSchedule::Constant).unwrap();
    let mut opt = Optimizer::Sgd.state(net.params()).unwrap();
    net.fit_with(&data, &cfg, &mut scheduler, &mut opt, &mut NullReporter)
        .unwrap();
    let after: f32 = net.params().weights(0).as_slice().iter().map(|w| w * w).sum();

    // Four batches per epoch (120 rows in batches of 32), five epochs.
    let factor = 0.99_f32.powi(2 * 4 * 5);
    assert_relative_eq!(after, before * factor, max_relative = 1e-3);
}
