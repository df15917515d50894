//! The training loop.
//!
//! One call to [`Network::fit`] (or [`Network::parallel_fit`]) runs:
//!
//! ```text
//! for epoch:
//!     shuffle train rows, rebatch
//!     for batch:
//!         lr = scheduler.rate(t)
//!         forward, backward          (serial, or fork-join across the executor's workers)
//!         decay(weight_decay)
//!         optimizer.update(lr)
//!         t += batch_size
//!     validate, report
//!     stop on early-stopping patience or time budget
//! ```
//!
//! `t` counts samples, not epochs. Early stopping and the time budget are successful
//! terminations and are reported through [`StopReason`].

use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::optim::Optimize;
use crate::report::{ConsoleReporter, Reporter, WeightStats};
use crate::schedule::{LrScheduler, Scheduler};
use crate::{
    Error, FitConfig, ForwardPass, Gradients, LabeledData, Network, ParallelExecutor, Result,
    Shuffle, Stats, TrainValSplit, Verbosity,
};

/// Statistics of one finished epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Mean of the per-batch training stats.
    pub train: Stats,
    pub validation: Stats,
    /// Rate used for the last batch of the epoch.
    pub lr: f32,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Ran every configured epoch.
    Completed,
    /// Validation cross-entropy stopped improving after `best_epoch`.
    EarlyStopped { best_epoch: usize },
    /// Wall-clock budget reached at an epoch boundary.
    TimeBudget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub epochs: Vec<EpochReport>,
    pub stop: StopReason,
}

impl FitReport {
    #[inline]
    pub fn last(&self) -> Option<&EpochReport> {
        self.epochs.last()
    }
}

/// Patience tracker over validation cross-entropy.
///
/// Stops when the current epoch is exactly `patience` epochs past the best one. A patience of
/// zero never stops.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best_ce: f32,
    best_epoch: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_ce: f32::INFINITY,
            best_epoch: 0,
        }
    }

    #[inline]
    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    /// Record `cross_entropy` for `epoch`; returns `true` when training should stop.
    pub fn observe(&mut self, epoch: usize, cross_entropy: f32) -> bool {
        if self.patience == 0 {
            return false;
        }
        if cross_entropy < self.best_ce {
            self.best_ce = cross_entropy;
            self.best_epoch = epoch;
        }
        epoch - self.best_epoch == self.patience
    }
}

/// Where the per-batch forward/backward and the validation pass run.
enum Engine<'a> {
    Serial,
    Parallel {
        executor: &'a ParallelExecutor,
        /// Validation partitions, split once per call.
        validation: Vec<LabeledData>,
    },
}

impl Engine<'_> {
    fn step(&self, net: &Network, batch: &LabeledData) -> Result<(ForwardPass, Gradients, Stats)> {
        match self {
            Engine::Serial => {
                let pass = net.forward(batch.features())?;
                let grads = net.backward(&pass, batch.labels())?;
                let stats = Stats::compute(pass.output(), batch.labels());
                Ok((pass, grads, stats))
            }
            Engine::Parallel { executor, .. } => {
                let step = executor.forward_backward(net, batch.features(), batch.labels())?;
                Ok((step.pass, step.grads, step.stats))
            }
        }
    }

    fn validate(&self, net: &Network, full: &LabeledData) -> Result<Stats> {
        match self {
            Engine::Serial => net.evaluate(full),
            Engine::Parallel {
                executor,
                validation,
            } => executor.evaluate(net, validation),
        }
    }
}

impl Network {
    /// Train on `split.train`, validating on `split.validation` after every epoch.
    ///
    /// Uses the schedule, optimizer and console verbosity named in `cfg`.
    pub fn fit(&mut self, split: &TrainValSplit, cfg: &FitConfig) -> Result<FitReport> {
        cfg.validate()?;
        let mut scheduler = Scheduler::new(cfg.lr_schedule)?;
        let mut optimizer = cfg.optimizer.state(self.params())?;
        let mut reporter = ConsoleReporter::new(cfg.verbosity);
        self.fit_with(split, cfg, &mut scheduler, &mut optimizer, &mut reporter)
    }

    /// [`Network::fit`] with caller-supplied collaborators. `cfg.lr_schedule`,
    /// `cfg.optimizer` and `cfg.verbosity` are not consulted for construction; the weight
    /// statistics hook still fires only at [`Verbosity::Weights`].
    pub fn fit_with(
        &mut self,
        split: &TrainValSplit,
        cfg: &FitConfig,
        scheduler: &mut dyn LrScheduler,
        optimizer: &mut dyn Optimize,
        reporter: &mut dyn Reporter,
    ) -> Result<FitReport> {
        self.run(split, cfg, Engine::Serial, scheduler, optimizer, reporter)
    }

    /// Like [`Network::fit`], with every batch's forward/backward and every validation pass
    /// spread across `executor`'s workers.
    pub fn parallel_fit(
        &mut self,
        split: &TrainValSplit,
        cfg: &FitConfig,
        executor: &ParallelExecutor,
    ) -> Result<FitReport> {
        cfg.validate()?;
        let mut scheduler = Scheduler::new(cfg.lr_schedule)?;
        let mut optimizer = cfg.optimizer.state(self.params())?;
        let mut reporter = ConsoleReporter::new(cfg.verbosity);
        self.parallel_fit_with(
            split,
            cfg,
            executor,
            &mut scheduler,
            &mut optimizer,
            &mut reporter,
        )
    }

    pub fn parallel_fit_with(
        &mut self,
        split: &TrainValSplit,
        cfg: &FitConfig,
        executor: &ParallelExecutor,
        scheduler: &mut dyn LrScheduler,
        optimizer: &mut dyn Optimize,
        reporter: &mut dyn Reporter,
    ) -> Result<FitReport> {
        let engine = Engine::Parallel {
            executor,
            validation: split.validation.partition(executor.workers()),
        };
        self.run(split, cfg, engine, scheduler, optimizer, reporter)
    }

    fn check_split(&self, split: &TrainValSplit) -> Result<()> {
        for (name, data) in [("train", &split.train), ("validation", &split.validation)] {
            if data.is_empty() {
                return Err(Error::InvalidData(format!("{name} set must not be empty")));
            }
            if data.input_dim() != self.input_dim() {
                return Err(Error::ShapeMismatch {
                    context: "dataset input_dim vs network input_dim",
                    expected: self.input_dim(),
                    got: data.input_dim(),
                });
            }
            if data.num_classes() > self.output_dim() {
                return Err(Error::InvalidData(format!(
                    "{name} labels need {} classes, network has {} outputs",
                    data.num_classes(),
                    self.output_dim()
                )));
            }
        }
        Ok(())
    }

    fn run(
        &mut self,
        split: &TrainValSplit,
        cfg: &FitConfig,
        engine: Engine<'_>,
        scheduler: &mut dyn LrScheduler,
        optimizer: &mut dyn Optimize,
        reporter: &mut dyn Reporter,
    ) -> Result<FitReport> {
        cfg.validate()?;
        self.check_split(split)?;

        let started = Instant::now();
        scheduler.set_eta(cfg.lr);

        let mut rng = match cfg.shuffle {
            Shuffle::Seeded(seed) => Some(StdRng::seed_from_u64(seed)),
            Shuffle::None => None,
        };
        let mut train = split.train.clone();
        let mut early = EarlyStopping::new(cfg.early_stopping_patience);
        let mut epochs = Vec::with_capacity(cfg.epochs);
        let mut stop = StopReason::Completed;
        let mut t = 0_usize;

        for epoch in 0..cfg.epochs {
            let epoch_start = Instant::now();
            if let Some(rng) = rng.as_mut() {
                train.shuffle(rng);
            }

            let batches = train.batches(cfg.batch_size);
            let mut batch_stats = Vec::with_capacity(batches.len());
            let mut lr = cfg.lr;
            for batch in &batches {
                lr = scheduler.rate(t);
                let (pass, grads, stats) = engine.step(self, batch)?;
                batch_stats.push(stats);

                self.params_mut().decay(cfg.weight_decay);
                optimizer.update(
                    self.params_mut(),
                    &grads,
                    pass.activations(),
                    batch.len(),
                    lr,
                )?;
                t += cfg.batch_size;
            }

            let validation = engine.validate(self, &split.validation)?;
            let report = EpochReport {
                epoch,
                train: Stats::average(&batch_stats),
                validation,
                lr,
                duration: epoch_start.elapsed(),
            };
            reporter.epoch(&report, cfg.epochs);
            if cfg.verbosity >= Verbosity::Weights {
                for layer in 0..self.params().num_layers() {
                    reporter.weights(layer, &WeightStats::of(self.params().weights(layer)));
                }
            }
            epochs.push(report);

            if early.observe(epoch, validation.cross_entropy) {
                stop = StopReason::EarlyStopped {
                    best_epoch: early.best_epoch(),
                };
                break;
            }
            if let Some(budget) = cfg.time_budget {
                let elapsed = started.elapsed();
                if elapsed >= budget {
                    reporter.time_exceeded(elapsed);
                    stop = StopReason::TimeBudget;
                    break;
                }
            }
        }

        Ok(FitReport { epochs, stop })
    }
}
