//! Fork-join execution of forward + backward over row partitions of one mini-batch.
//!
//! Protocol per batch:
//! 1. split the batch into `workers` contiguous row ranges whose sizes differ by at most one
//! 2. every worker runs forward, stats and backward on its own rows, in buffers it alone
//!    owns, reading the shared weights only; it returns an owned [`Partial`]
//! 3. the pool joins (the barrier): nothing downstream starts until every worker is done
//! 4. a single-threaded [`Reduction`] copies each partial's rows into full-batch buffers at
//!    its cumulative row offset and accumulates the statistics and bias gradients
//!
//! No lock is held while computing, and the reduction can be exercised on its own.
//!
//! Results match the serial engine up to floating-point summation order. Bit-exact
//! reproducibility across worker counts is not guaranteed.

use std::ops::Range;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::{Error, ForwardPass, Gradients, LabeledData, Matrix, Network, Result, Stats};

/// Split `rows` into `n` contiguous ranges whose lengths differ by at most one.
///
/// Only non-empty ranges are returned, so fewer than `n` come back when `rows < n`; the
/// workers left without rows sit the step out.
///
/// # Panics
///
/// If `n == 0`.
pub fn partition_rows(rows: usize, n: usize) -> Vec<Range<usize>> {
    assert!(n > 0, "partition count must be > 0");
    let base = rows / n;
    let extra = rows % n;
    let mut ranges = Vec::with_capacity(n.min(rows));
    let mut start = 0;
    for k in 0..n {
        let len = base + usize::from(k < extra);
        if len == 0 {
            break;
        }
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// What one worker hands back for its rows of the batch.
#[derive(Debug, Clone)]
pub struct Partial {
    /// First row of this partition inside the full batch.
    pub start_row: usize,
    pub pass: ForwardPass,
    pub grads: Gradients,
    pub stats: Stats,
}

impl Partial {
    #[inline]
    pub fn rows(&self) -> usize {
        self.pass.batch_rows()
    }
}

/// Full-batch buffers and aggregated statistics after one parallel step.
#[derive(Debug, Clone)]
pub struct ParallelStep {
    pub pass: ForwardPass,
    pub grads: Gradients,
    /// Unweighted mean of the per-worker stats, over the workers that received rows.
    ///
    /// When the batch has fewer rows than there are workers, this differs from summing the
    /// per-worker stats and dividing by the worker count: idle workers are not counted.
    pub stats: Stats,
}

/// Combines [`Partial`]s into shared full-batch buffers.
///
/// Row copies target disjoint ranges; stats and bias gradients are sums that every partial
/// contributes to. Bias gradients are combined as per-partition means weighted by row share:
/// `gb[k] += (partial_sum[k] / rows_sub) * (rows_sub / rows_total)`, which equals the serial
/// column mean up to summation order.
#[derive(Debug)]
pub struct Reduction {
    total_rows: usize,
    activations: Vec<Matrix>,
    derivatives: Vec<Option<Matrix>>,
    deltas: Vec<Matrix>,
    biases: Vec<Vec<f32>>,
    stats: Vec<Stats>,
}

impl Reduction {
    /// Zeroed full-batch buffers for `total_rows` rows of `network`.
    pub fn new(network: &Network, total_rows: usize) -> Self {
        let layers = network.topology().layers();
        let n = layers.len() - 1;

        let activations = layers
            .iter()
            .map(|l| Matrix::zeros(total_rows, l.width))
            .collect();
        let derivatives = layers[1..]
            .iter()
            .enumerate()
            .map(|(i, l)| (i + 1 < n).then(|| Matrix::zeros(total_rows, l.width)))
            .collect();
        let deltas = layers[1..]
            .iter()
            .map(|l| Matrix::zeros(total_rows, l.width))
            .collect();
        let biases = layers[1..].iter().map(|l| vec![0.0; l.width]).collect();

        Self {
            total_rows,
            activations,
            derivatives,
            deltas,
            biases,
            stats: Vec::new(),
        }
    }

    /// Fold one partial in. Fails on any shape disagreement with the shared buffers.
    pub fn absorb(&mut self, partial: &Partial) -> Result<()> {
        let start = partial.start_row;
        let acts = partial.pass.activations();
        let derivs = partial.pass.derivatives();

        if acts.len() != self.activations.len() || partial.grads.num_layers() != self.deltas.len()
        {
            return Err(Error::ShapeMismatch {
                context: "partial layer count",
                expected: self.activations.len(),
                got: acts.len(),
            });
        }

        for (shared, part) in self.activations.iter_mut().zip(acts) {
            shared.copy_rows_from(start, part)?;
        }
        for (shared, part) in self.derivatives.iter_mut().zip(derivs) {
            match (shared, part) {
                (Some(shared), Some(part)) => shared.copy_rows_from(start, part)?,
                (None, None) => {}
                _ => {
                    return Err(Error::InvalidData(
                        "partial derivative buffers do not line up with the network".to_owned(),
                    ));
                }
            }
        }

        let rows = partial.rows();
        let share = rows as f32 / self.total_rows as f32;
        for (layer, shared) in self.deltas.iter_mut().enumerate() {
            shared.copy_rows_from(start, partial.grads.delta(layer))?;

            let part_bias = partial.grads.bias(layer);
            let acc = &mut self.biases[layer];
            if part_bias.len() != acc.len() {
                return Err(Error::ShapeMismatch {
                    context: "bias gradient length",
                    expected: acc.len(),
                    got: part_bias.len(),
                });
            }
            for (a, &mean) in acc.iter_mut().zip(part_bias) {
                *a += mean * share;
            }
        }

        self.stats.push(partial.stats);
        Ok(())
    }

    pub fn finish(self) -> ParallelStep {
        ParallelStep {
            pass: ForwardPass::from_parts(self.activations, self.derivatives),
            grads: Gradients::from_parts(self.deltas, self.biases),
            stats: Stats::average(&self.stats),
        }
    }
}

/// Fixed-size worker pool that runs one fork-join region per mini-batch.
///
/// The worker count is fixed at construction and lives for one training session.
pub struct ParallelExecutor {
    pool: ThreadPool,
    workers: usize,
}

impl std::fmt::Debug for ParallelExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelExecutor")
            .field("workers", &self.workers)
            .finish()
    }
}

impl ParallelExecutor {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::InvalidConfig("worker count must be > 0".to_owned()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fjnet-worker-{i}"))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build worker pool: {e}")))?;
        Ok(Self { pool, workers })
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Forward + backward over `batch`, partitioned across the workers.
    ///
    /// Any worker error, or a shape mismatch during the reduction, aborts the whole step.
    pub fn forward_backward(
        &self,
        network: &Network,
        batch: &Matrix,
        labels: &[usize],
    ) -> Result<ParallelStep> {
        if batch.rows() == 0 {
            return Err(Error::InvalidData("batch must not be empty".to_owned()));
        }
        if labels.len() != batch.rows() {
            return Err(Error::ShapeMismatch {
                context: "label count vs batch rows",
                expected: batch.rows(),
                got: labels.len(),
            });
        }

        let ranges = partition_rows(batch.rows(), self.workers);
        let partials: Vec<Partial> = self.pool.install(|| {
            ranges
                .par_iter()
                .map(|range| run_partition(network, batch, labels, range.clone()))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut reduction = Reduction::new(network, batch.rows());
        for partial in &partials {
            reduction.absorb(partial)?;
        }
        Ok(reduction.finish())
    }

    /// Statistics over fixed validation partitions, evaluated in parallel.
    ///
    /// Returns the unweighted mean of per-partition stats.
    pub fn evaluate(&self, network: &Network, partitions: &[LabeledData]) -> Result<Stats> {
        if partitions.is_empty() {
            return Err(Error::InvalidData(
                "at least one validation partition is required".to_owned(),
            ));
        }
        let stats: Vec<Stats> = self.pool.install(|| {
            partitions
                .par_iter()
                .map(|part| network.evaluate(part))
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(Stats::average(&stats))
    }
}

fn run_partition(
    network: &Network,
    batch: &Matrix,
    labels: &[usize],
    range: Range<usize>,
) -> Result<Partial> {
    let start_row = range.start;
    let x = batch.select_rows(range.clone());
    let y = &labels[range];

    let pass = network.forward(&x)?;
    let grads = network.backward(&pass, y)?;
    let stats = Stats::compute(pass.output(), y);

    Ok(Partial {
        start_row,
        pass,
        grads,
        stats,
    })
}
