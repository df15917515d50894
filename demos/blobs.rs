use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fjnet::{
    Activation, FitConfig, LabeledData, LrSchedule, Matrix, NetworkBuilder, Optimizer,
    ParallelExecutor, Shuffle, TrainValSplit, Verbosity,
};

fn parse_usize(args: &[String], key: &str, default: usize) -> usize {
    let mut i = 0;
    while i + 1 < args.len() {
        if args[i] == key {
            return args[i + 1]
                .parse::<usize>()
                .unwrap_or_else(|_| panic!("failed to parse {key} as usize"));
        }
        i += 1;
    }
    default
}

/// `per_class` noisy points around each of four centers.
fn blobs(per_class: usize, rng: &mut StdRng) -> fjnet::Result<LabeledData> {
    let centers = [[-1.0_f32, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
    let mut x = Matrix::zeros(centers.len() * per_class, 2);
    let mut labels = Vec::with_capacity(centers.len() * per_class);
    for (class, center) in centers.iter().enumerate() {
        for _ in 0..per_class {
            let r = labels.len();
            x.set(r, 0, center[0] + rng.gen_range(-0.6..0.6));
            x.set(r, 1, center[1] + rng.gen_range(-0.6..0.6));
            labels.push(class);
        }
    }
    LabeledData::new(x, labels)
}

fn main() -> fjnet::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let workers = parse_usize(&args, "--workers", 4);
    let epochs = parse_usize(&args, "--epochs", 30);

    let mut rng = StdRng::seed_from_u64(0);
    let split = TrainValSplit::new(blobs(500, &mut rng)?, blobs(100, &mut rng)?)?;

    let cfg = FitConfig {
        epochs,
        batch_size: 64,
        lr: 0.05,
        weight_decay: 1e-5,
        lr_schedule: LrSchedule::Exponential {
            decay_rate: 0.5,
            decay_steps: 20_000,
        },
        optimizer: Optimizer::SgdMomentum { momentum: 0.9 },
        shuffle: Shuffle::Seeded(1),
        early_stopping_patience: 5,
        time_budget: Some(Duration::from_secs(60)),
        verbosity: Verbosity::Timing,
    };

    let mut net = NetworkBuilder::new(2)?
        .add_layer(32, Activation::ReLU)?
        .add_layer(32, Activation::Tanh)?
        .add_layer(4, Activation::Softmax)?
        .build_with_seed(0)?;

    let report = if workers > 1 {
        let executor = ParallelExecutor::new(workers)?;
        net.parallel_fit(&split, &cfg, &executor)?
    } else {
        net.fit(&split, &cfg)?
    };

    println!("stopped: {:?}", report.stop);
    if let Some(last) = report.last() {
        println!(
            "final validation: acc={:.4} ce={:.4}",
            last.validation.accuracy, last.validation.cross_entropy
        );
    }
    Ok(())
}
