//! CLI for computing a δ-sparse, δ-dense subsample of a persistence-diagram
//! collection.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;

use shell::logging::configure_logger;
use shell::output::SubsampleSink;
use shell::point::TupleDistance;
use shell::samples::SamplesFile;
use subsample::coordinator::{self, DistanceWorker, SubsampleCoordinator};
use subsample::subsampler::DEFAULT_COHORT_SIZE;
use subsample::transport::ThreadTransport;
use subsample::PointSource;

#[derive(Parser, Debug)]
#[command(version, about = "Compute a delta-sparse, delta-dense subsample of a sample collection.")]
struct Args {
    /// The samples.json file describing the input collection.
    samples: PathBuf,

    /// The sparsity/density parameter; must be positive.
    delta: f64,

    /// The order of the distance: a number >= 1, or "inf" for Bottleneck.
    p: String,

    /// Where to write subsample.json.
    output: PathBuf,

    /// The seed for the one-shot sample shuffle.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Candidates gathered per cohort.
    #[arg(long, default_value_t = DEFAULT_COHORT_SIZE)]
    cohort_size: usize,

    /// Worker threads; defaults to the available parallelism.
    #[arg(long)]
    workers: Option<usize>,
}

fn main() -> Result<(), String> {
    let args = Args::parse();

    if !(args.delta > 0.0) {
        return Err(format!("delta must be positive, got {}", args.delta));
    }
    let p: f64 = args.p.parse().map_err(|e| format!("cannot parse p {:?}: {e}", args.p))?;
    if !(p >= 1.0) {
        return Err(format!("p must be at least 1 or \"inf\", got {p}"));
    }

    let _guard = configure_logger("subsample.log")?;

    let samples_file = SamplesFile::read(&args.samples)?;
    let samples = samples_file.points()?;
    ftlog::info!("loaded {} samples from {}", samples.len(), args.samples.display());

    // The subsample is always computed with the exact distance.
    let distance = TupleDistance::exact(p);
    let samples_path = args.samples.display().to_string();
    let sink = SubsampleSink::new(samples_path, args.delta, p, &args.output);

    let workers = args
        .workers
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, NonZeroUsize::get));
    if workers == 0 {
        return Err("at least one worker is required".to_string());
    }

    let mut process = SubsampleCoordinator::new(samples, args.delta, distance, sink, args.cohort_size, args.seed);
    let mut transport = ThreadTransport::new(workers, || DistanceWorker::new(distance));

    coordinator::run(&mut process, &mut transport)?;
    ftlog::info!("subsample written to {}", args.output.display());
    Ok(())
}
