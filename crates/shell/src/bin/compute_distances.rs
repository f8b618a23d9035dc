//! CLI for computing the pairwise distance matrix of a subsample.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;

use shell::logging::configure_logger;
use shell::output::{read_filter, MatrixSink, SubsampleFile};
use shell::point::TupleDistance;
use shell::samples::SamplesFile;
use subsample::coordinator::{self, DistanceWorker, MatrixCoordinator};
use subsample::transport::ThreadTransport;

#[derive(Parser, Debug)]
#[command(version, about = "Compute the pairwise distance matrix of a subsample.")]
struct Args {
    /// Approximation error for the distances; 0 selects exact computation.
    approx: f64,

    /// The subsample.json file written by `subsample`.
    subsample: PathBuf,

    /// Where to write the distance matrix.
    output: PathBuf,

    /// Optional space-separated 0/1 flags, one per upper-triangular pair;
    /// 0 writes the entry as 0 without computing it.
    filter: Option<PathBuf>,

    /// Worker threads; defaults to the available parallelism.
    #[arg(long)]
    workers: Option<usize>,
}

fn main() -> Result<(), String> {
    let args = Args::parse();

    if !(args.approx >= 0.0) {
        return Err(format!("approx must be non-negative, got {}", args.approx));
    }

    let _guard = configure_logger("compute-distances.log")?;

    let subsample_file = SubsampleFile::read(&args.subsample)?;
    let samples_file = SamplesFile::read(&subsample_file.sample)?;
    let points = samples_file.load_indices(&subsample_file.subsample)?;
    ftlog::info!("loaded {} retained samples from {}", points.len(), subsample_file.sample);

    let filter = args.filter.as_ref().map(read_filter).transpose()?;
    let distance = TupleDistance { p: subsample_file.order(), approx: args.approx };

    let workers = args
        .workers
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, NonZeroUsize::get));
    if workers == 0 {
        return Err("at least one worker is required".to_string());
    }

    let mut process = MatrixCoordinator::new(points, filter, MatrixSink::new(&args.output))?;
    let mut transport = ThreadTransport::new(workers, || DistanceWorker::new(distance));

    coordinator::run(&mut process, &mut transport)?;
    ftlog::info!("distance matrix written to {}", args.output.display());
    Ok(())
}
