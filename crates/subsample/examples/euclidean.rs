//! Subsample a cloud of random 2-D points with the plain Euclidean metric,
//! straight through, without a worker pool.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use subsample::driver::SharedQueues;
use subsample::{Resolved, SamplePoint, Subsampler};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Point2 {
    id: i64,
    x: f64,
    y: f64,
}

impl SamplePoint for Point2 {
    fn id(&self) -> i64 {
        self.id
    }
}

fn euclidean(a: &Point2, b: &Point2) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

fn main() {
    let mut rng = StdRng::seed_from_u64(42);
    let samples: Vec<Point2> = (0..2000)
        .map(|id| Point2 { id, x: rng.gen_range(-50.0..50.0), y: rng.gen_range(-50.0..50.0) })
        .collect();

    let delta = 5.0;
    let oracle = Arc::new(Resolved(euclidean));
    let subsample = Subsampler::new(samples.clone(), delta, oracle).seed(42).run(&SharedQueues::new());

    println!("{} of {} points retained at delta = {delta}", subsample.len(), samples.len());
    for p in subsample.iter().take(10) {
        println!("  #{}: ({:.2}, {:.2})", p.id, p.x, p.y);
    }
}
