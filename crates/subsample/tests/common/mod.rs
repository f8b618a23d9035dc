//! Shared helpers for the integration tests: a small 2-D Euclidean point
//! type, data generation, and brute-force reference queries.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use subsample::SamplePoint;

/// A 2-D point with a stable id, the toy metric space of the tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestPoint {
    pub id: i64,
    pub x: f64,
    pub y: f64,
}

impl SamplePoint for TestPoint {
    fn id(&self) -> i64 {
        self.id
    }
}

/// The Euclidean metric on [`TestPoint`].
pub fn euclidean(a: &TestPoint, b: &TestPoint) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Builds points from coordinates, with ids in order.
pub fn points(coords: &[(f64, f64)]) -> Vec<TestPoint> {
    coords
        .iter()
        .enumerate()
        .map(|(id, &(x, y))| TestPoint { id: id as i64, x, y })
        .collect()
}

/// Uniform random points in the square `[lo, hi)²`, seeded.
pub fn random_points(n: usize, lo: f64, hi: f64, seed: u64) -> Vec<TestPoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|id| TestPoint { id: id as i64, x: rng.gen_range(lo..hi), y: rng.gen_range(lo..hi) })
        .collect()
}

/// Every integer point of the square `[0, max]²`.
pub fn grid(max: i64) -> Vec<TestPoint> {
    let side = max + 1;
    (0..side * side)
        .map(|id| TestPoint { id, x: (id / side) as f64, y: (id % side) as f64 })
        .collect()
}

/// Brute-force index of the point closest to `query`.
pub fn brute_nearest(points: &[TestPoint], query: &TestPoint) -> usize {
    let mut best = 0;
    for (i, p) in points.iter().enumerate() {
        if euclidean(query, p) < euclidean(query, &points[best]) {
            best = i;
        }
    }
    best
}

/// Brute-force indices of all points strictly within `delta` of `query`.
pub fn brute_delta_close(points: &[TestPoint], query: &TestPoint, delta: f64) -> Vec<usize> {
    points
        .iter()
        .enumerate()
        .filter_map(|(i, p)| (euclidean(query, p) < delta).then_some(i))
        .collect()
}
