//! Tests for the cohort pipeline: the δ-sparse and δ-dense guarantees, the
//! concrete scenarios, and idempotence.

use std::sync::Arc;

use subsample::driver::SharedQueues;
use subsample::{Resolved, Subsampler};
use test_case::test_case;

mod common;

use common::{euclidean, grid, points, random_points, TestPoint};

/// Runs the pipeline straight through, no workers involved.
fn subsample_of(samples: Vec<TestPoint>, delta: f64, seed: u64, cohort_size: usize) -> Vec<TestPoint> {
    let oracle = Arc::new(Resolved(euclidean));
    let queues = SharedQueues::new();
    Subsampler::new(samples, delta, oracle).cohort_size(cohort_size).seed(seed).run(&queues)
}

/// Every two output points are at least delta apart.
fn assert_sparse(output: &[TestPoint], delta: f64) {
    for (i, a) in output.iter().enumerate() {
        for b in &output[i + 1..] {
            assert!(
                euclidean(a, b) >= delta,
                "output points {} and {} are only {} apart",
                a.id,
                b.id,
                euclidean(a, b)
            );
        }
    }
}

/// Every sample has an output point strictly within delta.
fn assert_dense(samples: &[TestPoint], output: &[TestPoint], delta: f64) {
    for s in samples {
        assert!(
            output.iter().any(|o| euclidean(s, o) < delta),
            "sample {} has no output point within {delta}",
            s.id
        );
    }
}

#[test]
fn two_far_points_are_both_retained() {
    let samples = points(&[(0.0, 0.0), (1000.0, 0.0)]);
    let output = subsample_of(samples.clone(), 10.0, 0, 1000);
    let mut ids: Vec<i64> = output.iter().map(|p| p.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1]);
}

#[test]
fn two_close_points_collapse_to_one() {
    let samples = points(&[(0.0, 0.0), (5.0, 0.0)]);
    let output = subsample_of(samples.clone(), 10.0, 0, 1000);
    assert_eq!(output.len(), 1);
    assert_dense(&samples, &output, 10.0);
}

#[test_case(0; "seed zero")]
#[test_case(7; "seed seven")]
fn linear_chain_yields_a_maximal_independent_set(seed: u64) {
    let samples = points(&[(0.0, 0.0), (5.0, 0.0), (10.0, 0.0), (15.0, 0.0), (20.0, 0.0)]);
    let output = subsample_of(samples.clone(), 6.0, seed, 1000);
    assert_sparse(&output, 6.0);
    assert_dense(&samples, &output, 6.0);
}

#[test]
fn grid_respects_packing_and_cover_bounds() {
    let samples = grid(10);
    assert_eq!(samples.len(), 121);
    let output = subsample_of(samples.clone(), 3.0, 0, 1000);
    assert_sparse(&output, 3.0);
    assert_dense(&samples, &output, 3.0);
    // Packing: pairwise separation 3 allows at most 25 points in [0,10]².
    assert!(output.len() <= 25, "packing bound violated: {} points", output.len());
    // Cover: a retained point reaches at most 25 grid points within
    // distance 3, and all 121 must be reached.
    assert!(output.len() >= 5, "cover bound violated: {} points", output.len());
}

#[test_case(200, 2.0, 1, 1000; "one cohort")]
#[test_case(200, 2.0, 2, 16; "many small cohorts")]
#[test_case(500, 5.0, 3, 64; "wide delta")]
#[test_case(500, 0.5, 4, 64; "narrow delta")]
fn random_sets_are_sparse_and_dense(n: usize, delta: f64, seed: u64, cohort_size: usize) {
    let samples = random_points(n, -20.0, 20.0, seed);
    let output = subsample_of(samples.clone(), delta, seed, cohort_size);
    assert!(!output.is_empty());
    assert_sparse(&output, delta);
    assert_dense(&samples, &output, delta);
}

#[test_case(300, 3.0, 9; "three hundred points")]
#[test_case(150, 1.5, 10; "one hundred fifty points")]
fn subsampling_is_idempotent(n: usize, delta: f64, seed: u64) {
    let samples = random_points(n, -20.0, 20.0, seed);
    let output = subsample_of(samples, delta, seed, 128);

    // The output is delta-sparse, so no point can evict another: running
    // again, under any shuffle, returns the same set.
    let again = subsample_of(output.clone(), delta, seed + 1, 128);
    let mut first: Vec<i64> = output.iter().map(|p| p.id).collect();
    let mut second: Vec<i64> = again.iter().map(|p| p.id).collect();
    first.sort_unstable();
    second.sort_unstable();
    assert_eq!(first, second);
}

#[test]
fn cohort_size_does_not_change_the_guarantees() {
    let samples = random_points(240, -15.0, 15.0, 20);
    for cohort_size in [1, 7, 50, 240] {
        let output = subsample_of(samples.clone(), 2.5, 21, cohort_size);
        assert_sparse(&output, 2.5);
        assert_dense(&samples, &output, 2.5);
    }
}

#[test]
fn empty_input_yields_an_empty_subsample() {
    let output = subsample_of(Vec::new(), 1.0, 0, 1000);
    assert!(output.is_empty());
}

#[test]
fn singleton_input_is_retained() {
    let output = subsample_of(points(&[(3.0, 4.0)]), 1.0, 0, 1000);
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].id, 0);
}
