//! The resumption law: any interleaving of miss → cache → resume yields the
//! same result as running the operation with every distance precomputed.

use subsample::{CachingOracle, MetricTree, Outcome, Resolved};
use test_case::test_case;

mod common;

use common::{euclidean, random_points, TestPoint};

/// Caches every missing pair of a continuation, computing with the real
/// metric.
fn fill<D: Fn(&TestPoint, &TestPoint) -> f64 + Send + Sync>(
    oracle: &CachingOracle<TestPoint, D>,
    missing: Vec<(TestPoint, TestPoint)>,
) {
    assert_eq!(missing.len(), 1, "each suspension names exactly one pair");
    for (x, y) in missing {
        oracle.cache(&x, &y, euclidean(&x, &y));
    }
}

/// Builds a reference tree with a straight-through oracle.
fn build_straight(samples: &[TestPoint]) -> MetricTree<TestPoint> {
    let oracle = Resolved(euclidean);
    let mut tree = MetricTree::new();
    for p in samples {
        match tree.insert(&oracle, *p) {
            Outcome::Done(_) => {}
            Outcome::Suspended(_) => panic!("a straight-through insert cannot suspend"),
        }
    }
    tree
}

/// Builds the same tree against an empty cache, resuming through every miss.
fn build_resumed(samples: &[TestPoint]) -> (MetricTree<TestPoint>, u64) {
    let oracle = CachingOracle::new(euclidean);
    let mut tree = MetricTree::new();
    let mut suspensions = 0;
    for p in samples {
        let mut outcome = tree.insert(&oracle, *p);
        loop {
            match outcome {
                Outcome::Done(_) => break,
                Outcome::Suspended(mut continuation) => {
                    fill(&oracle, continuation.take_missing());
                    suspensions += 1;
                    outcome = tree.resume_insert(&oracle, continuation);
                }
            }
        }
    }
    (tree, suspensions)
}

#[test_case(30, 61; "thirty points")]
#[test_case(200, 62; "two hundred points")]
fn resumed_inserts_build_the_same_tree(n: usize, seed: u64) {
    let samples = random_points(n, -30.0, 30.0, seed);
    let straight = build_straight(&samples);
    let (resumed, suspensions) = build_resumed(&samples);

    assert!(suspensions > 0, "the empty cache must force suspensions");
    assert_eq!(straight.len(), resumed.len());
    for n in straight.node_ids() {
        assert_eq!(straight.point(n), resumed.point(n));
        assert_eq!(straight.radius(n), resumed.radius(n));
        assert_eq!(straight.left(n), resumed.left(n));
        assert_eq!(straight.right(n), resumed.right(n));
        assert_eq!(straight.parent(n), resumed.parent(n));
    }
}

#[test_case(50, 71; "fifty points")]
#[test_case(250, 72; "two hundred fifty points")]
fn resumed_queries_match_straight_through(n: usize, seed: u64) {
    let samples = random_points(n, -30.0, 30.0, seed);
    let tree = build_straight(&samples);
    let straight = Resolved(euclidean);
    let delta = 8.0;

    for (qi, q) in random_points(20, -35.0, 35.0, seed + 1000).into_iter().enumerate() {
        let q = TestPoint { id: 1_000_000 + q.id, ..q };
        // A fresh, empty cache per query keeps every operation miss-driven.
        let oracle = CachingOracle::new(euclidean);

        let expected_nearest = match tree.nearest(&straight, &q) {
            Outcome::Done(id) => id,
            Outcome::Suspended(_) => panic!("straight-through query suspended"),
        };
        let mut outcome = tree.nearest(&oracle, &q);
        let nearest = loop {
            match outcome {
                Outcome::Done(id) => break id,
                Outcome::Suspended(mut c) => {
                    fill(&oracle, c.take_missing());
                    outcome = tree.resume_nearest(&oracle, c);
                }
            }
        };
        assert_eq!(
            euclidean(&q, tree.point(nearest)),
            euclidean(&q, tree.point(expected_nearest)),
            "query {qi}: resumed nearest diverged"
        );

        let expected_close = match tree.delta_close(&straight, &q, delta) {
            Outcome::Done(ids) => ids,
            Outcome::Suspended(_) => panic!("straight-through query suspended"),
        };
        let mut outcome = tree.delta_close(&oracle, &q, delta);
        let close = loop {
            match outcome {
                Outcome::Done(ids) => break ids,
                Outcome::Suspended(mut c) => {
                    fill(&oracle, c.take_missing());
                    outcome = tree.resume_delta_close(&oracle, c);
                }
            }
        };
        assert_eq!(close, expected_close, "query {qi}: resumed delta_close diverged");

        let expected_k = match tree.k_nearest(&straight, &q, 5) {
            Outcome::Done(ids) => ids,
            Outcome::Suspended(_) => panic!("straight-through query suspended"),
        };
        let mut outcome = tree.k_nearest(&oracle, &q, 5);
        let k = loop {
            match outcome {
                Outcome::Done(ids) => break ids,
                Outcome::Suspended(mut c) => {
                    fill(&oracle, c.take_missing());
                    outcome = tree.resume_k_nearest(&oracle, c);
                }
            }
        };
        assert_eq!(k, expected_k, "query {qi}: resumed k_nearest diverged");

        let expected_hit = match tree.aspiration(&straight, &q, delta) {
            Outcome::Done(hit) => hit.is_some(),
            Outcome::Suspended(_) => panic!("straight-through query suspended"),
        };
        let mut outcome = tree.aspiration(&oracle, &q, delta);
        let hit = loop {
            match outcome {
                Outcome::Done(hit) => break hit,
                Outcome::Suspended(mut c) => {
                    fill(&oracle, c.take_missing());
                    outcome = tree.resume_aspiration(&oracle, c);
                }
            }
        };
        assert_eq!(hit.is_some(), expected_hit, "query {qi}: resumed aspiration diverged");
        if let Some(id) = hit {
            assert!(euclidean(&q, tree.point(id)) < delta);
        }
    }
}

#[test]
fn oracle_counts_hits_and_misses() {
    let samples = random_points(40, -10.0, 10.0, 81);
    let tree = build_straight(&samples);
    let oracle = CachingOracle::new(euclidean);
    let q = TestPoint { id: 1_000_000, x: 0.5, y: -0.5 };

    let mut outcome = tree.nearest(&oracle, &q);
    loop {
        match outcome {
            Outcome::Done(_) => break,
            Outcome::Suspended(mut c) => {
                fill(&oracle, c.take_missing());
                outcome = tree.resume_nearest(&oracle, c);
            }
        }
    }

    let stats = oracle.stats();
    assert!(stats.misses > 0);
    assert!(stats.hits > 0, "resumed steps re-read their distances from the cache");
    assert_eq!(stats.lookups, stats.hits + stats.misses);
    assert!(stats.cached as u64 <= stats.misses, "at most one cache entry per missed pair");
}

#[test]
#[should_panic(expected = "continuation does not belong")]
fn continuations_are_operation_specific() {
    let samples = random_points(20, -10.0, 10.0, 91);
    let tree = build_straight(&samples);
    let oracle = CachingOracle::new(euclidean);
    let q = TestPoint { id: 1_000_000, x: 0.0, y: 0.0 };

    match tree.nearest(&oracle, &q) {
        Outcome::Suspended(c) => {
            let _ = tree.resume_delta_close(&oracle, c);
        }
        Outcome::Done(_) => panic!("an empty cache must suspend the first lookup"),
    }
}
