//! The cohort pipeline that selects the δ-sparse, δ-dense subsample.
//!
//! Samples are consumed in shuffled order, a cohort at a time. Each cohort
//! runs five stages against the growing main tree:
//!
//! 1. Aspiration filter: drop every sample that already has a retained point
//!    within δ.
//! 2. Candidate tree: insert the survivors into a fresh metric tree that
//!    shares the distance cache.
//! 3. Adjacency: delta-close queries against the candidate tree give the
//!    conflict graph (i—j iff `d(x_i, x_j) < δ`).
//! 4. Greedy maximal independent set, serial in candidate order.
//! 5. Install the accepted candidates into the main tree.
//!
//! Stages 1–3 and 5 run through the [`driver`](crate::driver), so each
//! operation may suspend on uncached distances; stage boundaries are strict
//! barriers. Stage 4 is plain serial code.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::driver::{parallel, Resumable, SharedQueues};
use crate::oracle::DistanceLookup;
use crate::tree::{Continuation, MetricTree, NodeId, Outcome};

/// Default number of candidates gathered per cohort.
pub const DEFAULT_COHORT_SIZE: usize = 1000;

/// The subsampling pipeline.
///
/// Owns the sample array and the oracle handle; the main tree lives only for
/// the duration of [`run`](Self::run).
pub struct Subsampler<P, O> {
    /// The input points; shuffled once at the start of `run`.
    samples: Vec<P>,
    /// The sparsity/density parameter.
    delta: f64,
    /// The distance oracle shared with the coordinator.
    oracle: Arc<O>,
    /// Candidates gathered per cohort.
    cohort_size: usize,
    /// Seed for the one-shot shuffle.
    seed: u64,
}

impl<P: Clone, O: DistanceLookup<P>> Subsampler<P, O> {
    /// Creates a pipeline over the given samples with cohort size
    /// [`DEFAULT_COHORT_SIZE`] and shuffle seed 0.
    pub fn new(samples: Vec<P>, delta: f64, oracle: Arc<O>) -> Self {
        Self { samples, delta, oracle, cohort_size: DEFAULT_COHORT_SIZE, seed: 0 }
    }

    /// Sets the cohort size.
    #[must_use]
    pub const fn cohort_size(mut self, cohort_size: usize) -> Self {
        self.cohort_size = cohort_size;
        self
    }

    /// Sets the shuffle seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Runs the pipeline to completion and returns the subsample, in the
    /// main tree's insertion order.
    ///
    /// Distance misses suspend into `queues`; with a
    /// [`Resolved`](crate::oracle::Resolved) oracle nothing ever suspends and
    /// the call runs straight through.
    pub fn run(mut self, queues: &SharedQueues<P>) -> Vec<P> {
        self.samples.shuffle(&mut StdRng::seed_from_u64(self.seed));

        let mut tree = MetricTree::new();
        let mut cohort = 0_u64;
        let mut next = 0;
        while next < self.samples.len() {
            // Stage 1: gather up to a cohort of candidates that have no
            // retained point within delta.
            let mut candidates = Vec::new();
            while next < self.samples.len() && candidates.len() < self.cohort_size {
                let batch_end = usize::min(next + self.cohort_size, self.samples.len());
                let batch: Vec<usize> = (next..batch_end).collect();
                next = batch_end;
                let mut op = AspirationOp { tree: &tree, samples: &self.samples, oracle: &*self.oracle, delta: self.delta };
                let unclaimed = parallel(queues, &mut op, &batch);
                candidates.extend(batch.into_iter().zip(unclaimed).filter_map(|(i, keep)| keep.then_some(i)));
            }

            // Stage 2: build the candidate tree and remember which candidate
            // each node is.
            let mut candidate_tree = MetricTree::new();
            let node_to_candidate: HashMap<NodeId, usize> = {
                let mut op = InsertOp { tree: &mut candidate_tree, samples: &self.samples, oracle: &*self.oracle };
                let nodes = parallel(queues, &mut op, &candidates);
                nodes.into_iter().enumerate().map(|(i, id)| (id, i)).collect()
            };

            // Stage 3: conflict graph by delta-closeness among candidates.
            let adjacency: Vec<Vec<usize>> = {
                let mut op =
                    DeltaCloseOp { tree: &candidate_tree, samples: &self.samples, oracle: &*self.oracle, delta: self.delta };
                let close = parallel(queues, &mut op, &candidates);
                close
                    .into_iter()
                    .map(|nodes| {
                        nodes
                            .into_iter()
                            .map(|id| {
                                node_to_candidate
                                    .get(&id)
                                    .copied()
                                    .map_or_else(|| unreachable!("candidate tree node without a candidate"), |i| i)
                            })
                            .collect()
                    })
                    .collect()
            };

            // Stage 4: greedy maximal independent set, serial in candidate
            // order.
            let mut accepted = vec![true; candidates.len()];
            for i in 0..candidates.len() {
                if accepted[i] {
                    for &j in &adjacency[i] {
                        if j != i {
                            accepted[j] = false;
                        }
                    }
                }
            }

            // Stage 5: install the accepted candidates into the main tree.
            let install: Vec<usize> =
                candidates.iter().zip(&accepted).filter_map(|(&i, &keep)| keep.then_some(i)).collect();
            {
                let mut op = InsertOp { tree: &mut tree, samples: &self.samples, oracle: &*self.oracle };
                parallel(queues, &mut op, &install);
            }

            ftlog::debug!(
                "cohort {cohort}: {} candidates, {} accepted, {} retained total, {next} of {} samples examined",
                candidates.len(),
                install.len(),
                tree.len(),
                self.samples.len(),
            );
            cohort += 1;
        }

        ftlog::info!("subsample complete: {} of {} samples retained", tree.len(), self.samples.len());
        tree.into_points()
    }
}

/// Stage-1 functor: is there *no* retained point within delta of the sample?
///
/// Returns `true` when the sample survives the filter and becomes a
/// candidate.
pub struct AspirationOp<'a, P, O> {
    /// The tree being searched.
    pub tree: &'a MetricTree<P>,
    /// The full sample array; arguments index into it.
    pub samples: &'a [P],
    /// The distance oracle.
    pub oracle: &'a O,
    /// The search radius.
    pub delta: f64,
}

impl<P: Clone, O: DistanceLookup<P>> Resumable<P> for AspirationOp<'_, P, O> {
    type Output = bool;

    fn begin(&mut self, sample_index: usize) -> Outcome<P, bool> {
        map_aspiration(self.tree.aspiration(self.oracle, &self.samples[sample_index], self.delta))
    }

    fn resume(&mut self, continuation: Continuation<P>) -> Outcome<P, bool> {
        map_aspiration(self.tree.resume_aspiration(self.oracle, continuation))
    }
}

/// Shapes an aspiration outcome into "sample is a candidate".
fn map_aspiration<P>(outcome: Outcome<P, Option<NodeId>>) -> Outcome<P, bool> {
    match outcome {
        Outcome::Done(hit) => Outcome::Done(hit.is_none()),
        Outcome::Suspended(c) => Outcome::Suspended(c),
    }
}

/// Stage-2 and stage-5 functor: insert the sample into a tree.
pub struct InsertOp<'a, P, O> {
    /// The tree being grown.
    pub tree: &'a mut MetricTree<P>,
    /// The full sample array; arguments index into it.
    pub samples: &'a [P],
    /// The distance oracle.
    pub oracle: &'a O,
}

impl<P: Clone, O: DistanceLookup<P>> Resumable<P> for InsertOp<'_, P, O> {
    type Output = NodeId;

    fn begin(&mut self, sample_index: usize) -> Outcome<P, NodeId> {
        self.tree.insert(self.oracle, self.samples[sample_index].clone())
    }

    fn resume(&mut self, continuation: Continuation<P>) -> Outcome<P, NodeId> {
        self.tree.resume_insert(self.oracle, continuation)
    }
}

/// Stage-3 functor: all tree points within delta of the sample.
pub struct DeltaCloseOp<'a, P, O> {
    /// The tree being searched.
    pub tree: &'a MetricTree<P>,
    /// The full sample array; arguments index into it.
    pub samples: &'a [P],
    /// The distance oracle.
    pub oracle: &'a O,
    /// The search radius.
    pub delta: f64,
}

impl<P: Clone, O: DistanceLookup<P>> Resumable<P> for DeltaCloseOp<'_, P, O> {
    type Output = Vec<NodeId>;

    fn begin(&mut self, sample_index: usize) -> Outcome<P, Vec<NodeId>> {
        self.tree.delta_close(self.oracle, &self.samples[sample_index], self.delta)
    }

    fn resume(&mut self, continuation: Continuation<P>) -> Outcome<P, Vec<NodeId>> {
        self.tree.resume_delta_close(self.oracle, continuation)
    }
}
