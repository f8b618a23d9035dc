//! The shared search skeleton and the continuations that make it resumable.
//!
//! All four queries (nearest, k-nearest, aspiration, delta-close) walk the
//! tree with an explicit stack of subtree roots, visiting the top, pruning
//! its subtree when the triangle inequality allows, and otherwise pushing its
//! children closer-first-on-top. All mutable query state lives in an
//! [`OpState`], so a distance miss can park the whole operation in a
//! [`Continuation`] and re-enter it later.
//!
//! The work-stack invariant: the top item has not been fully processed. The
//! first lookup a step misses on suspends it, leaving the top in place with
//! that one pair recorded, so re-entry re-runs the step atomically; one pair
//! per suspension keeps the driver's wake accounting exact. Step re-runs are
//! idempotent by construction: the nearest update uses strict `<`, the
//! k-nearest best set is a set, delta-close refuses to re-append the node it
//! just appended, and aspiration terminates on its first hit.

use std::collections::BTreeSet;

use ordered_float::OrderedFloat;

use crate::oracle::DistanceLookup;

use super::{MetricTree, NodeId};

/// The result of a resumable operation: a value, or a parked continuation.
#[derive(Debug)]
pub enum Outcome<P, T> {
    /// The operation completed.
    Done(T),
    /// The operation is stuck on uncached distances.
    Suspended(Continuation<P>),
}

/// A reified snapshot of an in-progress tree operation.
///
/// Carries the query point, the operation-specific state, and the pairs
/// whose distances the interrupted step needs. Once those pairs are cached,
/// re-enter the operation through the matching `resume_*` method.
#[derive(Debug)]
pub struct Continuation<P> {
    /// The point the operation is about.
    query: P,
    /// Distance pairs the interrupted step is waiting on.
    missing: Vec<(P, P)>,
    /// Operation tag and mutable state.
    state: OpState,
}

impl<P> Continuation<P> {
    /// Packs up a suspended operation.
    pub(crate) const fn new(query: P, missing: Vec<(P, P)>, state: OpState) -> Self {
        Self { query, missing, state }
    }

    /// Drains the missing-pair list, leaving it empty.
    ///
    /// The driver hands these to the coordinator as distance jobs.
    pub fn take_missing(&mut self) -> Vec<(P, P)> {
        std::mem::take(&mut self.missing)
    }

    /// Splits the continuation into query point and state.
    pub(crate) fn into_parts(self) -> (P, OpState) {
        (self.query, self.state)
    }
}

/// Mutable state of an in-progress operation, tagged by operation.
#[derive(Debug)]
pub(crate) enum OpState {
    /// An insertion, paused at the node it was examining.
    Insert {
        /// The node being examined; `None` means the tree was empty.
        cursor: Option<NodeId>,
    },
    /// A nearest-point search.
    Nearest {
        /// Subtree roots still to visit.
        stack: Vec<NodeId>,
        /// Distance to the best point found so far.
        best: f64,
        /// The best point found so far.
        best_id: Option<NodeId>,
    },
    /// A k-nearest-points search.
    KNearest {
        /// Subtree roots still to visit.
        stack: Vec<NodeId>,
        /// How many points to find.
        k: usize,
        /// The best points found so far, ordered worst-last.
        best: BTreeSet<(OrderedFloat<f64>, NodeId)>,
    },
    /// An aspiration search: any point within delta.
    Aspiration {
        /// Subtree roots still to visit.
        stack: Vec<NodeId>,
        /// The search radius.
        delta: f64,
        /// The hit, once found.
        hit: Option<NodeId>,
    },
    /// A delta-close search: all points within delta.
    DeltaClose {
        /// Subtree roots still to visit.
        stack: Vec<NodeId>,
        /// The search radius.
        delta: f64,
        /// Nodes found within delta, in visit order.
        results: Vec<NodeId>,
    },
}

impl<P: Clone> MetricTree<P> {
    /// Finds the point closest to `x`.
    ///
    /// # Panics
    ///
    /// If the tree is empty.
    pub fn nearest<O: DistanceLookup<P>>(&self, oracle: &O, x: &P) -> Outcome<P, NodeId> {
        assert!(!self.is_empty(), "nearest on an empty tree");
        let state = OpState::Nearest { stack: self.seed_stack(), best: f64::INFINITY, best_id: None };
        self.drive_search(oracle, x.clone(), state)
    }

    /// Resumes a suspended [`nearest`](Self::nearest).
    ///
    /// # Panics
    ///
    /// If the continuation does not belong to a nearest search.
    pub fn resume_nearest<O: DistanceLookup<P>>(&self, oracle: &O, continuation: Continuation<P>) -> Outcome<P, NodeId> {
        let (query, state) = continuation.into_parts();
        assert!(matches!(state, OpState::Nearest { .. }), "continuation does not belong to a nearest search");
        self.drive_search(oracle, query, state)
    }

    /// Finds the `k` points closest to `x`, closest first.
    ///
    /// Returns fewer than `k` points only when the tree holds fewer than `k`.
    ///
    /// # Panics
    ///
    /// If the tree is empty.
    pub fn k_nearest<O: DistanceLookup<P>>(&self, oracle: &O, x: &P, k: usize) -> Outcome<P, Vec<NodeId>> {
        assert!(!self.is_empty(), "k_nearest on an empty tree");
        let state = OpState::KNearest { stack: self.seed_stack(), k, best: BTreeSet::new() };
        self.drive_search(oracle, x.clone(), state)
    }

    /// Resumes a suspended [`k_nearest`](Self::k_nearest).
    ///
    /// # Panics
    ///
    /// If the continuation does not belong to a k-nearest search.
    pub fn resume_k_nearest<O: DistanceLookup<P>>(&self, oracle: &O, continuation: Continuation<P>) -> Outcome<P, Vec<NodeId>> {
        let (query, state) = continuation.into_parts();
        assert!(matches!(state, OpState::KNearest { .. }), "continuation does not belong to a k-nearest search");
        self.drive_search(oracle, query, state)
    }

    /// Finds *any* point within `delta` of `x`, or `None` if there is none.
    ///
    /// Short-circuits on the first hit, so it is much cheaper than
    /// [`delta_close`](Self::delta_close) when hits are common.
    pub fn aspiration<O: DistanceLookup<P>>(&self, oracle: &O, x: &P, delta: f64) -> Outcome<P, Option<NodeId>> {
        let state = OpState::Aspiration { stack: self.seed_stack(), delta, hit: None };
        self.drive_search(oracle, x.clone(), state)
    }

    /// Resumes a suspended [`aspiration`](Self::aspiration).
    ///
    /// # Panics
    ///
    /// If the continuation does not belong to an aspiration search.
    pub fn resume_aspiration<O: DistanceLookup<P>>(&self, oracle: &O, continuation: Continuation<P>) -> Outcome<P, Option<NodeId>> {
        let (query, state) = continuation.into_parts();
        assert!(matches!(state, OpState::Aspiration { .. }), "continuation does not belong to an aspiration search");
        self.drive_search(oracle, query, state)
    }

    /// Finds every point strictly within `delta` of `x`.
    pub fn delta_close<O: DistanceLookup<P>>(&self, oracle: &O, x: &P, delta: f64) -> Outcome<P, Vec<NodeId>> {
        let state = OpState::DeltaClose { stack: self.seed_stack(), delta, results: Vec::new() };
        self.drive_search(oracle, x.clone(), state)
    }

    /// Resumes a suspended [`delta_close`](Self::delta_close).
    ///
    /// # Panics
    ///
    /// If the continuation does not belong to a delta-close search.
    pub fn resume_delta_close<O: DistanceLookup<P>>(&self, oracle: &O, continuation: Continuation<P>) -> Outcome<P, Vec<NodeId>> {
        let (query, state) = continuation.into_parts();
        assert!(matches!(state, OpState::DeltaClose { .. }), "continuation does not belong to a delta-close search");
        self.drive_search(oracle, query, state)
    }

    /// The initial work stack: just the root, or nothing for an empty tree.
    fn seed_stack(&self) -> Vec<NodeId> {
        self.root().into_iter().collect()
    }

    /// Runs the search loop to completion or suspension, then shapes the
    /// final state into the operation's result type.
    fn drive_search<O: DistanceLookup<P>, T: FromSearch>(&self, oracle: &O, query: P, mut state: OpState) -> Outcome<P, T> {
        match self.run_search(oracle, &query, &mut state) {
            Err(missing) => Outcome::Suspended(Continuation::new(query, missing, state)),
            Ok(()) => Outcome::Done(T::from_search(state)),
        }
    }

    /// The search loop shared by all queries.
    ///
    /// `Ok(())` means the work stack drained (or the query short-circuited);
    /// `Err(missing)` means the step at the top of the stack needs the given
    /// distances and the state is parked mid-operation.
    fn run_search<O: DistanceLookup<P>>(&self, oracle: &O, query: &P, state: &mut OpState) -> Result<(), Vec<(P, P)>> {
        loop {
            match state {
                OpState::Insert { .. } => panic!("insert continuation passed to a search"),
                OpState::Nearest { stack, best, best_id } => {
                    let Some(&n) = stack.last() else { return Ok(()) };
                    let d = self.distance_to(oracle, query, n)?;
                    if d < *best {
                        *best = d;
                        *best_id = Some(n);
                    }
                    if d > *best + self.radius(n) {
                        stack.pop();
                        continue;
                    }
                    self.push_children(oracle, query, stack)?;
                }
                OpState::KNearest { stack, k, best } => {
                    let Some(&n) = stack.last() else { return Ok(()) };
                    let d = self.distance_to(oracle, query, n)?;
                    let worst = best.iter().next_back().map_or(f64::INFINITY, |&(w, _)| w.into_inner());
                    if best.len() == *k && d > worst + self.radius(n) {
                        stack.pop();
                        continue;
                    }
                    if best.len() < *k || d <= worst {
                        best.insert((OrderedFloat(d), n));
                    }
                    if best.len() > *k {
                        let _ = best.pop_last();
                    }
                    self.push_children(oracle, query, stack)?;
                }
                OpState::Aspiration { stack, delta, hit } => {
                    let Some(&n) = stack.last() else { return Ok(()) };
                    let d = self.distance_to(oracle, query, n)?;
                    if d < *delta {
                        *hit = Some(n);
                        stack.clear();
                        return Ok(());
                    }
                    if d > *delta + self.radius(n) {
                        stack.pop();
                        continue;
                    }
                    self.push_children(oracle, query, stack)?;
                }
                OpState::DeltaClose { stack, delta, results } => {
                    let Some(&n) = stack.last() else { return Ok(()) };
                    let d = self.distance_to(oracle, query, n)?;
                    if d < *delta && results.last() != Some(&n) {
                        results.push(n);
                    }
                    if d > *delta + self.radius(n) {
                        stack.pop();
                        continue;
                    }
                    self.push_children(oracle, query, stack)?;
                }
            }
        }
    }

    /// Looks up the distance from the query to `n`'s point, or reports the
    /// pair as missing.
    fn distance_to<O: DistanceLookup<P>>(&self, oracle: &O, query: &P, n: NodeId) -> Result<f64, Vec<(P, P)>> {
        oracle
            .lookup(query, self.point(n))
            .ok_or_else(|| vec![(query.clone(), self.point(n).clone())])
    }

    /// Replaces the top of the stack with its children, closer child on top.
    ///
    /// A leaf is simply popped; a single child needs no distance; two
    /// children are ordered by their distances to the query, and the first
    /// miss suspends the step with the top still in place.
    fn push_children<O: DistanceLookup<P>>(&self, oracle: &O, query: &P, stack: &mut Vec<NodeId>) -> Result<(), Vec<(P, P)>> {
        let n = stack.last().copied().map_or_else(|| unreachable!("push_children on an empty stack"), |n| n);
        match (self.left(n), self.right(n)) {
            (None, None) => {
                stack.pop();
            }
            (Some(c), None) | (None, Some(c)) => {
                stack.pop();
                stack.push(c);
            }
            (Some(l), Some(r)) => {
                let Some(to_l) = oracle.lookup(query, self.point(l)) else {
                    return Err(vec![(query.clone(), self.point(l).clone())]);
                };
                let Some(to_r) = oracle.lookup(query, self.point(r)) else {
                    return Err(vec![(query.clone(), self.point(r).clone())]);
                };
                stack.pop();
                if to_l < to_r {
                    stack.push(r);
                    stack.push(l);
                } else {
                    stack.push(l);
                    stack.push(r);
                }
            }
        }
        Ok(())
    }
}

/// Shapes a drained [`OpState`] into the operation's result type.
trait FromSearch: Sized {
    /// Extracts the result from the final state.
    fn from_search(state: OpState) -> Self;
}

impl FromSearch for NodeId {
    fn from_search(state: OpState) -> Self {
        match state {
            OpState::Nearest { best_id, .. } => {
                best_id.map_or_else(|| unreachable!("nearest on a non-empty tree always finds a point"), |id| id)
            }
            _ => unreachable!("state does not produce a single node"),
        }
    }
}

impl FromSearch for Vec<NodeId> {
    fn from_search(state: OpState) -> Self {
        match state {
            // The best set iterates in ascending (distance, id) order.
            OpState::KNearest { best, .. } => best.into_iter().map(|(_, id)| id).collect(),
            OpState::DeltaClose { results, .. } => results,
            _ => unreachable!("state does not produce a node list"),
        }
    }
}

impl FromSearch for Option<NodeId> {
    fn from_search(state: OpState) -> Self {
        match state {
            OpState::Aspiration { hit, .. } => hit,
            _ => unreachable!("state does not produce an optional node"),
        }
    }
}
