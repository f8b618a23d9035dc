//! A binary metric tree with resumable branch-and-bound queries.
//!
//! The tree organizes points in a metric space using nothing but pairwise
//! distances. Each node records the maximum distance from its point to
//! anything in its subtree; searches use that radius and the triangle
//! inequality to prune whole subtrees.
//!
//! Every operation is resumable: distances come from a
//! [`DistanceLookup`](crate::oracle::DistanceLookup), and when a lookup
//! misses the operation returns [`Outcome::Suspended`] carrying a
//! [`Continuation`] with the pair it is stuck on. Re-entering with the
//! continuation once that pair is cached picks the operation up exactly
//! where it left off.

use std::fmt::Write as _;

use crate::oracle::DistanceLookup;

mod search;

pub use search::{Continuation, Outcome};
pub(crate) use search::OpState;

/// The identity of a node, dense in insertion order. The root is id 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// The insertion order of the node, usable as an index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One node of the tree. Points live in a parallel array in the tree itself.
#[derive(Debug, Clone)]
struct Node {
    /// Left child, if any.
    left: Option<NodeId>,
    /// Right child, if any.
    right: Option<NodeId>,
    /// Parent; `None` only for the root.
    parent: Option<NodeId>,
    /// Maximum observed distance from this node's point to any descendant.
    radius: f64,
}

/// Which child slot of a parent an insertion fills.
enum Side {
    /// The left child slot.
    Left,
    /// The right child slot.
    Right,
}

/// A vantage-point binary tree over a metric space.
///
/// The tree is an arena: nodes are stored in a flat vector in insertion
/// order and refer to each other by [`NodeId`]. It grows monotonically;
/// deletion is not supported.
pub struct MetricTree<P> {
    /// The inserted points, in insertion order.
    points: Vec<P>,
    /// The node records, parallel to `points`.
    nodes: Vec<Node>,
}

impl<P> Default for MetricTree<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> MetricTree<P> {
    /// Creates an empty tree.
    #[must_use]
    pub const fn new() -> Self {
        Self { points: Vec::new(), nodes: Vec::new() }
    }

    /// Number of points in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the tree has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The root node, or `None` if the tree is empty.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        if self.nodes.is_empty() { None } else { Some(NodeId(0)) }
    }

    /// The point stored at `n`.
    ///
    /// # Panics
    ///
    /// If `n` is not a node of this tree.
    #[must_use]
    pub fn point(&self, n: NodeId) -> &P {
        &self.points[n.index()]
    }

    /// The maximum distance from `n`'s point to anything in its subtree, as
    /// observed so far.
    ///
    /// # Panics
    ///
    /// If `n` is not a node of this tree.
    #[must_use]
    pub fn radius(&self, n: NodeId) -> f64 {
        self.nodes[n.index()].radius
    }

    /// The left child of `n`, if any.
    ///
    /// # Panics
    ///
    /// If `n` is not a node of this tree.
    #[must_use]
    pub fn left(&self, n: NodeId) -> Option<NodeId> {
        self.nodes[n.index()].left
    }

    /// The right child of `n`, if any.
    ///
    /// # Panics
    ///
    /// If `n` is not a node of this tree.
    #[must_use]
    pub fn right(&self, n: NodeId) -> Option<NodeId> {
        self.nodes[n.index()].right
    }

    /// The parent of `n`; `None` for the root.
    ///
    /// # Panics
    ///
    /// If `n` is not a node of this tree.
    #[must_use]
    pub fn parent(&self, n: NodeId) -> Option<NodeId> {
        self.nodes[n.index()].parent
    }

    /// Whether `n` has no children.
    ///
    /// # Panics
    ///
    /// If `n` is not a node of this tree.
    #[must_use]
    pub fn is_leaf(&self, n: NodeId) -> bool {
        let node = &self.nodes[n.index()];
        node.left.is_none() && node.right.is_none()
    }

    /// All node ids, in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|i| NodeId(i as u32))
    }

    /// The points of the tree, in insertion order.
    #[must_use]
    pub fn points(&self) -> &[P] {
        &self.points
    }

    /// Consumes the tree and returns its points in insertion order.
    #[must_use]
    pub fn into_points(self) -> Vec<P> {
        self.points
    }

    /// Renders the tree as a graphviz digraph, labeling each node with
    /// `label` of its point and its radius.
    pub fn to_graphviz<F: Fn(&P) -> String>(&self, label: F) -> String {
        let mut out = String::from("digraph G {\n");
        for (i, node) in self.nodes.iter().enumerate() {
            let _ = writeln!(out, "{i} [label=\"{}\\n{}\"]", label(&self.points[i]), node.radius);
            if let Some(l) = node.left {
                let _ = writeln!(out, "{i} -> {}", l.index());
            }
            if let Some(r) = node.right {
                let _ = writeln!(out, "{i} -> {}", r.index());
            }
        }
        out.push_str("}\n");
        out
    }

    /// Appends a node, wiring it into the given child slot of `parent`.
    fn attach(&mut self, parent: Option<NodeId>, side: &Side, x: P) -> NodeId {
        let id = u32::try_from(self.nodes.len()).map_or_else(|_| panic!("metric tree capacity exceeded"), NodeId);
        self.points.push(x);
        self.nodes.push(Node { left: None, right: None, parent, radius: 0.0 });
        if let Some(p) = parent {
            match side {
                Side::Left => self.nodes[p.index()].left = Some(id),
                Side::Right => self.nodes[p.index()].right = Some(id),
            }
        }
        id
    }
}

impl<P: Clone> MetricTree<P> {
    /// Inserts `x`, returning its new node id.
    ///
    /// Starting at the root, the insertion updates each visited node's radius
    /// with the distance to `x`, fills an empty child slot when `x` is closer
    /// to the node than to its occupied child, and otherwise descends into
    /// the closer child (ties go left).
    ///
    /// A distance miss suspends the insertion; resume it with
    /// [`resume_insert`](Self::resume_insert).
    pub fn insert<O: DistanceLookup<P>>(&mut self, oracle: &O, x: P) -> Outcome<P, NodeId> {
        let cursor = self.root();
        self.drive_insert(oracle, x, cursor)
    }

    /// Resumes a suspended insertion.
    ///
    /// # Panics
    ///
    /// If the continuation does not belong to an insertion on this tree.
    pub fn resume_insert<O: DistanceLookup<P>>(&mut self, oracle: &O, continuation: Continuation<P>) -> Outcome<P, NodeId> {
        let (query, state) = continuation.into_parts();
        let OpState::Insert { cursor } = state else {
            panic!("continuation does not belong to an insertion")
        };
        self.drive_insert(oracle, query, cursor)
    }

    /// Runs the insertion loop from `cursor` down to an attachment point.
    ///
    /// The distance from `x` to the cursor is always re-read from the oracle
    /// on entry, so a resumed insertion re-runs its interrupted step from the
    /// top; the radius update is idempotent.
    fn drive_insert<O: DistanceLookup<P>>(&mut self, oracle: &O, x: P, cursor: Option<NodeId>) -> Outcome<P, NodeId> {
        let Some(mut cur) = cursor else {
            // Empty tree: x becomes the root.
            return Outcome::Done(self.attach(None, &Side::Left, x));
        };

        let suspend = |x: &P, cur: NodeId, missing: Vec<(P, P)>| {
            Outcome::Suspended(Continuation::new(x.clone(), missing, OpState::Insert { cursor: Some(cur) }))
        };

        let Some(mut b) = oracle.lookup(&x, self.point(cur)) else {
            let missing = vec![(x.clone(), self.point(cur).clone())];
            return suspend(&x, cur, missing);
        };

        loop {
            let node = &mut self.nodes[cur.index()];
            node.radius = node.radius.max(b);
            match (node.left, node.right) {
                (None, None) => return Outcome::Done(self.attach(Some(cur), &Side::Left, x)),
                (None, Some(r)) => {
                    let a = b;
                    let Some(to_r) = oracle.lookup(&x, self.point(r)) else {
                        let missing = vec![(x.clone(), self.point(r).clone())];
                        return suspend(&x, cur, missing);
                    };
                    if a <= to_r {
                        return Outcome::Done(self.attach(Some(cur), &Side::Left, x));
                    }
                    cur = r;
                    b = to_r;
                }
                (Some(l), None) => {
                    let a = b;
                    let Some(to_l) = oracle.lookup(&x, self.point(l)) else {
                        let missing = vec![(x.clone(), self.point(l).clone())];
                        return suspend(&x, cur, missing);
                    };
                    if a <= to_l {
                        return Outcome::Done(self.attach(Some(cur), &Side::Right, x));
                    }
                    cur = l;
                    b = to_l;
                }
                (Some(l), Some(r)) => {
                    let Some(to_l) = oracle.lookup(&x, self.point(l)) else {
                        let missing = vec![(x.clone(), self.point(l).clone())];
                        return suspend(&x, cur, missing);
                    };
                    let Some(to_r) = oracle.lookup(&x, self.point(r)) else {
                        let missing = vec![(x.clone(), self.point(r).clone())];
                        return suspend(&x, cur, missing);
                    };
                    if to_l <= to_r {
                        cur = l;
                        b = to_l;
                    } else {
                        cur = r;
                        b = to_r;
                    }
                }
            }
        }
    }
}
