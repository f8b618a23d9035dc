//! Persistence diagrams and distances between them.
//!
//! A persistence diagram is a multiset of (birth, death) pairs from
//! topological data analysis. Two diagrams are compared by matching their
//! generators, with unmatched generators paying the cost of their projection
//! onto the diagonal:
//!
//! - [`bottleneck`]: the smallest achievable *maximum* matched cost.
//! - [`wasserstein`]: the smallest achievable *p-norm* of matched costs.
//!
//! Both come in exact and ε-approximate flavors; the approximate flavors
//! trade precision for time on large diagrams.

mod bottleneck;
mod diagram;
mod wasserstein;

pub use bottleneck::{bottleneck, bottleneck_approx};
pub use diagram::{Generator, PersistenceDiagram};
pub use wasserstein::{wasserstein, wasserstein_approx};
