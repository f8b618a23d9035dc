//! Subsampling of large point sets in expensive metric spaces.
//!
//! Given a set of points and a distance function, the engine selects a
//! δ-sparse, δ-dense subset: every two retained points are at least δ apart,
//! and every discarded point has a retained point within δ. The intended use
//! is topological data analysis, where points are persistence diagrams and
//! the distance (Bottleneck, Wasserstein-p) is arbitrarily expensive.
//!
//! The engine never calls the distance function inline. Tree operations
//! consult a memoizing [`oracle`](crate::oracle); a cache miss suspends the
//! operation into a [`Continuation`] which the [`driver`](crate::driver)
//! parks until a worker has computed the missing distances. One coordinator
//! process drives the [`subsampler`](crate::subsampler) pipeline and ships
//! distance jobs to workers over a [`Transport`](crate::transport::Transport).
//!
//! The moving parts, leaves first:
//!
//! - [`tree`]: a vantage-point binary metric tree with resumable
//!   branch-and-bound queries.
//! - [`oracle`]: the memoizing distance oracle.
//! - [`driver`]: runs a batch of resumable operations, gathering the
//!   distance pairs they are stuck on.
//! - [`subsampler`]: the cohort pipeline (aspiration filter, candidate tree,
//!   δ-close adjacency, greedy maximal independent set, install).
//! - [`coordinator`] and [`transport`]: the coordinator/worker message loop.

pub mod coordinator;
pub mod driver;
pub mod message;
pub mod oracle;
mod plugin;
pub mod subsampler;
pub mod transport;
pub mod tree;

pub use message::Message;
pub use oracle::{CachingOracle, DistanceLookup, OracleStats, Resolved};
pub use plugin::{DistanceFn, PointSource, ResultSink, SamplePoint};
pub use subsampler::Subsampler;
pub use tree::{Continuation, MetricTree, NodeId, Outcome};
