//! Shared plumbing for the `subsample` and `compute-distances` binaries:
//! the persistence-diagram point type, the JSON configuration surface, the
//! output writers, and logging setup.

pub mod logging;
pub mod output;
pub mod point;
pub mod samples;
