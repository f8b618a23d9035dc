//! The seams between the engine and its embedder.
//!
//! The engine is generic over the point type, the distance function, the
//! source of input points, and the destination of results. Everything it
//! needs from each collaborator is captured by one trait here.

use serde::{de::DeserializeOwned, Serialize};

/// A point in the metric space being subsampled.
///
/// The payload is opaque to the engine. It must be cloneable (continuations
/// snapshot the query point), comparable for equality, serializable (distance
/// jobs ship both endpoints to a worker), and carry a stable integer identity
/// that is unique per input point. In practice the id is the index of the
/// point in the original, unshuffled input.
pub trait SamplePoint: Clone + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// The stable identity of this point, used as the distance-cache key.
    fn id(&self) -> i64;
}

/// A distance function on points.
///
/// Must be a metric: symmetric, zero on the diagonal, and satisfying the
/// triangle inequality. It is *not* assumed to be cheap; the entire engine
/// exists to call it as rarely as possible.
///
/// A blanket implementation covers plain closures, so tests and embedders can
/// pass `|x, y| ...` directly.
pub trait DistanceFn<P>: Send + Sync {
    /// Returns the distance between `x` and `y`.
    fn distance(&self, x: &P, y: &P) -> f64;
}

impl<P, F: Fn(&P, &P) -> f64 + Send + Sync> DistanceFn<P> for F {
    fn distance(&self, x: &P, y: &P) -> f64 {
        self(x, y)
    }
}

/// A source of input points.
pub trait PointSource<P> {
    /// Produces the full sample array, in input order.
    ///
    /// # Errors
    ///
    /// If the underlying storage cannot be read or parsed.
    fn points(&self) -> Result<Vec<P>, String>;
}

/// A destination for finished results.
///
/// The subsample job hands a `ResultSink<P>` the retained points; the
/// distance-matrix job hands a `ResultSink<f64>` the upper-triangular matrix
/// entries in row-major order.
pub trait ResultSink<T> {
    /// Consumes the finished results.
    ///
    /// # Errors
    ///
    /// If the results cannot be written.
    fn accept(&mut self, results: &[T]) -> Result<(), String>;
}
