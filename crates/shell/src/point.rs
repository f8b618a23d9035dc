//! The concrete point type the binaries subsample: a tuple of persistence
//! diagrams, compared slot by slot.

use persistence::{bottleneck, bottleneck_approx, wasserstein, wasserstein_approx, PersistenceDiagram};
use serde::{Deserialize, Serialize};
use subsample::{DistanceFn, SamplePoint};

/// One sample: a tuple of persistence diagrams with a stable identity.
///
/// The id is the index of the sample in the input file, before shuffling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramTuple {
    /// Index of the sample in the input file.
    pub id: i64,
    /// The persistence diagrams making up the sample.
    pub diagrams: Vec<PersistenceDiagram>,
}

impl SamplePoint for DiagramTuple {
    fn id(&self) -> i64 {
        self.id
    }
}

/// Distance between diagram tuples.
///
/// With `p = ∞`, slots are compared by Bottleneck distance and the tuple
/// distance is their maximum; with finite `p`, slots are compared by
/// Wasserstein-p and aggregated in the p-norm. `approx = 0` selects the
/// exact computations, `approx > 0` the ε-approximate ones with
/// `ε = approx`.
#[derive(Debug, Clone, Copy)]
pub struct TupleDistance {
    /// The order of the distance; `∞` selects Bottleneck semantics.
    pub p: f64,
    /// Approximation error, or `0` for exact.
    pub approx: f64,
}

impl TupleDistance {
    /// An exact distance of the given order.
    #[must_use]
    pub const fn exact(p: f64) -> Self {
        Self { p, approx: 0.0 }
    }

    /// The distance between two diagram slots.
    fn slot(&self, a: &PersistenceDiagram, b: &PersistenceDiagram) -> f64 {
        if self.p.is_infinite() {
            if self.approx == 0.0 { bottleneck(a, b) } else { bottleneck_approx(a, b, self.approx) }
        } else if self.approx == 0.0 {
            wasserstein(a, b, self.p)
        } else {
            wasserstein_approx(a, b, self.p, self.approx)
        }
    }
}

impl DistanceFn<DiagramTuple> for TupleDistance {
    fn distance(&self, x: &DiagramTuple, y: &DiagramTuple) -> f64 {
        assert_eq!(x.diagrams.len(), y.diagrams.len(), "samples {} and {} have different tuple arities", x.id, y.id);
        if self.p.is_infinite() {
            x.diagrams
                .iter()
                .zip(&y.diagrams)
                .map(|(a, b)| self.slot(a, b))
                .fold(0.0, f64::max)
        } else {
            let sum: f64 = x.diagrams.iter().zip(&y.diagrams).map(|(a, b)| libm::pow(self.slot(a, b), self.p)).sum();
            libm::pow(sum, 1.0 / self.p)
        }
    }
}
