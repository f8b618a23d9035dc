//! The memoizing distance oracle.
//!
//! Tree operations never call the distance function directly. They ask an
//! oracle, and a [`CachingOracle`] only answers from its cache: a miss is the
//! signal for the operation to suspend itself into a continuation until the
//! coordinator has shipped the pair to a worker and cached the reply. The
//! [`Resolved`] wrapper is the straight-through alternative that computes
//! synchronously and never misses.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::plugin::{DistanceFn, SamplePoint};

/// The lookup seam the metric tree sees.
///
/// `None` is the miss signal. It is not an error: the caller records the pair
/// on its continuation and suspends.
pub trait DistanceLookup<P> {
    /// Returns the distance between `x` and `y`, or `None` if it is not yet
    /// known.
    fn lookup(&self, x: &P, y: &P) -> Option<f64>;
}

/// Telemetry counters for a [`CachingOracle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleStats {
    /// Total number of lookups.
    pub lookups: u64,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed and suspended their caller.
    pub misses: u64,
    /// Number of entries currently cached.
    pub cached: usize,
}

/// A memoizing wrapper over the user distance function.
///
/// The cache is keyed by the ordered pair of point ids and stores the exact
/// key it was written with; callers that want symmetry cache both
/// orientations. One mutex guards the map, so the oracle may be queried from
/// the driver while the coordinator's accept path installs results.
pub struct CachingOracle<P, D> {
    /// Memoized distances, keyed by ordered id pair.
    cache: Mutex<HashMap<(i64, i64), f64>>,
    /// The wrapped distance function. Only [`compute`](Self::compute) calls
    /// it; lookups are cache-only.
    distance: D,
    /// Total number of lookups.
    lookups: AtomicU64,
    /// Lookups that found a cached value.
    hits: AtomicU64,
    _marker: PhantomData<fn(&P)>,
}

impl<P: SamplePoint, D: DistanceFn<P>> CachingOracle<P, D> {
    /// Creates an oracle with an empty cache over the given distance function.
    pub fn new(distance: D) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            distance,
            lookups: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    /// Invokes the underlying distance function synchronously.
    ///
    /// This is the worker-side entry point; the coordinator side only ever
    /// looks up and caches.
    pub fn compute(&self, x: &P, y: &P) -> f64 {
        self.distance.distance(x, y)
    }

    /// Installs a computed distance.
    ///
    /// After this returns, any subsequent lookup of `(x, y)` returns `d`.
    pub fn cache(&self, x: &P, y: &P, d: f64) {
        let mut cache = lock(&self.cache);
        cache.insert((x.id(), y.id()), d);
    }

    /// Returns a snapshot of the telemetry counters.
    pub fn stats(&self) -> OracleStats {
        // Hits are read first: lookups only grow, so the difference cannot
        // go negative under concurrent queries.
        let hits = self.hits.load(Ordering::Relaxed);
        let lookups = self.lookups.load(Ordering::Relaxed);
        OracleStats {
            lookups,
            hits,
            misses: lookups - hits,
            cached: lock(&self.cache).len(),
        }
    }
}

impl<P: SamplePoint, D: DistanceFn<P>> DistanceLookup<P> for CachingOracle<P, D> {
    fn lookup(&self, x: &P, y: &P) -> Option<f64> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let cache = lock(&self.cache);
        let found = cache.get(&(x.id(), y.id())).copied();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }
}

/// An oracle that computes every distance on the spot and never misses.
///
/// This is the straight-through mode: tree operations run to completion in
/// one call, with no coordinator or workers involved. Tests and small inputs
/// use it; it is also what makes the resumption law checkable, since the same
/// operation can be run both ways.
pub struct Resolved<D>(pub D);

impl<P, D: DistanceFn<P>> DistanceLookup<P> for Resolved<D> {
    fn lookup(&self, x: &P, y: &P) -> Option<f64> {
        Some(self.0.distance(x, y))
    }
}

/// Locks a mutex, treating a poisoned lock as fatal.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().map_or_else(|_| panic!("oracle mutex poisoned"), |guard| guard)
}
