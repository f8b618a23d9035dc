//! The driver that runs batches of resumable operations.
//!
//! [`parallel`] evaluates one resumable functor over a list of sample
//! indices. Operations that suspend on uncached distances are parked; their
//! missing pairs go to the coordinator through the shared
//! [`work_items`](SharedQueues) queue, and the coordinator wakes each
//! operation by pushing its index back onto `ready` once the distances have
//! been cached. The driver runs on the subsampler thread; the coordinator's
//! event loop runs in the main thread; these two queues are the only things
//! they share besides the oracle.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::tree::{Continuation, Outcome};

/// A distance computation requested by a suspended operation.
#[derive(Debug)]
pub struct WorkItem<P> {
    /// Index (within the current batch) of the operation that is stuck.
    pub op: usize,
    /// One endpoint of the needed distance.
    pub x: P,
    /// The other endpoint.
    pub y: P,
}

/// The two queues shared between the driver and the coordinator.
///
/// Both are stacks under their own mutex; there is no nested locking.
pub struct SharedQueues<P> {
    /// Operation indices ready to start or resume.
    ready: Mutex<Vec<usize>>,
    /// Distance pairs awaiting dispatch to a worker.
    work_items: Mutex<Vec<WorkItem<P>>>,
}

impl<P> Default for SharedQueues<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> SharedQueues<P> {
    /// Creates a pair of empty queues.
    #[must_use]
    pub const fn new() -> Self {
        Self { ready: Mutex::new(Vec::new()), work_items: Mutex::new(Vec::new()) }
    }

    /// Marks an operation index ready to resume.
    pub fn push_ready(&self, n: usize) {
        lock(&self.ready, "ready").push(n);
    }

    /// Pops a ready operation index, if any.
    pub fn pop_ready(&self) -> Option<usize> {
        lock(&self.ready, "ready").pop()
    }

    /// Whether no operation is currently ready.
    #[must_use]
    pub fn ready_is_empty(&self) -> bool {
        lock(&self.ready, "ready").is_empty()
    }

    /// Queues a distance pair for dispatch.
    pub fn push_work(&self, item: WorkItem<P>) {
        lock(&self.work_items, "work_items").push(item);
    }

    /// Pops a queued distance pair, if any.
    pub fn pop_work(&self) -> Option<WorkItem<P>> {
        lock(&self.work_items, "work_items").pop()
    }
}

/// A resumable operation over a fixed tree and sample array.
///
/// `begin` runs the operation on a pristine sample index; `resume` re-enters
/// it with the continuation it suspended with. The driver guarantees that
/// `resume` is only called once every pair the continuation reported missing
/// has been cached.
pub trait Resumable<P> {
    /// What a completed operation yields.
    type Output;

    /// Starts the operation on the sample at `sample_index`.
    fn begin(&mut self, sample_index: usize) -> Outcome<P, Self::Output>;

    /// Re-enters a suspended operation.
    fn resume(&mut self, continuation: Continuation<P>) -> Outcome<P, Self::Output>;
}

/// Runs `f` over every index in `arguments`, interleaving suspended
/// operations, and returns their results in argument order.
///
/// Operations that suspend have their missing pairs drained into
/// `work_items`; the continuation is stashed *before* the pairs are queued,
/// so by the time the coordinator can possibly push the index back onto
/// `ready`, the stash is in place. When nothing is ready but work remains
/// outstanding, the driver sleeps an exponential backoff from 1 µs to 1 s.
///
/// # Panics
///
/// If the ready queue is non-empty on entry: stages are strict barriers, and
/// leftover readiness means the previous stage did not finish.
pub fn parallel<P, F: Resumable<P>>(queues: &SharedQueues<P>, f: &mut F, arguments: &[usize]) -> Vec<F::Output> {
    assert!(queues.ready_is_empty(), "did not finish previous stage");

    let mut results: Vec<Option<F::Output>> = arguments.iter().map(|_| None).collect();
    let mut continuations: HashMap<usize, Continuation<P>> = HashMap::new();
    let mut completed = 0;

    {
        let mut ready = lock(&queues.ready, "ready");
        ready.extend(0..arguments.len());
    }

    let mut backoff = Backoff::new();
    while completed < arguments.len() {
        let Some(n) = queues.pop_ready() else {
            backoff.sleep();
            continue;
        };
        backoff.reset();

        let outcome = match continuations.remove(&n) {
            None => f.begin(arguments[n]),
            Some(continuation) => f.resume(continuation),
        };

        match outcome {
            Outcome::Done(value) => {
                results[n] = Some(value);
                completed += 1;
            }
            Outcome::Suspended(mut continuation) => {
                let missing = continuation.take_missing();
                continuations.insert(n, continuation);
                for (x, y) in missing {
                    queues.push_work(WorkItem { op: n, x, y });
                }
            }
        }
    }

    results
        .into_iter()
        .map(|r| r.map_or_else(|| unreachable!("every index completed"), |value| value))
        .collect()
}

/// Exponential backoff sleeper, 1 µs doubling up to 1 s.
pub(crate) struct Backoff {
    /// Current delay in microseconds.
    delay_us: u64,
}

impl Backoff {
    /// Longest delay, in microseconds.
    const MAX_US: u64 = 1_000_000;

    /// Starts at the shortest delay.
    pub(crate) const fn new() -> Self {
        Self { delay_us: 1 }
    }

    /// Sleeps the current delay, then doubles it up to the cap.
    pub(crate) fn sleep(&mut self) {
        std::thread::sleep(Duration::from_micros(self.delay_us));
        if self.delay_us < Self::MAX_US {
            self.delay_us *= 2;
        }
    }

    /// Drops back to the shortest delay after productive work.
    pub(crate) fn reset(&mut self) {
        self.delay_us = 1;
    }
}

/// Locks a queue mutex, treating a poisoned lock as fatal.
fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    mutex.lock().map_or_else(|_| panic!("{name} mutex poisoned"), |guard| guard)
}
