//! The coordinator/worker roles and the loop that drives them.
//!
//! One coordinator prepares jobs and accepts results; stateless workers turn
//! jobs into results. Jobs and results are [`Message`]s with two encodings:
//!
//! - Timer: `(tag=0)`. The worker sleeps a growing backoff and echoes the
//!   tag. Timer jobs keep the worker pool employed while the subsampler has
//!   produced no distance requests yet.
//! - Distance: `(tag=1, op, x, y)`. The worker computes `d(x, y)` and
//!   replies `(tag=1, op, x, y, d)`.
//!
//! [`SubsampleCoordinator`] runs the subsampling pipeline on a background
//! thread and feeds its distance requests to the workers;
//! [`MatrixCoordinator`] enumerates the upper-triangular pairs of a point
//! set. Both are driven by [`run`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::driver::{Backoff, SharedQueues};
use crate::message::Message;
use crate::oracle::CachingOracle;
use crate::plugin::{DistanceFn, ResultSink, SamplePoint};
use crate::subsampler::Subsampler;
use crate::transport::Transport;

/// Job/reply tag for timer messages.
pub const TAG_TIMER: i64 = 0;
/// Job/reply tag for distance messages.
pub const TAG_DISTANCE: i64 = 1;

/// What [`Coordinator::prepare`] produced.
pub enum Prepared {
    /// A job to dispatch to a worker.
    Job(Message),
    /// No job will ever be produced again.
    Done,
}

/// The coordinator role: prepares jobs, accepts results, finalizes output.
pub trait Coordinator {
    /// Produces the next job, or signals that the run is over.
    ///
    /// # Errors
    ///
    /// On unrecoverable coordinator-side failures.
    fn prepare(&mut self) -> Result<Prepared, String>;

    /// Consumes one worker reply.
    ///
    /// # Errors
    ///
    /// On a malformed reply; the run aborts.
    fn accept(&mut self, result: Message) -> Result<(), String>;

    /// Consumes the finished state once every reply has been accepted.
    ///
    /// # Errors
    ///
    /// If the results cannot be delivered.
    fn finalize(&mut self) -> Result<(), String>;
}

/// The worker role: turns one job into one result.
pub trait Worker {
    /// Processes one job.
    ///
    /// # Errors
    ///
    /// On a malformed job, or any failure inside the distance function; the
    /// error propagates to the coordinator and aborts the run.
    fn work(&mut self, job: Message) -> Result<Message, String>;
}

/// Drives a coordinator against a transport until completion.
///
/// The loop keeps every idle worker busy with `prepare`d jobs, blocks for one
/// result at a time, and `accept`s it. Once `prepare` signals `Done`,
/// outstanding replies are drained and `finalize` runs. The dispatch
/// discipline is one outstanding job per worker.
///
/// # Errors
///
/// The first error from `prepare`, `accept`, the transport, or a worker
/// aborts the run; there is no recovery policy.
pub fn run<C: Coordinator, T: Transport>(coordinator: &mut C, transport: &mut T) -> Result<(), String> {
    let mut outstanding = 0_usize;
    let mut done = false;
    loop {
        while !done && transport.idle() > 0 {
            match coordinator.prepare()? {
                Prepared::Job(job) => {
                    transport.dispatch(job)?;
                    outstanding += 1;
                }
                Prepared::Done => done = true,
            }
        }
        if outstanding == 0 {
            break;
        }
        let result = transport.collect()?;
        outstanding -= 1;
        coordinator.accept(result)?;
    }
    coordinator.finalize()
}

/// A stateless distance worker.
///
/// Holds its own copy of the distance function; the only state it carries
/// across jobs is the timer backoff.
pub struct DistanceWorker<P, D> {
    /// The distance function.
    distance: D,
    /// Backoff for timer jobs; reset by real work.
    delay: Backoff,
    _marker: std::marker::PhantomData<fn(&P)>,
}

impl<P, D> DistanceWorker<P, D> {
    /// Creates a worker around the given distance function.
    pub const fn new(distance: D) -> Self {
        Self { distance, delay: Backoff::new(), _marker: std::marker::PhantomData }
    }
}

impl<P: SamplePoint, D: DistanceFn<P>> Worker for DistanceWorker<P, D> {
    fn work(&mut self, mut job: Message) -> Result<Message, String> {
        let tag: i64 = job.pop()?;
        let mut reply = Message::new();
        match tag {
            TAG_TIMER => {
                self.delay.sleep();
                reply.push(&TAG_TIMER);
            }
            TAG_DISTANCE => {
                self.delay.reset();
                let op: i64 = job.pop()?;
                let x: P = job.pop()?;
                let y: P = job.pop()?;
                let d = self.distance.distance(&x, &y);
                reply.push(&TAG_DISTANCE);
                reply.push(&op);
                reply.push(&x);
                reply.push(&y);
                reply.push(&d);
            }
            other => return Err(format!("unknown job tag {other}")),
        }
        Ok(reply)
    }
}

/// The coordinator for a subsampling job.
///
/// Construction starts the [`Subsampler`] on a background thread. `prepare`
/// turns queued work items into distance jobs, or timer jobs while the
/// pipeline is between requests; `accept` caches distance replies and wakes
/// the requesting operation; `finalize` joins the pipeline thread and hands
/// the subsample to the sink.
pub struct SubsampleCoordinator<P, D, S> {
    /// Queues shared with the background subsampler thread.
    queues: Arc<SharedQueues<P>>,
    /// The oracle shared with the background subsampler thread.
    oracle: Arc<CachingOracle<P, D>>,
    /// Set by the subsampler thread when the pipeline has finished.
    done: Arc<AtomicBool>,
    /// The running pipeline; taken by `finalize`.
    pipeline: Option<JoinHandle<Vec<P>>>,
    /// Where the subsample goes.
    sink: S,
}

impl<P, D, S> SubsampleCoordinator<P, D, S>
where
    P: SamplePoint,
    D: DistanceFn<P> + 'static,
    S: ResultSink<P>,
{
    /// Starts the pipeline over the given samples.
    ///
    /// `seed` controls the one-shot shuffle; `cohort_size` bounds each
    /// cohort.
    pub fn new(samples: Vec<P>, delta: f64, distance: D, sink: S, cohort_size: usize, seed: u64) -> Self {
        let queues = Arc::new(SharedQueues::new());
        let oracle = Arc::new(CachingOracle::new(distance));
        let done = Arc::new(AtomicBool::new(false));

        let pipeline = {
            let queues = Arc::clone(&queues);
            let oracle = Arc::clone(&oracle);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let subsampler = Subsampler::new(samples, delta, oracle).cohort_size(cohort_size).seed(seed);
                let subsample = subsampler.run(&queues);
                done.store(true, Ordering::SeqCst);
                subsample
            })
        };

        Self { queues, oracle, done, pipeline: Some(pipeline), sink }
    }

    /// The oracle shared with the pipeline, for telemetry.
    #[must_use]
    pub fn oracle(&self) -> &CachingOracle<P, D> {
        &self.oracle
    }
}

impl<P, D, S> Coordinator for SubsampleCoordinator<P, D, S>
where
    P: SamplePoint,
    D: DistanceFn<P> + 'static,
    S: ResultSink<P>,
{
    fn prepare(&mut self) -> Result<Prepared, String> {
        if self.done.load(Ordering::SeqCst) {
            return Ok(Prepared::Done);
        }
        if self.pipeline.as_ref().is_some_and(JoinHandle::is_finished) && !self.done.load(Ordering::SeqCst) {
            return Err("subsampler thread terminated without completing".to_string());
        }
        let mut job = Message::new();
        match self.queues.pop_work() {
            Some(item) => {
                job.push(&TAG_DISTANCE);
                job.push(&i64_from(item.op)?);
                job.push(&item.x);
                job.push(&item.y);
            }
            None => job.push(&TAG_TIMER),
        }
        Ok(Prepared::Job(job))
    }

    fn accept(&mut self, mut result: Message) -> Result<(), String> {
        let tag: i64 = result.pop()?;
        match tag {
            TAG_TIMER => Ok(()),
            TAG_DISTANCE => {
                let op: i64 = result.pop()?;
                let x: P = result.pop()?;
                let y: P = result.pop()?;
                let d: f64 = result.pop()?;
                self.oracle.cache(&x, &y, d);
                self.queues.push_ready(usize_from(op)?);
                Ok(())
            }
            other => Err(format!("unknown reply tag {other}")),
        }
    }

    fn finalize(&mut self) -> Result<(), String> {
        let pipeline = self.pipeline.take().ok_or_else(|| "subsample job already finalized".to_string())?;
        let subsample = pipeline.join().map_err(|_| "subsampler thread panicked".to_string())?;
        let stats = self.oracle.stats();
        ftlog::info!(
            "distance cache: {} lookups, {} hits, {} misses, {} entries",
            stats.lookups,
            stats.hits,
            stats.misses,
            stats.cached,
        );
        self.sink.accept(&subsample)
    }
}

/// The coordinator for a distance-matrix job.
///
/// Enumerates the pairs `i < j` of the point set in row-major
/// upper-triangular order. Pairs gated off by the filter are written as 0.0
/// without computing; the rest are dispatched as distance jobs. The finished
/// matrix (length `n(n-1)/2`) goes to the sink.
pub struct MatrixCoordinator<P, S> {
    /// The points whose pairwise distances are wanted.
    points: Vec<P>,
    /// One 0/1 flag per pair; 0 means "write 0.0 without computing".
    filter: Vec<u8>,
    /// The matrix entries, filled as replies arrive.
    results: Vec<f64>,
    /// Row of the next pair to consider.
    i: usize,
    /// Column of the next pair to consider.
    j: usize,
    /// Flat index of the next pair to consider.
    pair: usize,
    /// Where the matrix goes.
    sink: S,
}

impl<P: SamplePoint, S: ResultSink<f64>> MatrixCoordinator<P, S> {
    /// Creates a matrix job over the given points.
    ///
    /// `filter` may be `None` for all-ones.
    ///
    /// # Errors
    ///
    /// If the filter length is not `n(n-1)/2`.
    pub fn new(points: Vec<P>, filter: Option<Vec<u8>>, sink: S) -> Result<Self, String> {
        let n = points.len();
        let pairs = n * n.saturating_sub(1) / 2;
        let filter = filter.unwrap_or_else(|| vec![1; pairs]);
        if filter.len() != pairs {
            return Err(format!("distance filter has {} entries but {pairs} pairs are required", filter.len()));
        }
        Ok(Self { points, filter, results: vec![0.0; pairs], i: 0, j: 1, pair: 0, sink })
    }

    /// Advances the pair cursor, returning the flat index and endpoints of
    /// the pair it was at.
    fn next_pair(&mut self) -> Option<(usize, usize, usize)> {
        if self.pair >= self.results.len() {
            return None;
        }
        let current = (self.pair, self.i, self.j);
        self.pair += 1;
        self.j += 1;
        if self.j == self.points.len() {
            self.i += 1;
            self.j = self.i + 1;
        }
        Some(current)
    }
}

impl<P: SamplePoint, S: ResultSink<f64>> Coordinator for MatrixCoordinator<P, S> {
    fn prepare(&mut self) -> Result<Prepared, String> {
        while let Some((pair, i, j)) = self.next_pair() {
            if self.filter[pair] == 0 {
                // Gated off: the entry stays 0.0 and no job is dispatched.
                continue;
            }
            let mut job = Message::new();
            job.push(&TAG_DISTANCE);
            job.push(&i64_from(pair)?);
            job.push(&self.points[i]);
            job.push(&self.points[j]);
            return Ok(Prepared::Job(job));
        }
        Ok(Prepared::Done)
    }

    fn accept(&mut self, mut result: Message) -> Result<(), String> {
        let tag: i64 = result.pop()?;
        if tag != TAG_DISTANCE {
            return Err(format!("unexpected reply tag {tag} for a matrix job"));
        }
        let pair: i64 = result.pop()?;
        let _x: P = result.pop()?;
        let _y: P = result.pop()?;
        let d: f64 = result.pop()?;
        self.results[usize_from(pair)?] = d;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), String> {
        self.sink.accept(&self.results)
    }
}

/// Converts a batch index for the wire, which carries `i64`.
fn i64_from(value: usize) -> Result<i64, String> {
    i64::try_from(value).map_err(|_| format!("index {value} does not fit the wire format"))
}

/// Converts a wire index back to a batch index.
fn usize_from(value: i64) -> Result<usize, String> {
    usize::try_from(value).map_err(|_| format!("index {value} is not a valid operation index"))
}

