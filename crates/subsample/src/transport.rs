//! The message-passing seam between the coordinator and its workers.
//!
//! The engine only assumes the [`Transport`] contract: dispatch a job to an
//! idle worker, collect one finished result, report idle capacity.
//! [`ThreadTransport`] is the in-process implementation, one OS thread per
//! worker connected by channels; a cluster transport would implement the
//! same trait over its message-passing layer.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::thread::JoinHandle;

use crate::coordinator::Worker;
use crate::message::Message;

/// Ships jobs to workers and results back.
///
/// Implementations own the worker pool; the dispatch discipline is one
/// outstanding job per worker.
pub trait Transport {
    /// Sends a job to an idle worker.
    ///
    /// # Errors
    ///
    /// If no worker is idle, or the pool has shut down.
    fn dispatch(&mut self, job: Message) -> Result<(), String>;

    /// Blocks until one worker finishes, returning its result.
    ///
    /// # Errors
    ///
    /// If the worker failed (its error propagates) or disappeared.
    fn collect(&mut self) -> Result<Message, String>;

    /// Number of workers with no job in flight.
    fn idle(&self) -> usize;
}

/// An in-process worker pool over channels.
///
/// Each worker thread owns its own [`Worker`] instance and runs
/// receive-work-reply until its job channel closes. Dropping the transport
/// closes the channels and joins the threads.
pub struct ThreadTransport {
    /// Per-worker job channels.
    jobs: Vec<Sender<Message>>,
    /// The shared reply channel; replies carry the worker's index.
    replies: Receiver<(usize, Result<Message, String>)>,
    /// Workers with no job in flight.
    idle: Vec<usize>,
    /// The worker threads, joined on drop.
    threads: Vec<JoinHandle<()>>,
}

impl ThreadTransport {
    /// Spawns `workers` threads, each around its own worker from `make`.
    ///
    /// # Panics
    ///
    /// If `workers` is zero.
    pub fn new<W, F>(workers: usize, mut make: F) -> Self
    where
        W: Worker + Send + 'static,
        F: FnMut() -> W,
    {
        assert!(workers > 0, "a transport needs at least one worker");
        let (reply_tx, replies) = unbounded();
        let mut jobs = Vec::with_capacity(workers);
        let mut threads = Vec::with_capacity(workers);
        for id in 0..workers {
            let (job_tx, job_rx) = unbounded::<Message>();
            let reply_tx = reply_tx.clone();
            let mut worker = make();
            threads.push(std::thread::spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    let reply = worker.work(job);
                    if reply_tx.send((id, reply)).is_err() {
                        break;
                    }
                }
            }));
            jobs.push(job_tx);
        }
        Self { jobs, replies, idle: (0..workers).collect(), threads }
    }
}

impl Transport for ThreadTransport {
    fn dispatch(&mut self, job: Message) -> Result<(), String> {
        let id = self.idle.pop().ok_or_else(|| "dispatch with no idle worker".to_string())?;
        self.jobs[id].send(job).map_err(|_| format!("worker {id} has shut down"))?;
        Ok(())
    }

    fn collect(&mut self) -> Result<Message, String> {
        let (id, reply) = self.replies.recv().map_err(|_| "all workers have shut down".to_string())?;
        self.idle.push(id);
        reply.map_err(|e| format!("worker {id} failed: {e}"))
    }

    fn idle(&self) -> usize {
        self.idle.len()
    }
}

impl Drop for ThreadTransport {
    fn drop(&mut self) {
        self.jobs.clear();
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}
