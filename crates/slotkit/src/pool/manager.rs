//! The [`WorkerPool`] handle: construction, dispatch and shutdown.
//!
//! Each worker owns one bounded [`mpsc`] queue. Dispatchers pick the queue
//! either from the task id or from a shared round-robin counter, then wait
//! for the queue to accept the task; back-pressure is therefore felt by the
//! caller, never reported as an error. A queue length of 0 turns every
//! dispatch into a hand-off: the task travels through a single slot and the
//! dispatcher waits until the worker has taken it. A shared
//! [`CancellationToken`] is the broadcast shutdown signal.

use core::time::Duration;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "tracing")]
use tracing::instrument;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    Error, Result,
    pool::{
        PoolBuilder, PoolConfig, PoolStats, Task,
        stats::Counters,
        worker::{Envelope, Shared, worker_loop},
    },
};

/// A fixed set of workers, each running one task at a time from its own
/// queue.
///
/// - Tasks sent to the same worker run in submission order.
/// - A task that panics is reported through the failure reporter and the
///   worker continues with the next one.
/// - A task that runs past the timeout is reported through the abandon
///   reporter and left to finish on its own; the worker continues.
///
/// The pool must be created inside a Tokio runtime. Handlers are plain
/// functions and run on Tokio's blocking thread pool, so they may block.
pub struct WorkerPool<P> {
    workers: Vec<mpsc::Sender<Envelope<P>>>,
    next_worker: AtomicUsize,
    shutdown_token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<Shared<P>>,
    queue_len: usize,
}

impl<P> WorkerPool<P>
where
    P: Send + Sync + 'static,
{
    /// Starts a pool of `size` workers with queues of `queue_len` tasks and
    /// default options.
    ///
    /// `size == 0` starts [`DEFAULT_POOL_SIZE`](crate::DEFAULT_POOL_SIZE)
    /// workers. `queue_len == 0` makes dispatch a hand-off that returns only
    /// once a worker has taken the task.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn new<F>(size: usize, queue_len: usize, handler: F) -> Self
    where
        F: Fn(&Task<P>) + Send + Sync + 'static,
    {
        Self::builder(size, queue_len, handler).build()
    }

    /// Returns a [`PoolBuilder`] for setting the timeout, label, reporters and
    /// task describer before starting the workers.
    pub fn builder<F>(size: usize, queue_len: usize, handler: F) -> PoolBuilder<P>
    where
        F: Fn(&Task<P>) + Send + Sync + 'static,
    {
        PoolBuilder::new(size, queue_len, handler)
    }

    /// Starts a pool from a [`PoolConfig`].
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn from_config<F>(config: PoolConfig, handler: F) -> Self
    where
        F: Fn(&Task<P>) + Send + Sync + 'static,
    {
        Self::builder(config.size, config.queue_len, handler)
            .config(config)
            .build()
    }

    pub(crate) fn start(size: usize, queue_len: usize, shared: Shared<P>) -> Self {
        let shared = Arc::new(shared);
        let shutdown_token = CancellationToken::new();
        let mut workers = Vec::with_capacity(size);
        let mut handles = Vec::with_capacity(size);

        for worker_id in 0..size {
            let (tx, rx) = mpsc::channel(queue_len.max(1));
            workers.push(tx);
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                rx,
                Arc::clone(&shared),
                shutdown_token.clone(),
            )));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Started worker pool '{}' with {size} workers (queue {queue_len}, timeout {:?})",
            shared.label,
            shared.timeout
        );

        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            shutdown_token,
            handles: Mutex::new(handles),
            shared,
            queue_len,
        }
    }

    /// Returns the worker a task with `id` is routed to by keyed dispatch.
    ///
    /// Negative ids use the Euclidean remainder, so every id maps into
    /// `0..size`.
    pub fn key_index(&self, id: i64) -> usize {
        id.rem_euclid(self.workers.len() as i64) as usize
    }

    /// Returns the index of the next worker to receive round-robin work and
    /// advances the counter.
    ///
    /// Uses a relaxed atomic increment to minimize contention.
    pub fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Sends `task` to worker `task.id mod size`, waiting until its queue has
    /// room.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolClosed`] if [`Self::close`] has been called.
    /// - [`Error::ChannelClosed`] if the worker stopped receiving.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip(self, task), fields(task_id = task.id))
    )]
    pub async fn dispatch_by_key(&self, task: Task<P>) -> Result<()> {
        let worker_idx = self.key_index(task.id);
        self.send(worker_idx, task).await
    }

    /// Sends `task` to the next worker in round-robin order, waiting until its
    /// queue has room.
    ///
    /// # Errors
    ///
    /// Same as [`Self::dispatch_by_key`].
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip(self, task), fields(task_id = task.id))
    )]
    pub async fn dispatch_round_robin(&self, task: Task<P>) -> Result<()> {
        let worker_idx = self.next_worker_index();
        self.send(worker_idx, task).await
    }

    /// Keyed dispatch that fails instead of waiting when the queue is full.
    ///
    /// On a hand-off pool (`queue_len == 0`) the task is placed in the
    /// worker's single slot when it is empty; the call does not wait for the
    /// worker to take it.
    ///
    /// # Errors
    ///
    /// - [`Error::QueueFull`] if the target queue has no room.
    /// - Otherwise as [`Self::dispatch_by_key`].
    pub fn try_dispatch_by_key(&self, task: Task<P>) -> Result<()> {
        let worker_idx = self.key_index(task.id);
        self.try_send(worker_idx, task)
    }

    /// Round-robin dispatch that fails instead of waiting when the queue is
    /// full. The counter advances even if the dispatch fails.
    ///
    /// # Errors
    ///
    /// Same as [`Self::try_dispatch_by_key`].
    pub fn try_dispatch_round_robin(&self, task: Task<P>) -> Result<()> {
        let worker_idx = self.next_worker_index();
        self.try_send(worker_idx, task)
    }

    /// Keyed dispatch for callers outside the async runtime; blocks the
    /// current thread until the queue accepts the task.
    ///
    /// # Errors
    ///
    /// Same as [`Self::dispatch_by_key`].
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_dispatch_by_key(&self, task: Task<P>) -> Result<()> {
        let worker_idx = self.key_index(task.id);
        self.blocking_send(worker_idx, task)
    }

    /// Round-robin dispatch for callers outside the async runtime.
    ///
    /// # Errors
    ///
    /// Same as [`Self::dispatch_by_key`].
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_dispatch_round_robin(&self, task: Task<P>) -> Result<()> {
        let worker_idx = self.next_worker_index();
        self.blocking_send(worker_idx, task)
    }

    /// Signals every worker to stop and waits until all of them have.
    ///
    /// A worker busy with a task stops once that task completes or times out.
    /// Tasks still queued are dropped. Later dispatches fail with
    /// [`Error::PoolClosed`]; calling `close` again returns immediately.
    pub async fn close(&self) {
        if self.shutdown_token.is_cancelled() {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("Notifying all workers of '{}' to shut down", self.shared.label);
        self.shutdown_token.cancel();

        let handles = core::mem::take(
            &mut *self
                .handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        for (_worker_id, result) in futures::future::join_all(handles)
            .await
            .into_iter()
            .enumerate()
        {
            if let Err(_e) = result {
                #[cfg(feature = "tracing")]
                tracing::error!("Worker {_worker_id} did not stop cleanly: {_e}");
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool '{}' shutdown complete", self.shared.label);
    }

    /// Returns `true` once [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Capacity of each worker's queue; 0 for a hand-off pool.
    pub const fn queue_len(&self) -> usize {
        self.queue_len
    }

    /// Per-task timeout.
    pub fn timeout(&self) -> Duration {
        self.shared.timeout
    }

    /// Label used in diagnostics.
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Snapshot of the task counters.
    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shutdown_token.is_cancelled() {
            Err(Error::PoolClosed)
        } else {
            Ok(())
        }
    }

    fn closed_error(&self, worker_idx: usize) -> Error {
        if self.shutdown_token.is_cancelled() {
            Error::PoolClosed
        } else {
            Error::ChannelClosed {
                context: format!("Worker {worker_idx} channel closed"),
            }
        }
    }

    fn accepted(&self, _worker_idx: usize) {
        Counters::bump(&self.shared.counters.dispatched);
        #[cfg(feature = "tracing")]
        tracing::trace!("Task queued on worker {_worker_idx}");
    }

    /// Wraps `task` for the queue, with a pickup signal on hand-off pools.
    fn envelope(&self, task: Task<P>) -> (Envelope<P>, Option<oneshot::Receiver<()>>) {
        if self.queue_len == 0 {
            let (taken_tx, taken_rx) = oneshot::channel();
            let envelope = Envelope {
                task,
                taken: Some(taken_tx),
            };
            (envelope, Some(taken_rx))
        } else {
            (Envelope { task, taken: None }, None)
        }
    }

    async fn send(&self, worker_idx: usize, task: Task<P>) -> Result<()> {
        self.ensure_open()?;
        let (envelope, taken) = self.envelope(task);
        self.workers[worker_idx]
            .send(envelope)
            .await
            .map_err(|_| self.closed_error(worker_idx))?;
        if let Some(taken) = taken {
            // Fails if the worker stopped before taking the task.
            taken.await.map_err(|_| self.closed_error(worker_idx))?;
        }
        self.accepted(worker_idx);
        Ok(())
    }

    fn try_send(&self, worker_idx: usize, task: Task<P>) -> Result<()> {
        self.ensure_open()?;
        match self.workers[worker_idx].try_send(Envelope { task, taken: None }) {
            Ok(()) => {
                self.accepted(worker_idx);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(Error::QueueFull { worker: worker_idx }),
            Err(TrySendError::Closed(_)) => Err(self.closed_error(worker_idx)),
        }
    }

    fn blocking_send(&self, worker_idx: usize, task: Task<P>) -> Result<()> {
        self.ensure_open()?;
        let (envelope, taken) = self.envelope(task);
        self.workers[worker_idx]
            .blocking_send(envelope)
            .map_err(|_| self.closed_error(worker_idx))?;
        if let Some(taken) = taken {
            taken
                .blocking_recv()
                .map_err(|_| self.closed_error(worker_idx))?;
        }
        self.accepted(worker_idx);
        Ok(())
    }
}

impl<P> core::fmt::Debug for WorkerPool<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("label", &self.shared.label)
            .field("size", &self.workers.len())
            .field("queue_len", &self.queue_len)
            .field("timeout", &self.shared.timeout)
            .field("closed", &self.shutdown_token.is_cancelled())
            .finish_non_exhaustive()
    }
}
