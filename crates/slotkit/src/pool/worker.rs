use core::time::Duration;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    FailureBoundary, FailureReporter,
    pool::{Task, TaskDescriber, TaskHandler, stats::Counters},
};

/// A queued task. On hand-off queues `taken` is fired as soon as the worker
/// picks the task up, releasing the dispatcher.
pub(crate) struct Envelope<P> {
    pub(crate) task: Task<P>,
    pub(crate) taken: Option<oneshot::Sender<()>>,
}

/// State shared by every worker of one pool.
pub(crate) struct Shared<P> {
    pub(crate) handler: TaskHandler<P>,
    pub(crate) timeout: Duration,
    pub(crate) label: String,
    pub(crate) describer: TaskDescriber<P>,
    pub(crate) failure_reporter: FailureReporter,
    pub(crate) abandon_reporter: FailureReporter,
    pub(crate) boundary: FailureBoundary,
    pub(crate) counters: Counters,
}

impl<P> Shared<P>
where
    P: Send + Sync + 'static,
{
    /// Runs one task on the blocking pool and waits for it, at most
    /// `timeout`.
    ///
    /// On timeout the executor is left running; its completion signal lands
    /// in a dropped receiver and is discarded.
    async fn execute(self: &Arc<Self>, worker_id: usize, task: Task<P>) {
        let task = Arc::new(task);
        let (done_tx, done_rx) = oneshot::channel::<()>();

        let shared = Arc::clone(self);
        let job = Arc::clone(&task);
        // Detached: the join handle is not needed, completion is signalled
        // through `done_tx`.
        drop(tokio::task::spawn_blocking(move || {
            shared.run_handler(&job);
            let _ = done_tx.send(());
        }));

        tokio::select! {
            // Also resolves if the executor died without signalling.
            _ = done_rx => {}
            () = tokio::time::sleep(self.timeout) => self.abandon(worker_id, &task),
        }
    }

    fn run_handler(&self, task: &Task<P>) {
        match self.boundary.run(|| (self.handler)(task)) {
            Ok(()) => Counters::bump(&self.counters.completed),
            Err(failure) => {
                Counters::bump(&self.counters.panicked);
                (self.failure_reporter)(&format!("{}: {failure}", self.label));
            }
        }
    }

    /// Reports an abandoned task.
    ///
    /// The describer and both reporters run behind the boundary: a panic in
    /// any of them is reported, never unwound into the worker loop.
    fn abandon(&self, worker_id: usize, task: &Task<P>) {
        Counters::bump(&self.counters.abandoned);
        let reported = self.boundary.run(|| {
            let line = format!(
                "{}: task timed out after {:?} on worker {worker_id}, task: {}",
                self.label,
                self.timeout,
                (self.describer)(task)
            );
            (self.abandon_reporter)(&line);
        });

        if let Err(failure) = reported {
            let line = format!("{}: {failure}", self.label);
            if self.boundary.run(|| (self.failure_reporter)(&line)).is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!("Worker {worker_id} failure reporter panicked: {line}");
            }
        }
    }
}

/// Long-lived worker draining one queue until shutdown.
///
/// The worker exits when `shutdown` is cancelled or when every sender of `rx`
/// has been dropped. Shutdown wins over a queued task when both are ready;
/// tasks left in the queue at that point are dropped unrun.
pub(crate) async fn worker_loop<P>(
    worker_id: usize,
    mut rx: mpsc::Receiver<Envelope<P>>,
    shared: Arc<Shared<P>>,
    shutdown: CancellationToken,
) where
    P: Send + Sync + 'static,
{
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    loop {
        let task = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");
                break;
            }
            envelope = rx.recv() => match envelope {
                Some(Envelope { task, taken }) => {
                    if let Some(taken) = taken {
                        let _ = taken.send(());
                    }
                    task
                }
                None => break,
            },
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(task_id = task.id, "Worker {worker_id} picked up task");
        shared.execute(worker_id, task).await;
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}
