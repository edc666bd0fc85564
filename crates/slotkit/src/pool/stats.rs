use portable_atomic::{AtomicU64, Ordering};

/// Point-in-time task counters of a [`WorkerPool`](crate::WorkerPool).
///
/// Counters are updated independently, so a snapshot taken while tasks are in
/// flight need not add up. An abandoned task that later finishes is counted
/// both as abandoned and as completed (or panicked).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Tasks accepted into a worker queue.
    pub dispatched: u64,
    /// Handler calls that returned normally.
    pub completed: u64,
    /// Handler calls that panicked.
    pub panicked: u64,
    /// Tasks the worker stopped waiting for after the timeout.
    pub abandoned: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) dispatched: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) panicked: AtomicU64,
    pub(crate) abandoned: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}
