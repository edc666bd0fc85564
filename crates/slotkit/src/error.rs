//! Error types shared by the allocator and the worker pool.
//!
//! Every fallible operation in `slotkit` returns [`Result`], whose error side is
//! the single [`Error`] enum below. Variants carry the values involved so a
//! caller can log or match on them without re-deriving context.

/// A result type defaulting to the crate-wide [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `slotkit` can emit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An allocator was requested with `end < start`.
    #[error("invalid range: end {end} must be >= start {start}")]
    InvalidRange { start: i64, end: i64 },

    /// The value lies outside the allocator's closed range.
    #[error("value {value} out of range [{start}, {end}]")]
    OutOfRange { value: i64, start: i64, end: i64 },

    /// The slot is already marked as used.
    #[error("value {value} is already used")]
    AlreadyUsed { value: i64 },

    /// No free slot was found at or after the scan cursor.
    ///
    /// This does not imply that the allocator is full: slots freed below the
    /// cursor are not revisited until [`reset_cursor`] is called.
    ///
    /// [`reset_cursor`]: crate::BitSlotAllocator::reset_cursor
    #[error("no available value")]
    Exhausted,

    /// The allocator was never constructed with a range.
    #[error("allocator is not initialized")]
    Uninitialized,

    /// The pool has been closed and no longer accepts tasks.
    #[error("worker pool is closed")]
    PoolClosed,

    /// A non-blocking dispatch found the target worker's queue full.
    #[error("queue for worker {worker} is full")]
    QueueFull { worker: usize },

    /// The target worker stopped receiving before the task was enqueued.
    #[error("channel error: {context}")]
    ChannelClosed { context: String },

    /// The allocator lock was poisoned by a panicking thread.
    ///
    /// Only reachable with the std lock; `parking-lot` locks never poison.
    #[cfg_attr(docsrs, doc(cfg(not(feature = "parking-lot"))))]
    #[cfg(not(feature = "parking-lot"))]
    #[error("lock poisoned")]
    LockPoisoned,
}

#[cfg(not(feature = "parking-lot"))]
impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}
