//! A fixed-size pool of Tokio workers, each draining its own bounded queue.
//!
//! Tasks are routed either by key (`id mod size`) or round-robin. Every task
//! runs on the blocking thread pool behind a [`FailureBoundary`] and is
//! watched by its worker with a deadline: a task that overruns is abandoned
//! (reported, not killed) and the worker moves on.
//!
//! [`FailureBoundary`]: crate::FailureBoundary

mod manager;
mod options;
mod stats;
mod task;
mod worker;

pub use manager::*;
pub use options::*;
pub use stats::*;
pub use task::*;
