//! Failure containment helpers.
//!
//! A [`FailureBoundary`] runs a closure and turns a panic into a [`Failure`]:
//! the panic message plus a one-line call stack rendered by a
//! [`StackFormatter`]. The worker pool wraps every task in a boundary; the
//! same machinery is available to callers through [`run_safe`] and
//! [`spawn_safe`].

mod boundary;
mod name;
mod stack;

pub use boundary::*;
pub use name::*;
pub use stack::*;
