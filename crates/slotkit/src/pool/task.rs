use std::sync::Arc;

/// A unit of work handed to a [`WorkerPool`](crate::WorkerPool).
///
/// `id` decides the worker under keyed dispatch; `payload` is passed through
/// to the handler untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Task<P> {
    pub id: i64,
    pub payload: P,
}

impl<P> Task<P> {
    pub const fn new(id: i64, payload: P) -> Self {
        Self { id, payload }
    }
}

/// The function every worker runs for each task.
pub type TaskHandler<P> = Arc<dyn Fn(&Task<P>) + Send + Sync>;

/// Renders a task for diagnostics when it is abandoned.
pub type TaskDescriber<P> = Arc<dyn Fn(&Task<P>) -> String + Send + Sync>;

/// Describes a task by its id only. Used when no describer is configured.
pub fn id_describer<P>() -> impl Fn(&Task<P>) -> String + Send + Sync {
    |task: &Task<P>| format!("Task {{ id: {}, .. }}", task.id)
}

/// Describes a task with its `Debug` representation.
pub fn debug_describer<P: core::fmt::Debug>() -> impl Fn(&Task<P>) -> String + Send + Sync {
    |task: &Task<P>| format!("{task:?}")
}

/// Describes a task as a JSON object, falling back to the id when the payload
/// cannot be serialized.
#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
#[cfg(feature = "serde")]
pub fn json_describer<P: serde::Serialize>() -> impl Fn(&Task<P>) -> String + Send + Sync {
    |task: &Task<P>| {
        serde_json::to_string(task)
            .unwrap_or_else(|e| format!("{{\"id\":{},\"error\":\"{e}\"}}", task.id))
    }
}
