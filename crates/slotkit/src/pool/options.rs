use core::time::Duration;
use std::sync::Arc;

use crate::{
    FailureBoundary, FailureReporter, StackFormatter, StackFormatterConfig,
    default_failure_reporter, short_type_name,
    pool::{Task, TaskDescriber, TaskHandler, WorkerPool, id_describer},
};

/// Worker count used when a pool is requested with size 0.
pub const DEFAULT_POOL_SIZE: usize = 50;

/// Per-task timeout used when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Plain-data pool settings, loadable from any serde format with the `serde`
/// feature. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Number of workers; 0 means [`DEFAULT_POOL_SIZE`].
    pub size: usize,
    /// Capacity of each worker's queue; 0 makes every dispatch a hand-off.
    pub queue_len: usize,
    /// Per-task timeout in seconds.
    pub timeout_secs: u64,
    /// Label used in diagnostics; defaults to the handler's type name.
    pub label: Option<String>,
    /// Stack rendering for recovered panics.
    pub stack: StackFormatterConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            queue_len: 0,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            label: None,
            stack: StackFormatterConfig::default(),
        }
    }
}

/// A reporter for abandoned tasks: a warning under `tracing`, stderr
/// otherwise.
pub fn default_abandon_reporter() -> FailureReporter {
    Arc::new(|line: &str| {
        #[cfg(feature = "tracing")]
        tracing::warn!("{line}");
        #[cfg(not(feature = "tracing"))]
        eprintln!("{line}");
    })
}

/// Configures and starts a [`WorkerPool`].
///
/// Obtained from [`WorkerPool::builder`]. Every setting is optional.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use slotkit::{Task, WorkerPool};
///
/// let pool = WorkerPool::builder(4, 16, |task: &Task<String>| {
///         println!("{} -> {}", task.id, task.payload);
///     })
///     .timeout_secs(1)
///     .label("printer")
///     .build();
///
/// pool.dispatch_by_key(Task::new(7, "hello".to_string())).await.unwrap();
/// pool.close().await;
/// # }
/// ```
pub struct PoolBuilder<P> {
    size: usize,
    queue_len: usize,
    timeout: Duration,
    label: String,
    handler: TaskHandler<P>,
    describer: TaskDescriber<P>,
    failure_reporter: FailureReporter,
    abandon_reporter: FailureReporter,
    formatter: StackFormatter,
}

impl<P> PoolBuilder<P>
where
    P: Send + Sync + 'static,
{
    pub(crate) fn new<F>(size: usize, queue_len: usize, handler: F) -> Self
    where
        F: Fn(&Task<P>) + Send + Sync + 'static,
    {
        Self {
            size: if size == 0 { DEFAULT_POOL_SIZE } else { size },
            queue_len,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            label: short_type_name(core::any::type_name::<F>()),
            handler: Arc::new(handler),
            describer: Arc::new(id_describer()),
            failure_reporter: default_failure_reporter(),
            abandon_reporter: default_abandon_reporter(),
            formatter: StackFormatter::default(),
        }
    }

    /// Applies every field of `config`.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.size = if config.size == 0 {
            DEFAULT_POOL_SIZE
        } else {
            config.size
        };
        self.queue_len = config.queue_len;
        self.timeout = Duration::from_secs(config.timeout_secs);
        if let Some(label) = config.label {
            self.label = label;
        }
        self.formatter = StackFormatter::new(config.stack);
        self
    }

    /// Sets the per-task timeout in whole seconds (default 10).
    #[must_use]
    pub const fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Sets the per-task timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the label prefixed to failure and abandonment diagnostics.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the callback receiving recovered panics, formatted as
    /// `<label>: panic: <message>, stack: <stack>`.
    #[must_use]
    pub fn failure_reporter(mut self, reporter: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.failure_reporter = Arc::new(reporter);
        self
    }

    /// Sets the callback receiving one line per abandoned task.
    #[must_use]
    pub fn abandon_reporter(mut self, reporter: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.abandon_reporter = Arc::new(reporter);
        self
    }

    /// Sets how abandoned tasks are rendered in diagnostics, for example with
    /// [`debug_describer`](crate::debug_describer).
    #[must_use]
    pub fn task_describer(
        mut self,
        describer: impl Fn(&Task<P>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.describer = Arc::new(describer);
        self
    }

    /// Sets the formatter used for panic stacks.
    #[must_use]
    pub fn stack_formatter(mut self, formatter: StackFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Spawns the workers and returns the running pool.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn build(self) -> WorkerPool<P> {
        WorkerPool::start(
            self.size,
            self.queue_len,
            super::worker::Shared {
                handler: self.handler,
                timeout: self.timeout,
                label: self.label,
                describer: self.describer,
                failure_reporter: self.failure_reporter,
                abandon_reporter: self.abandon_reporter,
                boundary: FailureBoundary::new(self.formatter),
                counters: Default::default(),
            },
        )
    }
}
