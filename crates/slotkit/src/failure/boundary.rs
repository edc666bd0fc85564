use core::any::Any;
use core::cell::{Cell, RefCell};
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};
use std::thread;

use super::StackFormatter;

/// Callback receiving a formatted failure line.
pub type FailureReporter = Arc<dyn Fn(&str) + Send + Sync>;

thread_local! {
    /// Number of boundaries active on this thread.
    static BOUNDARY_DEPTH: Cell<usize> = const { Cell::new(0) };
    /// Backtrace recorded by the panic hook for the innermost boundary.
    static CAPTURED: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Chains a panic hook in front of whatever hook was installed before.
///
/// On threads running inside a [`FailureBoundary`] the hook records the
/// backtrace at the panic site and prints nothing; the boundary reports the
/// failure instead. Every other panic goes to the previous hook unchanged.
fn install_capture_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if BOUNDARY_DEPTH.with(Cell::get) > 0 {
                let backtrace = Backtrace::force_capture();
                CAPTURED.with(|slot| *slot.borrow_mut() = Some(backtrace));
            } else {
                previous(info);
            }
        }));
    });
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        BOUNDARY_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        BOUNDARY_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// A panic caught by a [`FailureBoundary`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("panic: {message}, stack: {stack}")]
pub struct Failure {
    /// The panic payload rendered as text.
    pub message: String,
    /// The call stack at the panic site, rendered by [`StackFormatter`].
    pub stack: String,
}

/// Runs closures so that a panic inside them is caught and converted into a
/// [`Failure`] instead of unwinding further.
///
/// ```
/// use slotkit::FailureBoundary;
///
/// let boundary = FailureBoundary::default();
/// let failure = boundary.run::<()>(|| panic!("boom")).unwrap_err();
/// assert_eq!(failure.message, "boom");
/// assert!(failure.to_string().starts_with("panic: boom, stack: "));
/// ```
#[derive(Clone, Debug, Default)]
pub struct FailureBoundary {
    formatter: StackFormatter,
}

impl FailureBoundary {
    pub fn new(formatter: StackFormatter) -> Self {
        Self { formatter }
    }

    pub fn formatter(&self) -> &StackFormatter {
        &self.formatter
    }

    /// Runs `f`, returning its value or the [`Failure`] it panicked with.
    ///
    /// # Errors
    ///
    /// Returns a [`Failure`] if `f` panics.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> Result<T, Failure> {
        install_capture_hook();
        // A panic caught and swallowed inside an earlier run leaves its
        // backtrace behind; `resume_unwind` never reaches the hook.
        CAPTURED.with(|slot| slot.borrow_mut().take());
        let outcome = {
            let _guard = DepthGuard::enter();
            panic::catch_unwind(AssertUnwindSafe(f))
        };

        outcome.map_err(|payload| {
            let backtrace = CAPTURED.with(|slot| slot.borrow_mut().take());
            Failure {
                message: panic_message(payload.as_ref()),
                stack: backtrace
                    .map(|bt| self.formatter.format(&bt))
                    .unwrap_or_default(),
            }
        })
    }

    /// Runs `f` and hands any failure to `reporter`.
    ///
    /// Returns `None` if `f` panicked.
    pub fn run_reporting<T>(&self, f: impl FnOnce() -> T, reporter: &dyn Fn(&str)) -> Option<T> {
        match self.run(f) {
            Ok(value) => Some(value),
            Err(failure) => {
                reporter(&failure.to_string());
                None
            }
        }
    }
}

/// Renders a panic payload. `&str` and `String` payloads are returned as is.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// A reporter that logs the failure line at error level, or writes it to
/// stderr without the `tracing` feature.
pub fn default_failure_reporter() -> FailureReporter {
    Arc::new(|failure: &str| {
        #[cfg(feature = "tracing")]
        tracing::error!("{failure}");
        #[cfg(not(feature = "tracing"))]
        eprintln!("{failure}");
    })
}

/// Runs `f` on the current thread behind a default [`FailureBoundary`].
///
/// A panic is reported through `reporter` and yields `None`.
pub fn run_safe<T>(f: impl FnOnce() -> T, reporter: impl Fn(&str)) -> Option<T> {
    FailureBoundary::default().run_reporting(f, &reporter)
}

/// Spawns `f` on a new OS thread behind a default [`FailureBoundary`].
///
/// The returned handle never observes a panic from `f`; it yields `None`
/// instead, after `reporter` has been called.
pub fn spawn_safe<T, F, R>(f: F, reporter: R) -> thread::JoinHandle<Option<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
    R: Fn(&str) + Send + 'static,
{
    thread::spawn(move || run_safe(f, reporter))
}
