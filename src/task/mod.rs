use std::{fmt, future::Future, pin::Pin};

use crate::Context;

pub type TaskError = anyhow::Error;

pub type TaskResult = Result<(), TaskError>;

/// The trait users implement for work run inside a [`Process`](crate::Process).
///
/// # Clone and restart semantics
///
/// The process stores the **original** instance and clones it for each
/// incarnation. Mutations via `&mut self` only live in the clone and are lost on
/// restart. Shared state (`Arc<...>`) survives because `Clone` just bumps
/// the refcount.
///
/// # Cancellation
///
/// The [`Context`] passed to `run` is cancelled when the process is cancelled,
/// either directly or by its supervisor shutting down. A task is expected to
/// return promptly afterwards; one that keeps running past the process grace
/// period is reported as lingering.
///
/// # Example
///
/// ```rust
/// use supervisor_tree::{Context, SupervisedTask, TaskResult};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Clone)]
/// struct Poller {
///     polls: Arc<AtomicUsize>,
/// }
///
/// impl SupervisedTask for Poller {
///     async fn run(&mut self, ctx: Context) -> TaskResult {
///         while ctx.sleep(std::time::Duration::from_secs(1)).await {
///             self.polls.fetch_add(1, Ordering::Relaxed);
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait SupervisedTask: Send + 'static {
    /// Runs one incarnation of the task until completion or failure.
    fn run(&mut self, ctx: Context) -> impl Future<Output = TaskResult> + Send;
}

/// Dyn-compatible wrapper for `SupervisedTask`. Not user-facing.
pub(crate) trait DynSupervisedTask: Send + 'static {
    fn run_boxed(&mut self, ctx: Context) -> Pin<Box<dyn Future<Output = TaskResult> + Send + '_>>;
    fn clone_box(&self) -> Box<dyn DynSupervisedTask>;
}

impl<T> DynSupervisedTask for T
where
    T: SupervisedTask + Clone,
{
    fn run_boxed(&mut self, ctx: Context) -> Pin<Box<dyn Future<Output = TaskResult> + Send + '_>> {
        Box::pin(self.run(ctx))
    }

    fn clone_box(&self) -> Box<dyn DynSupervisedTask> {
        Box::new(self.clone())
    }
}

pub(crate) type DynTask = Box<dyn DynSupervisedTask>;

/// A task backed by a closure that creates a fresh future per incarnation.
///
/// Built with [`task_fn`].
#[derive(Clone)]
pub struct TaskFn<F> {
    f: F,
}

impl<F> fmt::Debug for TaskFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFn").finish_non_exhaustive()
    }
}

impl<F, Fut> SupervisedTask for TaskFn<F>
where
    F: Fn(Context) -> Fut + Send + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    fn run(&mut self, ctx: Context) -> impl Future<Output = TaskResult> + Send {
        (self.f)(ctx)
    }
}

/// Turns a closure into a [`SupervisedTask`].
///
/// ```rust
/// use supervisor_tree::{task_fn, Context, TaskError};
///
/// let task = task_fn(|ctx: Context| async move {
///     ctx.cancelled().await;
///     Ok::<(), TaskError>(())
/// });
/// ```
pub fn task_fn<F, Fut>(f: F) -> TaskFn<F>
where
    F: Fn(Context) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    TaskFn { f }
}
