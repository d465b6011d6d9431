//! Supervised processes and their restart loop.
//!
//! A [`Process`] is the handle to one supervised task across its whole restart
//! history. Each execution attempt is an [`Incarnation`]; after every attempt
//! the outcome is fed to the matching responder chain, whose [`Action`] decides
//! whether to run another incarnation, stop, or cancel the parent supervisor.

pub(crate) mod incarnation;
pub(crate) mod latch;
pub(crate) mod options;

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use tokio_util::sync::CancellationToken;

use crate::{
    context::{Clock, Context, TokioClock},
    error::{ConfigError, ProcessError},
    log,
    response::{bind_all, close, Action, Responder, Responders},
    supervisor::Supervisor,
    task::{DynTask, SupervisedTask},
};

pub use incarnation::Incarnation;
use latch::Latch;
pub use options::{ProcessOptions, DEFAULT_GRACE};

/// Unique identifier of a [`Process`] within the running program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(u64);

impl ProcessId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to a started task.
///
/// Cheap to clone; all clones refer to the same process.
#[derive(Clone)]
pub struct Process {
    inner: Arc<ProcessInner>,
}

struct ProcessInner {
    id: ProcessId,
    supervisor: Option<Supervisor>,
    token: CancellationToken,
    clock: Arc<dyn Clock>,
    grace: Duration,
    life: Latch,
    state: Mutex<ProcessState>,
}

#[derive(Default)]
struct ProcessState {
    current: Option<Arc<Incarnation>>,
    previous: Option<Arc<Incarnation>>,
    error: Option<ProcessError>,
}

impl Process {
    pub fn id(&self) -> ProcessId {
        self.inner.id
    }

    /// The supervisor that started this process; `None` for a root process.
    pub fn supervisor(&self) -> Option<&Supervisor> {
        self.inner.supervisor.as_ref()
    }

    /// The context handed to this process's task.
    pub fn context(&self) -> Context {
        Context::for_process(self.clone())
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn grace(&self) -> Duration {
        self.inner.grace
    }

    /// Cancels the process and everything it supervises. Irreversible.
    pub fn cancel(&self) -> &Self {
        self.inner.token.cancel();
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Waits until the restart loop has stopped for good.
    pub async fn done(&self) {
        self.inner.life.wait().await
    }

    pub fn is_done(&self) -> bool {
        self.inner.life.is_open()
    }

    /// Waits until the current incarnation's task stops or its monitor gives up.
    ///
    /// Returns whether the task is known to have stopped, along with the error
    /// recorded for the incarnation. `false` means the grace period ran out and
    /// the task may still be running.
    pub async fn join(&self) -> (bool, Option<ProcessError>) {
        let Some(current) = self.current() else {
            return (true, None);
        };

        tokio::select! {
            biased;
            _ = current.task_life().wait() => return (true, current.error()),
            _ = current.monitor_life().wait() => {}
        }

        // The monitor may have finished just before the task did.
        (current.is_stopped(), current.error())
    }

    /// Waits for the process to finish and returns its terminal error.
    pub async fn wait(&self) -> Option<ProcessError> {
        self.done().await;
        self.error()
    }

    /// The error the process closed with, if it closed with one.
    pub fn error(&self) -> Option<ProcessError> {
        self.lock().error.clone()
    }

    pub fn current(&self) -> Option<Arc<Incarnation>> {
        self.lock().current.clone()
    }

    /// The incarnation displaced by the current one.
    pub fn previous(&self) -> Option<Arc<Incarnation>> {
        self.lock().previous.clone()
    }

    /// Number of times the task has been restarted.
    pub fn restarts(&self) -> u32 {
        self.lock().current.as_ref().map_or(0, |current| current.index())
    }

    fn lock(&self) -> MutexGuard<'_, ProcessState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn incarnate(&self) -> Arc<Incarnation> {
        let mut state = self.lock();
        let index = state.current.as_ref().map_or(0, |current| current.index() + 1);
        let incarnation = Incarnation::new(index);
        state.previous = state.current.replace(Arc::clone(&incarnation));
        incarnation
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.inner.id)
            .field("restarts", &self.restarts())
            .field("cancelled", &self.is_cancelled())
            .field("done", &self.is_done())
            .finish_non_exhaustive()
    }
}

/// Runs `task` as a root process, outside of any supervisor.
///
/// The root starts from [`ProcessOptions::defaults`] with lingering mapped to
/// close, since a root has nobody to cascade to; `options` are applied on top.
pub fn spawn<T>(ctx: &Context, task: T, options: ProcessOptions) -> Process
where
    T: SupervisedTask + Clone,
{
    let options = ProcessOptions::defaults().on_linger([close()]).merge(options);
    let runner = ProcessRunner::new(ctx, None, Box::new(task), options);
    let process = runner.process().clone();
    tokio::spawn(runner.run());
    process
}

/// Responder chains bound to one process, one per outcome kind.
struct BoundResponders {
    on_success: Responders,
    on_error: Responders,
    on_cancel: Responders,
    on_panic: Responders,
    on_linger: Responders,
}

impl BoundResponders {
    fn select(&mut self, outcome: Option<&ProcessError>) -> &mut Responders {
        match outcome {
            None => &mut self.on_success,
            Some(ProcessError::Cancelled) => &mut self.on_cancel,
            Some(ProcessError::Linger { .. }) => &mut self.on_linger,
            Some(ProcessError::Panic { .. }) => &mut self.on_panic,
            Some(_) => &mut self.on_error,
        }
    }
}

/// What the restart loop does next.
#[derive(Debug)]
pub(crate) enum Step {
    Restart,
    Close,
    Cascade(Process),
}

/// Maps a chain's final action to the next step of the restart loop.
pub(crate) fn resolve(action: Action, supervisor: Option<&Supervisor>) -> Result<Step, ConfigError> {
    match action {
        Action::Restart => Ok(Step::Restart),
        Action::Close => Ok(Step::Close),
        Action::Cascade => supervisor
            .and_then(Supervisor::process)
            .map(|parent| Step::Cascade(parent.clone()))
            .ok_or(ConfigError::CascadeAtRoot),
        Action::Pass => Err(ConfigError::UnresolvedPass),
    }
}

/// Owns a process's task and responders and drives its restart loop.
///
/// Kept apart from [`Process`] so responders holding a process handle do not
/// keep it alive once the loop has ended.
pub(crate) struct ProcessRunner {
    process: Process,
    task: DynTask,
    responders: BoundResponders,
}

impl ProcessRunner {
    pub(crate) fn new(
        parent: &Context,
        supervisor: Option<Supervisor>,
        task: DynTask,
        options: ProcessOptions,
    ) -> Self {
        let process = Process {
            inner: Arc::new(ProcessInner {
                id: ProcessId::next(),
                supervisor,
                token: parent.token().child_token(),
                clock: options.clock.unwrap_or_else(|| Arc::new(TokioClock)),
                grace: options.grace.unwrap_or(DEFAULT_GRACE),
                life: Latch::new(),
                state: Mutex::default(),
            }),
        };

        let bind = |responses: Option<Vec<_>>| bind_all(&process, &responses.unwrap_or_default());
        let responders = BoundResponders {
            on_success: bind(options.on_success),
            on_error: bind(options.on_error),
            on_cancel: bind(options.on_cancel),
            on_panic: bind(options.on_panic),
            on_linger: bind(options.on_linger),
        };

        Self {
            process,
            task,
            responders,
        }
    }

    pub(crate) fn process(&self) -> &Process {
        &self.process
    }

    /// Marks a process that will never run as done.
    pub(crate) fn abandon(self) {
        self.process.cancel();
        self.process.inner.life.open();
    }

    pub(crate) async fn run(mut self) {
        let ctx = self.process.context();
        let id = self.process.id();

        loop {
            let incarnation = self.process.incarnate();
            log::debug!(process = %id, incarnation = incarnation.index(), "starting incarnation");

            let outcome = incarnation
                .run_and_supervise(&self.process, self.task.clone_box())
                .await;
            log::debug!(
                process = %id,
                outcome = outcome.as_ref().map_or("success", ProcessError::as_label),
                "incarnation finished"
            );

            let (action, err) = self
                .responders
                .select(outcome.as_ref())
                .respond(&ctx, outcome)
                .await;
            log::trace!(process = %id, %action, "responder chain resolved");

            match resolve(action, self.process.supervisor()) {
                Ok(Step::Restart) => continue,
                Ok(Step::Close) => {
                    self.process.lock().error = err;
                    break;
                }
                Ok(Step::Cascade(parent)) => {
                    log::warning!(process = %id, parent = %parent.id(), "cascading to parent supervisor");
                    parent.cancel();
                    break;
                }
                Err(err) => fatal(id, err),
            }
        }

        log::debug!(process = %id, restarts = self.process.restarts(), "process closed");
        self.process.inner.life.open();
    }
}

/// A misconfigured process cannot continue; bring the program down loudly.
fn fatal(id: ProcessId, err: ConfigError) -> ! {
    log::error!(process = %id, error = %err, "fatal supervision misconfiguration");
    #[cfg(not(feature = "with_tracing"))]
    eprintln!("fatal supervision misconfiguration in process {id}: {err}");
    std::process::abort()
}
