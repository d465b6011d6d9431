use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::FutureExt;
use tokio::time::Instant;

use crate::{
    context::{Clock, Context},
    error::ProcessError,
    log,
    process::{latch::Latch, Process},
    task::DynTask,
};

/// One execution attempt of a [`Process`].
///
/// Fields are written by the restart loop while the attempt is in flight and
/// only read afterwards, so the accessors are safe to call at any time.
#[derive(Debug)]
pub struct Incarnation {
    index: u32,
    state: Mutex<IncarnationState>,
    /// Opened when the task body returns or panics.
    task_life: Latch,
    /// Opened when the restart loop is done observing the outcome.
    monitor_life: Latch,
}

#[derive(Debug, Default)]
struct IncarnationState {
    started_at: Option<Instant>,
    exited_at: Option<Instant>,
    error: Option<ProcessError>,
}

impl Incarnation {
    pub(crate) fn new(index: u32) -> Arc<Self> {
        Arc::new(Self {
            index,
            state: Mutex::default(),
            task_life: Latch::new(),
            monitor_life: Latch::new(),
        })
    }

    /// Zero for the first run, incremented by one per restart.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.lock().started_at
    }

    /// When the task body returned or panicked.
    pub fn exited_at(&self) -> Option<Instant> {
        self.lock().exited_at
    }

    pub fn error(&self) -> Option<ProcessError> {
        self.lock().error.clone()
    }

    /// Whether the task body is known to have stopped.
    ///
    /// Can be `false` after the process moved on, when the task outlived its
    /// grace period.
    pub fn is_stopped(&self) -> bool {
        self.task_life.is_open()
    }

    pub(crate) fn task_life(&self) -> &Latch {
        &self.task_life
    }

    pub(crate) fn monitor_life(&self) -> &Latch {
        &self.monitor_life
    }

    fn lock(&self) -> MutexGuard<'_, IncarnationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the task and waits for its outcome, honoring the grace period once
    /// the process is cancelled.
    pub(crate) async fn run_and_supervise(
        self: &Arc<Self>,
        process: &Process,
        task: DynTask,
    ) -> Option<ProcessError> {
        let outcome = self.supervise(process, task).await;
        self.monitor_life.open();
        outcome
    }

    async fn supervise(self: &Arc<Self>, process: &Process, task: DynTask) -> Option<ProcessError> {
        let clock = process.clock();
        self.lock().started_at = Some(clock.now());

        tokio::spawn(Arc::clone(self).run(
            Arc::clone(clock),
            Context::for_process(process.clone()),
            task,
        ));

        tokio::select! {
            biased;
            _ = self.task_life.wait() => return self.error(),
            _ = process.token().cancelled() => {}
        }

        let grace = process.grace();
        if grace.is_zero() {
            self.task_life.wait().await;
            return self.error();
        }

        let timed_out = tokio::select! {
            biased;
            _ = self.task_life.wait() => false,
            _ = clock.sleep(grace) => true,
        };
        if timed_out && self.linger(grace) {
            log::warning!(
                process = %process.id(),
                incarnation = self.index,
                ?grace,
                "task did not return within grace period"
            );
        }

        self.error()
    }

    /// Records a linger error unless the task stopped in the meantime.
    fn linger(&self, grace: std::time::Duration) -> bool {
        let mut state = self.lock();
        if self.task_life.is_open() {
            return false;
        }
        state.error = Some(ProcessError::Linger { grace });
        true
    }

    /// Body of the spawned unit: runs the task, converts a panic into an error
    /// and records the exit.
    async fn run(self: Arc<Self>, clock: Arc<dyn Clock>, ctx: Context, mut task: DynTask) {
        let result = AssertUnwindSafe(task.run_boxed(ctx)).catch_unwind().await;

        let mut state = self.lock();
        // A linger recorded by the monitor stays the outcome.
        let outcome = match result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(ProcessError::from_task(err)),
            Err(payload) => Some(ProcessError::from_panic(payload)),
        };
        if state.error.is_none() {
            state.error = outcome;
        }
        state.exited_at = Some(clock.now());
        self.task_life.open();
    }
}
