pub(crate) mod builder;

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, OnceLock},
};

use tokio::sync::{mpsc, Mutex};

use crate::{
    context::Context,
    log,
    process::{Process, ProcessId, ProcessOptions, ProcessRunner},
    supervisor::builder::SupervisorBuilder,
    task::{SupervisedTask, TaskResult},
};

/// Runs child tasks as independent processes and shuts them down together.
///
/// A `Supervisor` is itself a [`SupervisedTask`]: run it inside a process (with
/// [`spawn`](crate::spawn) or another supervisor's [`start`](Self::start)) to
/// build a supervision tree. While it runs, children queued through `start`
/// are registered and launched; once its context is cancelled it cancels every
/// registered child and waits for all of them to finish.
///
/// Cloning is cheap and every clone drives the same supervisor. A supervisor
/// belongs to the first process that runs it; running it in a second process
/// only waits for the first one to stop.
#[derive(Clone)]
pub struct Supervisor {
    pub(crate) inner: Arc<SupervisorInner>,
}

pub(crate) struct SupervisorInner {
    pub(crate) defaults: ProcessOptions,
    pub(crate) process: OnceLock<Process>,
    pub(crate) starts_tx: mpsc::Sender<ProcessRunner>,
    pub(crate) starts_rx: Mutex<mpsc::Receiver<ProcessRunner>>,
    pub(crate) exits_tx: mpsc::UnboundedSender<ProcessId>,
    pub(crate) exits_rx: Mutex<mpsc::UnboundedReceiver<ProcessId>>,
}

impl Supervisor {
    /// A supervisor with the default child options.
    pub fn new() -> Self {
        SupervisorBuilder::new().build()
    }

    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// The process this supervisor runs in, once it has started running.
    pub fn process(&self) -> Option<&Process> {
        self.inner.process.get()
    }

    /// Options every child starts from.
    pub fn defaults(&self) -> &ProcessOptions {
        &self.inner.defaults
    }

    /// Queues `task` to run as a child process and returns its handle.
    ///
    /// The child's cancellation derives from `ctx`. `options` override the
    /// supervisor defaults field by field. This returns as soon as the child is
    /// queued; it waits only when the start queue is full. A child started after
    /// the supervisor has shut down is returned already cancelled and done.
    pub async fn start<T>(&self, ctx: &Context, task: T, options: ProcessOptions) -> Process
    where
        T: SupervisedTask + Clone,
    {
        let options = self.inner.defaults.clone().merge(options);
        let runner = ProcessRunner::new(ctx, Some(self.clone()), Box::new(task), options);
        let process = runner.process().clone();

        if let Err(mpsc::error::SendError(runner)) = self.inner.starts_tx.send(runner).await {
            runner.abandon();
        }
        process
    }

    /// Control loop: registers and launches children until cancelled.
    async fn supervise(
        &self,
        ctx: &Context,
        starts: &mut mpsc::Receiver<ProcessRunner>,
        exits: &mut mpsc::UnboundedReceiver<ProcessId>,
        children: &mut HashMap<ProcessId, Process>,
    ) {
        loop {
            tokio::select! {
                Some(runner) = starts.recv() => self.launch(runner, children),
                Some(id) = exits.recv() => {
                    children.remove(&id);
                    log::trace!(child = %id, remaining = children.len(), "child exited");
                }
                _ = ctx.cancelled() => return,
            }
        }
    }

    /// Registers the child and runs its restart loop as its own Tokio task.
    fn launch(&self, runner: ProcessRunner, children: &mut HashMap<ProcessId, Process>) {
        let process = runner.process().clone();
        let id = process.id();
        children.insert(id, process);
        log::debug!(child = %id, children = children.len(), "starting child");

        let exits = self.inner.exits_tx.clone();
        tokio::spawn(async move {
            runner.run().await;
            let _ = exits.send(id);
        });
    }

    /// Cancels every registered child and waits until all of them have exited.
    async fn shutdown(
        &self,
        starts: &mut mpsc::Receiver<ProcessRunner>,
        exits: &mut mpsc::UnboundedReceiver<ProcessId>,
        children: &mut HashMap<ProcessId, Process>,
    ) {
        log::debug!(children = children.len(), "supervisor shutting down");
        for child in children.values() {
            child.cancel();
        }

        while !children.is_empty() {
            tokio::select! {
                Some(runner) = starts.recv() => runner.abandon(),
                Some(id) = exits.recv() => {
                    children.remove(&id);
                }
            }
        }

        // Later starts fail to send and are abandoned by the caller.
        starts.close();
        while let Ok(runner) = starts.try_recv() {
            runner.abandon();
        }
        log::debug!("supervisor stopped");
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("process", &self.process().map(Process::id))
            .field("defaults", &self.inner.defaults)
            .finish()
    }
}

impl SupervisedTask for Supervisor {
    async fn run(&mut self, ctx: Context) -> TaskResult {
        if let Some(process) = ctx.process() {
            let owner = self.inner.process.get_or_init(|| process.clone());
            if owner.id() != process.id() {
                log::warning!(
                    process = %process.id(),
                    owner = %owner.id(),
                    "supervisor already belongs to another process"
                );
            }
        }

        // Only one process drives the queues at a time; others wait here until
        // it has stopped or they are cancelled.
        let queues = async {
            let starts = self.inner.starts_rx.lock().await;
            let exits = self.inner.exits_rx.lock().await;
            (starts, exits)
        };
        let (mut starts, mut exits) = tokio::select! {
            queues = queues => queues,
            _ = ctx.cancelled() => return Ok(()),
        };
        let mut children = HashMap::new();

        self.supervise(&ctx, &mut starts, &mut exits, &mut children)
            .await;
        self.shutdown(&mut starts, &mut exits, &mut children).await;
        Ok(())
    }
}
