//! Errors surfaced to responders and to callers of [`Process::join`](crate::Process::join).
//!
//! [`ProcessError`] covers every outcome a restart loop can observe, plus the
//! errors produced by the built-in responders. [`ConfigError`] is reserved for
//! wiring mistakes that cannot be resolved at runtime.

use std::{any::Any, sync::Arc, time::Duration};

use thiserror::Error;

use crate::task::TaskError;

/// Outcome of one incarnation, or the error attached to an [`Action`](crate::Action).
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    /// The task body returned an error.
    #[error("{0}")]
    Task(Arc<TaskError>),

    /// The task reported that its context was cancelled.
    #[error("context cancelled")]
    Cancelled,

    /// The context was cancelled but the task did not return within its grace period.
    #[error("process context was cancelled, but task did not return within grace period {grace:?}")]
    Linger {
        /// The configured grace period.
        grace: Duration,
    },

    /// The task body panicked.
    #[error("panic: {payload}")]
    Panic {
        /// The panic payload, rendered as text.
        payload: String,
    },

    /// The process was restarted as many times as [`limit`](crate::limit) allows.
    #[error("reached restart limit of {limit}")]
    RestartLimit {
        /// The configured maximum number of restarts.
        limit: u32,
    },

    /// The backoff generator ran out of its elapsed-time budget.
    #[error("backoff reached time limit: {max_elapsed:?}")]
    BackoffElapsed {
        /// The configured maximum elapsed time.
        max_elapsed: Duration,
    },

    /// The context was cancelled while waiting out a backoff interval.
    #[error("context closed while sleeping for backoff")]
    BackoffInterrupted,
}

impl ProcessError {
    /// Wraps an arbitrary task error.
    ///
    /// An error that already carries a `ProcessError` is unwrapped, so a task that
    /// returns `Err(ProcessError::Cancelled.into())` is classified as cancelled.
    pub fn from_task(err: TaskError) -> Self {
        match err.downcast::<ProcessError>() {
            Ok(err) => err,
            Err(err) => ProcessError::Task(Arc::new(err)),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        ProcessError::Panic { payload }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProcessError::Cancelled)
    }

    pub fn is_linger(&self) -> bool {
        matches!(self, ProcessError::Linger { .. })
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, ProcessError::Panic { .. })
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::Task(_) => "task_failed",
            ProcessError::Cancelled => "task_cancelled",
            ProcessError::Linger { .. } => "task_lingered",
            ProcessError::Panic { .. } => "task_panicked",
            ProcessError::RestartLimit { .. } => "restart_limit",
            ProcessError::BackoffElapsed { .. } => "backoff_elapsed",
            ProcessError::BackoffInterrupted => "backoff_interrupted",
        }
    }
}

/// A responder chain or cascade that cannot be carried out.
///
/// These indicate a wiring mistake; the restart loop aborts the program when it
/// meets one.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("the root process has nothing to cascade to")]
    CascadeAtRoot,
    #[error("responder chain ended with Action::Pass; no responders left to pass to")]
    UnresolvedPass,
}
