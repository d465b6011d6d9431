//! Execution context handed to every task.
//!
//! A [`Context`] carries the cancellation token of the enclosing process, the
//! process handle itself and the [`Clock`] used for grace periods and backoff.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{error::ProcessError, process::Process};

/// Source of "now" and of timers.
///
/// Dropping the future returned by [`Clock::sleep`] cancels the timer.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the Tokio timer.
///
/// Follows Tokio's virtual time when the runtime clock is paused, which is how
/// tests drive grace periods and backoff without waiting.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Cancellation-aware execution context.
#[derive(Clone)]
pub struct Context {
    token: CancellationToken,
    process: Option<Process>,
    clock: Arc<dyn Clock>,
}

impl Context {
    /// A context that is never cancelled unless its token is, with no enclosing process.
    pub fn background() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Wraps an existing cancellation token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            process: None,
            clock: Arc::new(TokioClock),
        }
    }

    pub(crate) fn for_process(process: Process) -> Self {
        Self {
            token: process.token().clone(),
            clock: Arc::clone(process.clock()),
            process: Some(process),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The process this context belongs to, if any.
    pub fn process(&self) -> Option<&Process> {
        self.process.as_ref()
    }

    /// The clock of the enclosing process, or the Tokio clock outside of one.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits until the context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Returns [`ProcessError::Cancelled`] once the context has been cancelled.
    pub fn err(&self) -> Option<ProcessError> {
        self.is_cancelled().then_some(ProcessError::Cancelled)
    }

    /// Sleeps on the context clock.
    ///
    /// Returns `true` if the full duration elapsed and `false` if the context was
    /// cancelled first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = self.clock.sleep(duration) => true,
            _ = self.token.cancelled() => false,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .field("process", &self.process.as_ref().map(Process::id))
            .finish_non_exhaustive()
    }
}
