use std::{fmt, sync::Arc, time::Duration};

use crate::{
    context::{Clock, TokioClock},
    response::{cascade, close, Response},
};

/// Grace period applied when none is configured.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(120);

/// Configures how a [`Process`](crate::Process) reacts to each kind of outcome.
///
/// Every field is optional; [`ProcessOptions::merge`] layers call-specific
/// overrides on top of a supervisor's defaults.
#[derive(Clone, Default)]
pub struct ProcessOptions {
    pub(crate) on_success: Option<Vec<Response>>,
    pub(crate) on_error: Option<Vec<Response>>,
    pub(crate) on_cancel: Option<Vec<Response>>,
    pub(crate) on_panic: Option<Vec<Response>>,
    pub(crate) on_linger: Option<Vec<Response>>,
    pub(crate) grace: Option<Duration>,
    pub(crate) clock: Option<Arc<dyn Clock>>,
}

impl ProcessOptions {
    /// Options with nothing set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundle every supervisor starts from: close on any outcome except a
    /// lingering task, which cascades; two minutes of grace; the Tokio clock.
    pub fn defaults() -> Self {
        Self::new()
            .on_success([close()])
            .on_cancel([close()])
            .on_error([close()])
            .on_panic([close()])
            .on_linger([cascade()])
            .grace(DEFAULT_GRACE)
            .clock(Arc::new(TokioClock))
    }

    /// Responder chain consulted when the task returns `Ok(())`.
    pub fn on_success(mut self, responses: impl IntoIterator<Item = Response>) -> Self {
        self.on_success = Some(responses.into_iter().collect());
        self
    }

    /// Responder chain consulted when the task returns an error.
    pub fn on_error(mut self, responses: impl IntoIterator<Item = Response>) -> Self {
        self.on_error = Some(responses.into_iter().collect());
        self
    }

    /// Responder chain consulted when the task reports cancellation.
    pub fn on_cancel(mut self, responses: impl IntoIterator<Item = Response>) -> Self {
        self.on_cancel = Some(responses.into_iter().collect());
        self
    }

    /// Responder chain consulted when the task panics.
    pub fn on_panic(mut self, responses: impl IntoIterator<Item = Response>) -> Self {
        self.on_panic = Some(responses.into_iter().collect());
        self
    }

    /// Responder chain consulted when the task outlives its grace period.
    pub fn on_linger(mut self, responses: impl IntoIterator<Item = Response>) -> Self {
        self.on_linger = Some(responses.into_iter().collect());
        self
    }

    /// How long a cancelled task may keep running before it is declared lingering.
    ///
    /// Zero waits forever.
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = Some(grace);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Applies every field set in `overrides` on top of `self`.
    pub fn merge(mut self, overrides: ProcessOptions) -> Self {
        let ProcessOptions {
            on_success,
            on_error,
            on_cancel,
            on_panic,
            on_linger,
            grace,
            clock,
        } = overrides;

        if on_success.is_some() {
            self.on_success = on_success;
        }
        if on_error.is_some() {
            self.on_error = on_error;
        }
        if on_cancel.is_some() {
            self.on_cancel = on_cancel;
        }
        if on_panic.is_some() {
            self.on_panic = on_panic;
        }
        if on_linger.is_some() {
            self.on_linger = on_linger;
        }
        if grace.is_some() {
            self.grace = grace;
        }
        if clock.is_some() {
            self.clock = clock;
        }
        self
    }
}

impl fmt::Debug for ProcessOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = |responses: &Option<Vec<Response>>| responses.as_ref().map(Vec::len);
        f.debug_struct("ProcessOptions")
            .field("on_success", &len(&self.on_success))
            .field("on_error", &len(&self.on_error))
            .field("on_cancel", &len(&self.on_cancel))
            .field("on_panic", &len(&self.on_panic))
            .field("on_linger", &len(&self.on_linger))
            .field("grace", &self.grace)
            .field("custom_clock", &self.clock.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::restart;

    #[test]
    fn test_merge_overrides_only_set_fields() {
        let merged = ProcessOptions::defaults().merge(
            ProcessOptions::new()
                .on_error([restart(), restart()])
                .grace(Duration::ZERO),
        );

        assert_eq!(merged.on_error.as_ref().map(Vec::len), Some(2));
        assert_eq!(merged.on_success.as_ref().map(Vec::len), Some(1));
        assert_eq!(merged.grace, Some(Duration::ZERO));
        assert!(merged.clock.is_some());
    }

    #[test]
    fn test_new_has_nothing_set() {
        let options = ProcessOptions::new();
        assert!(options.on_success.is_none());
        assert!(options.grace.is_none());
        assert!(options.clock.is_none());
    }
}
