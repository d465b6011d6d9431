use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, Mutex};

use crate::{process::ProcessOptions, supervisor::SupervisorInner, Supervisor};

/// Capacity of the pending-starts queue when none is configured.
pub const DEFAULT_START_CAPACITY: usize = 64;

/// Builds a `Supervisor` with configurable defaults.
///
/// Every child starts from [`ProcessOptions::defaults`], then the options given
/// to [`with_defaults`](Self::with_defaults), then the options passed to
/// [`Supervisor::start`].
pub struct SupervisorBuilder {
    defaults: ProcessOptions,
    start_capacity: usize,
}

impl SupervisorBuilder {
    /// Creates a new builder with default configuration values.
    pub fn new() -> Self {
        Self {
            defaults: ProcessOptions::defaults(),
            start_capacity: DEFAULT_START_CAPACITY,
        }
    }

    /// Adds default options applied to every child this supervisor starts.
    pub fn with_defaults(mut self, options: ProcessOptions) -> Self {
        self.defaults = self.defaults.merge(options);
        self
    }

    /// Sets how many starts may be queued before [`Supervisor::start`] waits.
    pub fn with_start_capacity(mut self, capacity: usize) -> Self {
        self.start_capacity = capacity.max(1);
        self
    }

    /// Constructs the `Supervisor` with the configured settings.
    pub fn build(self) -> Supervisor {
        let (starts_tx, starts_rx) = mpsc::channel(self.start_capacity);
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        Supervisor {
            inner: Arc::new(SupervisorInner {
                defaults: self.defaults,
                process: OnceLock::new(),
                starts_tx,
                starts_rx: Mutex::new(starts_rx),
                exits_tx,
                exits_rx: Mutex::new(exits_rx),
            }),
        }
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
