use tokio_util::sync::CancellationToken;

/// One-shot completion signal.
///
/// Opening is idempotent and irreversible; any number of waiters observe it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Latch(CancellationToken);

impl Latch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn open(&self) {
        self.0.cancel();
    }

    pub(crate) fn is_open(&self) -> bool {
        self.0.is_cancelled()
    }

    pub(crate) async fn wait(&self) {
        self.0.cancelled().await
    }
}
