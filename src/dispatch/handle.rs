use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::{CycleReport, Dispatcher};
use crate::publish::Publisher;
use crate::source::SourceStore;

/// Totals accumulated by a running dispatcher.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherStats {
    pub cycles: usize,
    pub delivered: usize,
    pub failed: usize,
    pub exhausted: usize,
}

impl DispatcherStats {
    pub(crate) fn absorb(&mut self, report: &CycleReport) {
        self.delivered += report.delivered;
        self.failed += report.failed;
        self.exhausted += report.exhausted;
    }
}

/// A dispatcher running on a tokio task.
///
/// ```ignore
/// let handle = Dispatcher::new(store, publisher)
///     .with_config(config.dispatcher)
///     .spawn();
///
/// // ... serve requests ...
///
/// let stats = handle.stop().await;
/// tracing::info!(delivered = stats.delivered, "shut down");
/// ```
pub struct DispatcherHandle {
    shutdown: CancellationToken,
    task: JoinHandle<DispatcherStats>,
}

impl DispatcherHandle {
    pub(crate) fn spawn<S, P>(dispatcher: Dispatcher<S, P>) -> Self
    where
        S: SourceStore + 'static,
        P: Publisher + 'static,
    {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { dispatcher.run(token).await });
        Self { shutdown, task }
    }

    /// Token that stops the dispatcher when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask the dispatcher to stop without waiting for it.
    pub fn signal_stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the dispatcher and wait for its final statistics.
    pub async fn stop(self) -> DispatcherStats {
        self.shutdown.cancel();
        match self.task.await {
            Ok(stats) => stats,
            Err(err) => {
                error!(error = %err, "dispatcher task ended abnormally");
                DispatcherStats::default()
            }
        }
    }
}
