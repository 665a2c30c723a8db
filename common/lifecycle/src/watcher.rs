use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::coordinator::ShutdownCoordinator;
use crate::error::LifecycleError;
use crate::signals::ShutdownSignals;

/// Background task that waits for a termination signal, triggers the
/// coordinator once, and stops watching. If shutdown starts from anywhere
/// else first, the watcher stops without triggering.
pub struct SignalWatcher {
    task: JoinHandle<()>,
}

impl SignalWatcher {
    /// Install SIGINT/SIGTERM handlers and start watching. Returns as soon as
    /// the handlers are installed; never blocks startup.
    pub fn arm(coordinator: Arc<ShutdownCoordinator>) -> Result<Self, LifecycleError> {
        let mut signals = ShutdownSignals::register()?;
        Ok(Self::spawn(coordinator, async move { signals.recv().await }))
    }

    /// Watch an arbitrary signal source; the future's output is logged as the
    /// trigger reason.
    pub fn spawn<F>(coordinator: Arc<ShutdownCoordinator>, signal: F) -> Self
    where
        F: Future<Output = &'static str> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::select! {
                reason = signal => {
                    coordinator.trigger(reason).await;
                }
                _ = coordinator.shutdown_recv() => {
                    debug!("Lifecycle: shutdown initiated elsewhere, signal watcher stopping");
                }
            }
        });
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the watcher task to end, i.e. until it has run the teardown
    /// or stood down.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!("signal watcher task failed: {e}");
        }
    }
}
