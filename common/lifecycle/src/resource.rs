//! Resources torn down by the [`ShutdownCoordinator`](crate::ShutdownCoordinator).

use async_trait::async_trait;
use tokio::time::Instant;

/// Anything the coordinator closes during shutdown: the HTTP listener, the
/// database pool, a telemetry pipeline.
///
/// `close` receives the shared shutdown deadline and must return promptly once
/// it has passed. The coordinator also bounds each call with the deadline, so
/// an implementation that ignores it is abandoned rather than waited on.
/// Errors are logged by the coordinator and never stop later resources from
/// closing.
#[async_trait]
pub trait ServiceResource: Send + Sync {
    /// Stable name used in logs and metrics.
    fn name(&self) -> &str;

    async fn close(&self, deadline: Instant) -> anyhow::Result<()>;
}

/// Position of a resource in the teardown sequence. Request-serving capacity
/// goes first, then what requests depend on, then metrics, and tracing last so
/// the earlier steps can still be recorded and flushed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Listener,
    Database,
    Metrics,
    Traces,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Listener => "listener",
            Stage::Database => "database",
            Stage::Metrics => "metrics",
            Stage::Traces => "traces",
        }
    }
}
