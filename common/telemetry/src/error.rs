use opentelemetry::metrics::MetricsError;
use opentelemetry::trace::TraceError;
use thiserror::Error;

/// Failures that remain fatal once the collector is known to be reachable.
/// An unreachable or unconfigured collector is never an error.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to build trace pipeline: {0}")]
    Trace(#[from] TraceError),

    #[error("failed to build metric pipeline: {0}")]
    Metrics(#[from] MetricsError),
}
