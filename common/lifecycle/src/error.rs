//! Lifecycle error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The OS refused to install a SIGINT/SIGTERM handler.
    #[error("failed to install {signal} handler: {source}")]
    SignalRegistration {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },
}
