use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::error::LifecycleError;

/// SIGINT and SIGTERM listeners. Registered eagerly, so a signal delivered
/// between registration and the first [`recv`](ShutdownSignals::recv) is not
/// lost.
pub struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignals {
    pub fn register() -> Result<Self, LifecycleError> {
        let interrupt =
            signal(SignalKind::interrupt()).map_err(|source| LifecycleError::SignalRegistration {
                signal: "SIGINT",
                source,
            })?;
        let terminate =
            signal(SignalKind::terminate()).map_err(|source| LifecycleError::SignalRegistration {
                signal: "SIGTERM",
                source,
            })?;
        Ok(Self {
            interrupt,
            terminate,
        })
    }

    /// Waits for the next SIGINT or SIGTERM and returns its name.
    pub async fn recv(&mut self) -> &'static str {
        let received = tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        };
        tracing::info!("received {received}");
        received
    }
}
