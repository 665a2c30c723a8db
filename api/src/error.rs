use std::io;
use std::time::Duration;

use common_database::CustomDatabaseError;
use lifecycle::LifecycleError;
use telemetry::TelemetryError;
use thiserror::Error;

/// Everything that keeps the service from reaching a serving state.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] envconfig::Error),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("database unreachable at startup: {0}")]
    DatabaseUnreachable(#[source] CustomDatabaseError),

    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Signals(#[from] LifecycleError),

    #[error("startup did not complete within {0:?}")]
    Timeout(Duration),
}
