use std::process::ExitCode;

use envconfig::Envconfig;
use tracing::{error, info_span, Instrument};

use api::config::Config;
use api::error::StartupError;
use api::logging::{self, TracingHandle};
use api::service::Service;

async fn run(config: Config, tracing: TracingHandle) -> anyhow::Result<()> {
    let mut service = Service::start(&config).await?;
    tracing.attach(service.tracer());
    service.arm_signals().await?;
    service.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logging isn't configured until the config is read.
    let config = match Config::init_from_env().map_err(StartupError::from) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let tracing = logging::init(&config);
    let span = info_span!("service", service = %config.service_name);

    match run(config, tracing).instrument(span).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Service exited with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
