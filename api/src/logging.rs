use opentelemetry_sdk::trace::Tracer;
use tracing::warn;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::Config;

type OtelLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the slot the OpenTelemetry layer is loaded into once the trace
/// pipeline is up.
pub struct TracingHandle {
    otel: reload::Handle<Option<OtelLayer>, Registry>,
}

impl TracingHandle {
    /// Starts bridging `tracing` spans into the trace pipeline. A no-op
    /// pipeline has no tracer and leaves the slot empty.
    pub fn attach(&self, tracer: Option<Tracer>) {
        let Some(tracer) = tracer else {
            return;
        };
        let layer: OtelLayer = tracing_opentelemetry::layer().with_tracer(tracer).boxed();
        if let Err(e) = self.otel.reload(Some(layer)) {
            warn!("Failed to attach OpenTelemetry layer: {e}");
        }
    }
}

/// Installs the global subscriber: stdout logs filtered by `RUST_LOG`, or by
/// `LOG_LEVEL` when unset. JSON in production, pretty and colored with `DEBUG`.
pub fn init(config: &Config) -> TracingHandle {
    let (otel_layer, otel) = reload::Layer::new(None::<OtelLayer>);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let log_layer = {
        let base_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true);

        if *config.debug {
            base_layer
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        } else {
            base_layer.json().with_filter(filter).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(log_layer)
        .init();

    TracingHandle { otel }
}
