use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use lifecycle::ServiceResource;
use opentelemetry::global;
use opentelemetry::metrics::noop::NoopMeterProvider;
use opentelemetry::metrics::{Meter, MeterProvider, MetricsError};
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::trace::TraceError;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{BatchConfig, RandomIdGenerator, Sampler, Tracer};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{SignalKind, TelemetryConfig};
use crate::error::TelemetryError;
use crate::probe;

enum Exporter {
    Noop,
    Trace(Tracer),
    Metric(SdkMeterProvider),
}

/// Export pipeline for one signal kind.
///
/// Built once at startup by [`install`](TelemetryPipeline::install) and torn
/// down once by [`cleanup`](TelemetryPipeline::cleanup). Components that emit
/// telemetry get it through the narrow façade ([`tracer`](TelemetryPipeline::tracer),
/// [`meter`](TelemetryPipeline::meter)); a no-op pipeline hands out no-op
/// instruments, so callers never branch on whether export is enabled.
pub struct TelemetryPipeline {
    kind: SignalKind,
    collector_endpoint: Option<String>,
    exporter: Exporter,
    cleaned_up: AtomicBool,
}

impl TelemetryPipeline {
    /// Connect to the collector and install the pipeline as the process-wide
    /// provider for `kind`.
    ///
    /// Falls back to a no-op pipeline, without error, when the collector or
    /// environment is not configured or when the collector can't be reached.
    /// Only a failure to build the exporter after the collector answered is
    /// reported as an error.
    pub async fn install(kind: SignalKind, config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let Some(raw_endpoint) = config.export_endpoint() else {
            info!(
                signal = %kind,
                "Telemetry: collector or environment not configured, using no-op pipeline"
            );
            return Ok(Self::noop(kind));
        };

        let endpoint = match probe::normalize_endpoint(raw_endpoint) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(signal = %kind, collector = raw_endpoint, error = %e,
                    "Telemetry: failed to create connection to collector, using no-op pipeline");
                return Ok(Self::degraded(kind, raw_endpoint));
            }
        };
        let probed = probe::probe(&endpoint, config.connect_timeout).await;
        let endpoint = endpoint.as_str().trim_end_matches('/').to_string();
        if let Err(e) = probed {
            warn!(signal = %kind, collector = %endpoint, error = %e,
                "Telemetry: failed to create connection to collector, using no-op pipeline");
            return Ok(Self::degraded(kind, &endpoint));
        }

        let exporter = match kind {
            SignalKind::Trace => Exporter::Trace(install_tracer(&endpoint, config)?),
            SignalKind::Metric => Exporter::Metric(install_meter(&endpoint, config)?),
        };

        info!(
            signal = %kind,
            collector = %endpoint,
            service_name = %config.service_name,
            environment = %config.environment,
            "Telemetry: export pipeline installed"
        );

        Ok(Self {
            kind,
            collector_endpoint: Some(endpoint),
            exporter,
            cleaned_up: AtomicBool::new(false),
        })
    }

    /// A pipeline that discards everything and performs no I/O.
    pub fn noop(kind: SignalKind) -> Self {
        Self {
            kind,
            collector_endpoint: None,
            exporter: Exporter::Noop,
            cleaned_up: AtomicBool::new(false),
        }
    }

    fn degraded(kind: SignalKind, endpoint: &str) -> Self {
        Self {
            collector_endpoint: Some(endpoint.to_string()),
            ..Self::noop(kind)
        }
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.exporter, Exporter::Noop)
    }

    /// The configured collector, also kept when the pipeline degraded to no-op.
    pub fn collector_endpoint(&self) -> Option<&str> {
        self.collector_endpoint.as_deref()
    }

    /// The exporting tracer, for bridging `tracing` spans. None for no-op and
    /// metric pipelines: spans with nowhere to go are simply not bridged.
    pub fn tracer(&self) -> Option<Tracer> {
        match &self.exporter {
            Exporter::Trace(tracer) => Some(tracer.clone()),
            _ => None,
        }
    }

    /// A meter from this pipeline; no-op unless this is a connected metric pipeline.
    pub fn meter(&self, name: &'static str) -> Meter {
        match &self.exporter {
            Exporter::Metric(provider) => provider.meter(name),
            _ => NoopMeterProvider::new().meter(name),
        }
    }

    /// Flush buffered records, then shut down the exporter and its provider.
    ///
    /// Runs at most once; later calls return immediately. Failures are logged,
    /// never returned. The blocking SDK calls run off the async runtime and are
    /// abandoned, still running, if they outlast `deadline`.
    pub async fn cleanup(&self, deadline: Instant) {
        if self.cleaned_up.swap(true, Ordering::AcqRel) {
            debug!(signal = %self.kind, "Telemetry: pipeline already cleaned up");
            return;
        }

        let shutdown = match &self.exporter {
            Exporter::Noop => return,
            Exporter::Trace(tracer) => {
                let tracer = tracer.clone();
                tokio::task::spawn_blocking(move || shutdown_tracer(&tracer))
            }
            Exporter::Metric(provider) => {
                let provider = provider.clone();
                tokio::task::spawn_blocking(move || shutdown_meter(&provider))
            }
        };

        match tokio::time::timeout_at(deadline, shutdown).await {
            Ok(Ok(())) => info!(signal = %self.kind, "Telemetry: pipeline shut down"),
            Ok(Err(e)) => warn!(signal = %self.kind, "Telemetry: pipeline shutdown task failed: {e}"),
            Err(_) => warn!(
                signal = %self.kind,
                "Telemetry: pipeline still flushing at shutdown deadline, abandoning it"
            ),
        }
    }
}

#[async_trait]
impl ServiceResource for TelemetryPipeline {
    fn name(&self) -> &str {
        match self.kind {
            SignalKind::Trace => "trace_pipeline",
            SignalKind::Metric => "metric_pipeline",
        }
    }

    async fn close(&self, deadline: Instant) -> anyhow::Result<()> {
        self.cleanup(deadline).await;
        Ok(())
    }
}

/// Always-on sampling, batched export. `install_batch` registers the provider
/// as the global tracer provider.
fn install_tracer(endpoint: &str, config: &TelemetryConfig) -> Result<Tracer, TraceError> {
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(config.resource()),
        )
        .with_batch_config(BatchConfig::default())
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_timeout(config.connect_timeout),
        )
        .install_batch(runtime::Tokio)?;

    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(tracer)
}

/// Periodic export. The OTLP metrics pipeline registers the provider as the
/// global meter provider when built.
fn install_meter(
    endpoint: &str,
    config: &TelemetryConfig,
) -> Result<SdkMeterProvider, MetricsError> {
    opentelemetry_otlp::new_pipeline()
        .metrics(runtime::Tokio)
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_timeout(config.connect_timeout),
        )
        .with_resource(config.resource())
        .with_period(config.export_interval())
        .build()
}

fn shutdown_tracer(tracer: &Tracer) {
    if let Some(provider) = tracer.provider() {
        for result in provider.force_flush() {
            if let Err(err) = result {
                warn!(signal = "trace", "Telemetry: flushing spans failed: {err}");
            }
        }
    }
    // Releases the last provider handle, which shuts down the batch processor
    // and its exporter.
    global::shutdown_tracer_provider();
}

fn shutdown_meter(provider: &SdkMeterProvider) {
    if let Err(err) = provider.force_flush() {
        warn!(signal = "metric", "Telemetry: flushing metrics failed: {err}");
    }
    if let Err(err) = provider.shutdown() {
        warn!(signal = "metric", "Telemetry: stopping meter provider failed: {err}");
    }
}
