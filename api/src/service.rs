use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use common_database::{get_pool, PooledResource, PostgresClient};
use lifecycle::{LifecycleError, ServiceResource, ShutdownCoordinator, SignalWatcher, Stage};
use opentelemetry_sdk::trace::Tracer;
use telemetry::{SignalKind, TelemetryConfig, TelemetryError, TelemetryPipeline};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::StartupError;
use crate::middleware::HttpMetrics;
use crate::router;
use crate::server::HttpListener;

/// Deadline for releasing what was already set up when startup fails.
const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Trace and metric pipelines, installed together.
pub struct Telemetry {
    pub traces: Arc<TelemetryPipeline>,
    pub metrics: Arc<TelemetryPipeline>,
}

impl Telemetry {
    pub async fn install(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let traces = TelemetryPipeline::install(SignalKind::Trace, config).await?;
        let metrics = match TelemetryPipeline::install(SignalKind::Metric, config).await {
            Ok(metrics) => metrics,
            Err(e) => {
                traces.cleanup(Instant::now() + ROLLBACK_TIMEOUT).await;
                return Err(e);
            }
        };

        Ok(Self {
            traces: Arc::new(traces),
            metrics: Arc::new(metrics),
        })
    }

    pub fn noop() -> Self {
        Self {
            traces: Arc::new(TelemetryPipeline::noop(SignalKind::Trace)),
            metrics: Arc::new(TelemetryPipeline::noop(SignalKind::Metric)),
        }
    }

    async fn cleanup(&self, deadline: Instant) {
        self.metrics.cleanup(deadline).await;
        self.traces.cleanup(deadline).await;
    }
}

/// A started service: telemetry installed, database reachable, listener bound
/// and every resource registered with the shutdown coordinator.
pub struct Service {
    telemetry: Telemetry,
    listener: Arc<HttpListener>,
    coordinator: Arc<ShutdownCoordinator>,
    router: Router,
    watcher: Option<SignalWatcher>,
}

impl Service {
    /// Installs telemetry, opens the pool and hands over to
    /// [`start_with`](Service::start_with), all within the startup timeout.
    pub async fn start(config: &Config) -> Result<Self, StartupError> {
        let startup_timeout = config.startup_timeout.0;

        let start = async {
            let telemetry = Telemetry::install(&config.telemetry()).await?;
            let pool = get_pool(&config.database());
            Self::start_with(config, telemetry, Arc::new(pool)).await
        };

        tokio::time::timeout(startup_timeout, start)
            .await
            .map_err(|_| StartupError::Timeout(startup_timeout))?
    }

    /// Pings the database, binds the listener and wires up shutdown. When
    /// either step fails, the pool and the telemetry pipelines are released
    /// before returning and the listener is never bound.
    pub async fn start_with(
        config: &Config,
        telemetry: Telemetry,
        client: PostgresClient,
    ) -> Result<Self, StartupError> {
        let database = Arc::new(PooledResource::new(client));

        if let Err(e) = database.ping(config.startup_timeout.0).await {
            error!("Startup: database ping failed: {e}");
            rollback(&telemetry, &database).await;
            return Err(StartupError::DatabaseUnreachable(e));
        }

        let addr = config.bind();
        let listener = match HttpListener::bind(&addr).await {
            Ok(listener) => Arc::new(listener),
            Err(source) => {
                error!("Startup: could not bind {addr}: {source}");
                rollback(&telemetry, &database).await;
                return Err(StartupError::Bind { addr, source });
            }
        };

        let meter = telemetry.metrics.meter("api");

        let coordinator = Arc::new(
            ShutdownCoordinator::builder(&config.service_name)
                .with_shutdown_timeout(config.shutdown_timeout.0)
                .with_drain_grace_period(config.drain_grace_period.0)
                .with_meter(meter.clone())
                .register(Stage::Listener, listener.clone())
                .register(Stage::Database, database)
                .register(Stage::Metrics, telemetry.metrics.clone())
                .register(Stage::Traces, telemetry.traces.clone())
                .build(),
        );

        let router = router::router(
            coordinator.health_gate(),
            HttpMetrics::new(&meter),
            config.handler_timeout.0,
        );

        info!(
            address = %listener.local_addr(),
            version = %config.service_version,
            environment = %config.environment,
            "Startup: service ready"
        );

        Ok(Self {
            telemetry,
            listener,
            coordinator,
            router,
            watcher: None,
        })
    }

    /// Starts watching for SIGINT and SIGTERM in the background.
    pub async fn arm_signals(&mut self) -> Result<(), StartupError> {
        self.arm_with(SignalWatcher::arm).await
    }

    /// Installs the watcher built by `arm`. If arming fails, everything
    /// already started is torn down before the error is returned.
    pub async fn arm_with<F>(&mut self, arm: F) -> Result<(), StartupError>
    where
        F: FnOnce(Arc<ShutdownCoordinator>) -> Result<SignalWatcher, LifecycleError>,
    {
        match arm(self.coordinator.clone()) {
            Ok(watcher) => {
                self.watcher = Some(watcher);
                Ok(())
            }
            Err(e) => {
                error!("Startup: could not arm signal watcher: {e}");
                self.coordinator.trigger("startup_failed").await;
                Err(e.into())
            }
        }
    }

    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        self.coordinator.clone()
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.listener.local_addr()
    }

    pub fn tracer(&self) -> Option<Tracer> {
        self.telemetry.traces.tracer()
    }

    /// Serves until shutdown completes.
    ///
    /// A signal, or any other trigger, closes the listener first; serving then
    /// returns and this waits for the rest of the teardown. If the listener
    /// stops on its own, that starts the shutdown instead. Connections still
    /// open once the coordinator is `Closed` are abandoned.
    pub async fn run(self) -> io::Result<()> {
        let served = tokio::select! {
            served = self.listener.serve(self.router.clone()) => served,
            _ = self.coordinator.closed_recv() => {
                warn!("Shutdown closed with connections still draining, abandoning them");
                Ok(())
            }
        };

        let reason = match &served {
            Ok(()) => "listener_stopped",
            Err(e) => {
                error!("Listener failed: {e}");
                "listener_failed"
            }
        };
        // No-op when the shutdown is already underway.
        self.coordinator.trigger(reason).await;
        self.coordinator.closed_recv().await;

        if let Some(watcher) = self.watcher {
            watcher.join().await;
        }

        info!("Service stopped");
        served
    }
}

async fn rollback(telemetry: &Telemetry, database: &PooledResource) {
    let deadline = Instant::now() + ROLLBACK_TIMEOUT;
    if let Err(e) = database.close(deadline).await {
        error!("Startup rollback: {e}");
    }
    telemetry.cleanup(deadline).await;
}
