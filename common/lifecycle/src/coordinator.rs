//! Shutdown coordinator: single-trigger, ordered, deadline-bound teardown.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::metrics::noop::NoopMeterProvider;
use opentelemetry::metrics::{Meter, MeterProvider};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::health::HealthGate;
use crate::metrics::LifecycleMetrics;
use crate::resource::{ServiceResource, Stage};

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownState {
    Running = 0,
    ShuttingDown = 1,
    Closed = 2,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ShutdownState::Running,
            1 => ShutdownState::ShuttingDown,
            _ => ShutdownState::Closed,
        }
    }
}

/// Builder for [`ShutdownCoordinator`].
pub struct ShutdownCoordinatorBuilder {
    name: String,
    shutdown_timeout: Duration,
    drain_grace_period: Duration,
    health: HealthGate,
    meter: Option<Meter>,
    resources: Vec<(Stage, Arc<dyn ServiceResource>)>,
}

impl ShutdownCoordinatorBuilder {
    /// Shared deadline for the whole teardown, measured from the trigger.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Delay between flipping the health gate and draining the listener, so
    /// load balancers observe the failing probe before connections are
    /// refused. Counts against the shutdown timeout. Zero disables it.
    pub fn with_drain_grace_period(mut self, grace: Duration) -> Self {
        self.drain_grace_period = grace;
        self
    }

    /// Gate flipped on trigger; share it with the `/health` route.
    pub fn with_health_gate(mut self, health: HealthGate) -> Self {
        self.health = health;
        self
    }

    pub fn with_meter(mut self, meter: Meter) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Add a resource to the teardown. Resources close in [`Stage`] order;
    /// within one stage, in registration order.
    pub fn register(mut self, stage: Stage, resource: Arc<dyn ServiceResource>) -> Self {
        debug!(
            stage = stage.as_str(),
            resource = resource.name(),
            "Lifecycle: resource registered"
        );
        self.resources.push((stage, resource));
        self
    }

    pub fn build(self) -> ShutdownCoordinator {
        let mut resources = self.resources;
        resources.sort_by_key(|(stage, _)| *stage);

        let meter = self
            .meter
            .unwrap_or_else(|| NoopMeterProvider::new().meter("lifecycle"));

        ShutdownCoordinator {
            metrics: LifecycleMetrics::new(&meter, &self.name),
            name: self.name,
            shutdown_timeout: self.shutdown_timeout,
            drain_grace_period: self.drain_grace_period,
            health: self.health,
            resources,
            state: AtomicU8::new(ShutdownState::Running as u8),
            shutdown_token: CancellationToken::new(),
            closed_token: CancellationToken::new(),
        }
    }
}

/// Owns the teardown of the service's resources.
///
/// [`trigger`](ShutdownCoordinator::trigger) moves `Running -> ShuttingDown`
/// through a compare-and-swap, so only the first caller runs the sequence;
/// every later call returns immediately. The sequence flips the health gate,
/// waits out the drain grace period, then closes each resource in stage order
/// under one shared deadline. A failing close is logged and the sequence moves
/// on; once the deadline passes, resources not yet closed are abandoned. The
/// coordinator then reaches `Closed`, which is terminal.
pub struct ShutdownCoordinator {
    name: String,
    shutdown_timeout: Duration,
    drain_grace_period: Duration,
    health: HealthGate,
    resources: Vec<(Stage, Arc<dyn ServiceResource>)>,
    metrics: LifecycleMetrics,
    state: AtomicU8,
    shutdown_token: CancellationToken,
    closed_token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn builder(name: &str) -> ShutdownCoordinatorBuilder {
        ShutdownCoordinatorBuilder {
            name: name.to_string(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            drain_grace_period: Duration::ZERO,
            health: HealthGate::new(),
            meter: None,
            resources: Vec::new(),
        }
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn health_gate(&self) -> HealthGate {
        self.health.clone()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Future that resolves once shutdown has been triggered.
    pub fn shutdown_recv(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.shutdown_token.cancelled()
    }

    /// Future that resolves once the coordinator reached `Closed`.
    pub fn closed_recv(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.closed_token.cancelled()
    }

    /// Run the teardown if nobody has yet. Returns true for the call that ran
    /// it, after it finished; false for every other call, without waiting.
    pub async fn trigger(&self, reason: &str) -> bool {
        if self
            .state
            .compare_exchange(
                ShutdownState::Running as u8,
                ShutdownState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            debug!(
                trigger_reason = reason,
                state = ?self.state(),
                "Lifecycle: shutdown already initiated, trigger ignored"
            );
            return false;
        }

        let started = Instant::now();
        let deadline = started + self.shutdown_timeout;

        self.health.mark_unhealthy();
        self.shutdown_token.cancel();
        self.metrics.emit_shutdown_initiated(reason);
        info!(
            app = %self.name,
            trigger_reason = reason,
            shutdown_timeout_secs = self.shutdown_timeout.as_secs_f64(),
            "Lifecycle: shutdown initiated"
        );

        if !self.drain_grace_period.is_zero() {
            let grace_end = (started + self.drain_grace_period).min(deadline);
            debug!(
                drain_grace_period_secs = self.drain_grace_period.as_secs_f64(),
                "Lifecycle: waiting out drain grace period"
            );
            tokio::time::sleep_until(grace_end).await;
        }

        let mut clean = true;
        for (stage, resource) in &self.resources {
            if !self.close_resource(*stage, resource.as_ref(), deadline).await {
                clean = false;
            }
        }

        self.state
            .store(ShutdownState::Closed as u8, Ordering::Release);
        self.metrics.emit_shutdown_completed(clean);
        let total = started.elapsed();
        if clean {
            info!(
                clean = true,
                total_duration_secs = total.as_secs_f64(),
                "Lifecycle: shutdown complete"
            );
        } else {
            warn!(
                clean = false,
                total_duration_secs = total.as_secs_f64(),
                "Lifecycle: shutdown complete with failures"
            );
        }
        self.closed_token.cancel();
        true
    }

    async fn close_resource(
        &self,
        stage: Stage,
        resource: &dyn ServiceResource,
        deadline: Instant,
    ) -> bool {
        let name = resource.name();
        let clock = Instant::now();

        if clock >= deadline {
            self.metrics.emit_resource_closed(name, "abandoned", 0.0);
            warn!(
                stage = stage.as_str(),
                resource = name,
                result = "abandoned",
                "Lifecycle: shutdown deadline reached before resource was closed"
            );
            return false;
        }

        let outcome = tokio::time::timeout_at(deadline, resource.close(deadline)).await;
        let elapsed = clock.elapsed().as_secs_f64();
        match outcome {
            Ok(Ok(())) => {
                self.metrics.emit_resource_closed(name, "closed", elapsed);
                info!(
                    stage = stage.as_str(),
                    resource = name,
                    duration_secs = elapsed,
                    result = "closed",
                    "Lifecycle: resource closed"
                );
                true
            }
            Ok(Err(e)) => {
                self.metrics.emit_resource_closed(name, "failed", elapsed);
                warn!(
                    stage = stage.as_str(),
                    resource = name,
                    duration_secs = elapsed,
                    result = "failed",
                    "Lifecycle: resource failed to close: {e:#}"
                );
                false
            }
            Err(_) => {
                self.metrics.emit_resource_closed(name, "timeout", elapsed);
                warn!(
                    stage = stage.as_str(),
                    resource = name,
                    duration_secs = elapsed,
                    result = "timeout",
                    "Lifecycle: resource still closing at shutdown deadline"
                );
                false
            }
        }
    }
}
