use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

pub(crate) const METRIC_SHUTDOWN_INITIATED: &str = "lifecycle_shutdown_initiated_total";
pub(crate) const METRIC_SHUTDOWN_COMPLETED: &str = "lifecycle_shutdown_completed_total";
pub(crate) const METRIC_RESOURCE_CLOSE_DURATION: &str = "lifecycle_resource_close_duration_seconds";
pub(crate) const METRIC_RESOURCE_CLOSE_RESULT: &str = "lifecycle_resource_close_result_total";

/// Shutdown instruments, recorded through the meter handed to the coordinator.
/// With a no-op meter every call below is free.
pub(crate) struct LifecycleMetrics {
    service_name: String,
    shutdown_initiated: Counter<u64>,
    shutdown_completed: Counter<u64>,
    resource_close_duration: Histogram<f64>,
    resource_close_result: Counter<u64>,
}

impl LifecycleMetrics {
    pub(crate) fn new(meter: &Meter, service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            shutdown_initiated: meter
                .u64_counter(METRIC_SHUTDOWN_INITIATED)
                .with_description("Shutdown sequences started")
                .init(),
            shutdown_completed: meter
                .u64_counter(METRIC_SHUTDOWN_COMPLETED)
                .with_description("Shutdown sequences that reached Closed")
                .init(),
            resource_close_duration: meter
                .f64_histogram(METRIC_RESOURCE_CLOSE_DURATION)
                .with_description("Time spent closing each resource")
                .init(),
            resource_close_result: meter
                .u64_counter(METRIC_RESOURCE_CLOSE_RESULT)
                .with_description("Outcome of each resource close")
                .init(),
        }
    }

    pub(crate) fn emit_shutdown_initiated(&self, trigger_reason: &str) {
        self.shutdown_initiated.add(
            1,
            &[
                KeyValue::new("service_name", self.service_name.clone()),
                KeyValue::new("trigger_reason", trigger_reason.to_string()),
            ],
        );
    }

    pub(crate) fn emit_shutdown_completed(&self, clean: bool) {
        self.shutdown_completed.add(
            1,
            &[
                KeyValue::new("service_name", self.service_name.clone()),
                KeyValue::new("clean", clean),
            ],
        );
    }

    pub(crate) fn emit_resource_closed(&self, resource: &str, result: &str, duration_secs: f64) {
        let labels = [
            KeyValue::new("service_name", self.service_name.clone()),
            KeyValue::new("resource", resource.to_string()),
            KeyValue::new("result", result.to_string()),
        ];
        self.resource_close_duration.record(duration_secs, &labels);
        self.resource_close_result.add(1, &labels);
    }
}
