use std::fmt;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;

/// Metric export period used when none (or zero) is configured.
pub const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Trace,
    Metric,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Trace => "trace",
            SignalKind::Metric => "metric",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    /// Deployment environment; an empty value disables export.
    pub environment: String,
    /// `host:port` or URL of the OTLP/gRPC collector; unset or empty disables export.
    pub collector_endpoint: Option<String>,
    /// Zero means [`DEFAULT_EXPORT_INTERVAL`].
    pub export_interval: Duration,
    /// Bound on the collector reachability check and on each export call.
    pub connect_timeout: Duration,
}

impl TelemetryConfig {
    pub fn new(service_name: &str, service_version: &str, environment: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            service_version: service_version.to_string(),
            environment: environment.to_string(),
            collector_endpoint: None,
            export_interval: DEFAULT_EXPORT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_collector_endpoint(mut self, endpoint: &str) -> Self {
        self.collector_endpoint = Some(endpoint.to_string());
        self
    }

    pub fn with_export_interval(mut self, interval: Duration) -> Self {
        self.export_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn export_interval(&self) -> Duration {
        if self.export_interval.is_zero() {
            DEFAULT_EXPORT_INTERVAL
        } else {
            self.export_interval
        }
    }

    /// The endpoint to export to, or None when export is disabled.
    pub(crate) fn export_endpoint(&self) -> Option<&str> {
        if self.environment.trim().is_empty() {
            return None;
        }
        self.collector_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
    }

    /// Attached to every exported span and metric.
    pub(crate) fn resource(&self) -> Resource {
        Resource::new(vec![
            KeyValue::new("service.name", self.service_name.clone()),
            KeyValue::new("service.version", self.service_version.clone()),
            KeyValue::new("deployment.environment", self.environment.clone()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Key;

    #[test]
    fn export_disabled_without_endpoint_or_environment() {
        let config = TelemetryConfig::new("api", "v1.0.0", "production");
        assert_eq!(config.export_endpoint(), None);

        let config = config.with_collector_endpoint("   ");
        assert_eq!(config.export_endpoint(), None);

        let config = TelemetryConfig::new("api", "v1.0.0", "").with_collector_endpoint("otel:4317");
        assert_eq!(config.export_endpoint(), None);

        let config =
            TelemetryConfig::new("api", "v1.0.0", "staging").with_collector_endpoint(" otel:4317 ");
        assert_eq!(config.export_endpoint(), Some("otel:4317"));
    }

    #[test]
    fn zero_export_interval_falls_back_to_default() {
        let config =
            TelemetryConfig::new("api", "v1.0.0", "staging").with_export_interval(Duration::ZERO);
        assert_eq!(config.export_interval(), DEFAULT_EXPORT_INTERVAL);

        let config = config.with_export_interval(Duration::from_secs(5));
        assert_eq!(config.export_interval(), Duration::from_secs(5));
    }

    #[test]
    fn resource_carries_service_metadata() {
        let resource = TelemetryConfig::new("api", "v2.3.4", "staging").resource();

        assert_eq!(
            resource.get(Key::from_static_str("service.name")),
            Some("api".into())
        );
        assert_eq!(
            resource.get(Key::from_static_str("service.version")),
            Some("v2.3.4".into())
        );
        assert_eq!(
            resource.get(Key::from_static_str("deployment.environment")),
            Some("staging".into())
        );
    }
}
