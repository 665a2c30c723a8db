//! OpenTelemetry export pipelines for traces and metrics.
//!
//! A pipeline talks OTLP/gRPC to a collector agent. When the collector is not
//! configured, the environment is unknown, or the collector can't be reached at
//! install time, the pipeline degrades to a no-op instead of failing startup.

mod config;
mod error;
mod pipeline;
mod probe;

pub use config::{SignalKind, TelemetryConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_EXPORT_INTERVAL};
pub use error::TelemetryError;
pub use pipeline::TelemetryPipeline;
