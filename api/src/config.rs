use std::fmt;
use std::num::ParseIntError;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;

use common_database::{DatabaseConfig, TlsFiles, DEFAULT_ACQUIRE_TIMEOUT};
use envconfig::Envconfig;
use telemetry::TelemetryConfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "SERVICE_NAME")]
    pub service_name: NonEmptyString,

    #[envconfig(from = "SERVICE_VERSION", default = "v1.0.0")]
    pub service_version: String,

    #[envconfig(from = "ENVIRONMENT")]
    pub environment: NonEmptyString,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    #[envconfig(from = "DEBUG", default = "false")]
    pub debug: FlexBool,

    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,

    #[envconfig(from = "COLLECTOR_URL")]
    pub collector_url: Option<String>,

    #[envconfig(from = "COLLECTOR_CONNECT_TIMEOUT_MS", default = "3000")]
    pub collector_connect_timeout: EnvMsDuration,

    #[envconfig(from = "STARTUP_TIMEOUT_MS", default = "15000")]
    pub startup_timeout: EnvMsDuration,

    #[envconfig(from = "SHUTDOWN_TIMEOUT_MS", default = "15000")]
    pub shutdown_timeout: EnvMsDuration,

    #[envconfig(from = "SHUTDOWN_DRAIN_GRACE_PERIOD_MS", default = "0")]
    pub drain_grace_period: EnvMsDuration,

    #[envconfig(from = "METRIC_EXPORT_INTERVAL_MS", default = "60000")]
    pub metric_export_interval: EnvMsDuration,

    #[envconfig(from = "HANDLER_TIMEOUT_MS", default = "15000")]
    pub handler_timeout: EnvMsDuration,

    #[envconfig(nested = true)]
    pub postgres: PostgresConfig,
}

#[derive(Envconfig, Clone)]
pub struct PostgresConfig {
    #[envconfig(from = "PG_USER")]
    pub user: NonEmptyString,

    #[envconfig(from = "PG_PASSWORD")]
    pub password: String,

    #[envconfig(from = "PG_HOST")]
    pub host: NonEmptyString,

    #[envconfig(from = "PG_PORT", default = "5432")]
    pub port: u16,

    #[envconfig(from = "PG_NAME")]
    pub name: NonEmptyString,

    #[envconfig(from = "PG_SSL_ROOT_CERT")]
    pub ssl_root_cert: Option<String>,

    #[envconfig(from = "PG_SSL_KEY")]
    pub ssl_key: Option<String>,

    #[envconfig(from = "PG_SSL_CERT")]
    pub ssl_cert: Option<String>,

    #[envconfig(from = "PG_MAX_CONNS", default = "4")]
    pub max_connections: u32,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        let config = TelemetryConfig::new(
            &self.service_name,
            &self.service_version,
            &self.environment,
        )
        .with_export_interval(self.metric_export_interval.0)
        .with_connect_timeout(self.collector_connect_timeout.0);

        match &self.collector_url {
            Some(url) => config.with_collector_endpoint(url),
            None => config,
        }
    }

    pub fn database(&self) -> DatabaseConfig {
        let pg = &self.postgres;
        DatabaseConfig {
            host: pg.host.to_string(),
            port: pg.port,
            user: pg.user.to_string(),
            password: pg.password.clone(),
            name: pg.name.to_string(),
            tls: TlsFiles {
                root_cert: non_empty(&pg.ssl_root_cert),
                client_key: non_empty(&pg.ssl_key),
                client_cert: non_empty(&pg.ssl_cert),
            },
            max_connections: pg.max_connections,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT.min(self.startup_timeout.0),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub Duration);

impl FromStr for EnvMsDuration {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.trim().parse::<u64>()?;
        Ok(EnvMsDuration(Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyString(String);

impl FromStr for NonEmptyString {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Err("string must not be empty".to_string())
        } else {
            Ok(NonEmptyString(trimmed.to_string()))
        }
    }
}

impl Deref for NonEmptyString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for NonEmptyString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexBool(pub bool);

impl FromStr for FlexBool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(FlexBool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(FlexBool(false)),
            _ => Err(format!("Invalid boolean value: {}", s)),
        }
    }
}

impl Deref for FlexBool {
    type Target = bool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
