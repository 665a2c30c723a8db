use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode},
    Connection,
};
use thiserror::Error;

mod resource;

pub use resource::PooledResource;

pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum CustomDatabaseError {
    #[error("Pg error: {0}")]
    Other(#[from] sqlx::Error),

    #[error("Client timeout error")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

pub type PostgresClient = Arc<dyn Client + Send + Sync>;

/// The handful of pool operations the service lifecycle needs: a liveness
/// check at startup and a release at shutdown.
#[async_trait]
pub trait Client {
    /// Acquires one connection and round-trips a ping over it.
    async fn ping(&self) -> Result<(), CustomDatabaseError>;

    /// Stops handing out connections and waits for checked-out ones to come
    /// back before closing them. Calling it again is a no-op.
    async fn close(&self);

    fn is_closed(&self) -> bool;

    fn get_pool_stats(&self) -> Option<PoolStats>;
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: u32,
    pub num_idle: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TlsFiles {
    pub root_cert: Option<String>,
    pub client_key: Option<String>,
    pub client_cert: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub tls: TlsFiles,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// TLS is verified against the given root certificate and presents the
    /// client certificate, but only when all three files are configured.
    /// Anything less disables TLS.
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name);

        match (
            &self.tls.root_cert,
            &self.tls.client_key,
            &self.tls.client_cert,
        ) {
            (Some(root_cert), Some(client_key), Some(client_cert)) => options
                .ssl_mode(PgSslMode::VerifyFull)
                .ssl_root_cert(root_cert.as_str())
                .ssl_client_key(client_key.as_str())
                .ssl_client_cert(client_cert.as_str()),
            _ => options.ssl_mode(PgSslMode::Disable),
        }
    }
}

/// Builds the pool without opening a connection; the first acquire (the
/// startup ping) connects.
pub fn get_pool(config: &DatabaseConfig) -> PgPool {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(DEFAULT_IDLE_TIMEOUT)
        .test_before_acquire(true)
        .connect_lazy_with(config.connect_options())
}

#[async_trait]
impl Client for PgPool {
    async fn ping(&self) -> Result<(), CustomDatabaseError> {
        let mut conn = self.acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    async fn close(&self) {
        PgPool::close(self).await
    }

    fn is_closed(&self) -> bool {
        PgPool::is_closed(self)
    }

    fn get_pool_stats(&self) -> Option<PoolStats> {
        Some(PoolStats {
            size: self.size(),
            num_idle: self.num_idle(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DatabaseConfig {
        DatabaseConfig {
            host: "db.internal".to_string(),
            port: 6543,
            user: "api".to_string(),
            password: "hunter2".to_string(),
            name: "service".to_string(),
            tls: TlsFiles::default(),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn connect_options_carry_connection_parameters() {
        let options = config().connect_options();

        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "api");
        assert_eq!(options.get_database(), Some("service"));
    }

    #[test]
    fn tls_disabled_without_full_material() {
        let mut config = config();
        assert!(matches!(
            config.connect_options().get_ssl_mode(),
            PgSslMode::Disable
        ));

        config.tls.root_cert = Some("/certs/root.crt".to_string());
        config.tls.client_cert = Some("/certs/client.crt".to_string());
        assert!(matches!(
            config.connect_options().get_ssl_mode(),
            PgSslMode::Disable
        ));
    }

    #[test]
    fn tls_verified_with_full_material() {
        let mut config = config();
        config.tls = TlsFiles {
            root_cert: Some("/certs/root.crt".to_string()),
            client_key: Some("/certs/client.key".to_string()),
            client_cert: Some("/certs/client.crt".to_string()),
        };

        assert!(matches!(
            config.connect_options().get_ssl_mode(),
            PgSslMode::VerifyFull
        ));
    }

    #[tokio::test]
    async fn lazy_pool_closes_idempotently() {
        let pool = get_pool(&config());
        assert!(!Client::is_closed(&pool));
        assert_eq!(pool.get_pool_stats().map(|stats| stats.size), Some(0));

        Client::close(&pool).await;
        Client::close(&pool).await;
        assert!(Client::is_closed(&pool));
    }

    #[tokio::test]
    async fn ping_fails_against_unreachable_database() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let pool = get_pool(&DatabaseConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..config()
        });

        assert!(Client::ping(&pool).await.is_err());
    }
}
