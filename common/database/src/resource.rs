use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use lifecycle::ServiceResource;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{CustomDatabaseError, PostgresClient};

/// The service's database pool as a lifecycle resource.
pub struct PooledResource {
    client: PostgresClient,
}

impl PooledResource {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> PostgresClient {
        self.client.clone()
    }

    /// Startup liveness check, bounded by `timeout`.
    pub async fn ping(&self, timeout: Duration) -> Result<(), CustomDatabaseError> {
        tokio::time::timeout(timeout, self.client.ping()).await??;
        debug!("Database: ping succeeded");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

#[async_trait]
impl ServiceResource for PooledResource {
    fn name(&self) -> &str {
        "database"
    }

    async fn close(&self, deadline: Instant) -> anyhow::Result<()> {
        if let Some(stats) = self.client.get_pool_stats() {
            info!(
                size = stats.size,
                num_idle = stats.num_idle,
                "Database: closing pool"
            );
        }
        tokio::time::timeout_at(deadline, self.client.close())
            .await
            .map_err(|_| anyhow!("connections still checked out at shutdown deadline"))
    }
}
