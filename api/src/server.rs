use std::io;
use std::net::SocketAddr;

use anyhow::anyhow;
use async_trait::async_trait;
use axum::Router;
use lifecycle::ServiceResource;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The bound HTTP socket. Serving stops when the listener is closed as a
/// lifecycle resource: no new connections are accepted and in-flight
/// requests drain until the shutdown deadline.
pub struct HttpListener {
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    stop: CancellationToken,
    stopped: CancellationToken,
}

impl HttpListener {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener: Mutex::new(Some(listener)),
            local_addr,
            stop: CancellationToken::new(),
            stopped: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves `router` until the listener is closed, then returns once every
    /// in-flight request has finished. Can be called only once.
    pub async fn serve(&self, router: Router) -> io::Result<()> {
        let Some(listener) = self.listener.lock().await.take() else {
            // Closed before serving started.
            if self.stop.is_cancelled() {
                return Ok(());
            }
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "listener already served or closed",
            ));
        };

        info!(address = %self.local_addr, "Listening");
        let stop = self.stop.clone();
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await;

        self.stopped.cancel();
        result
    }
}

#[async_trait]
impl ServiceResource for HttpListener {
    fn name(&self) -> &str {
        "http_listener"
    }

    async fn close(&self, deadline: Instant) -> anyhow::Result<()> {
        self.stop.cancel();

        // Never served: nothing to drain.
        if self.listener.lock().await.take().is_some() {
            self.stopped.cancel();
        }

        tokio::time::timeout_at(deadline, self.stopped.cancelled())
            .await
            .map_err(|_| anyhow!("in-flight requests still draining at shutdown deadline"))
    }
}
