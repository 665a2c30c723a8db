//! Collector reachability check run before building an exporter.
//!
//! The OTLP exporter connects lazily, so an unreachable collector would only
//! surface later as failed exports. Checking at install time lets the
//! pipeline fall back to a no-op up front.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use url::{Host, Url};

pub(crate) const DEFAULT_OTLP_GRPC_PORT: u16 = 4317;

#[derive(Debug, Error)]
pub(crate) enum ProbeError {
    #[error("invalid collector endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("collector unreachable: {0}")]
    Unreachable(#[from] io::Error),
    #[error("collector did not accept a connection within {0:?}")]
    Timeout(Duration),
}

/// Accepts `host:port` (as collector agents are usually configured) or a full
/// URL. Missing schemes default to `http`, missing ports to the OTLP/gRPC port.
pub(crate) fn normalize_endpoint(raw: &str) -> Result<Url, ProbeError> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    let mut url =
        Url::parse(&with_scheme).map_err(|e| ProbeError::InvalidEndpoint(format!("{raw}: {e}")))?;
    if url.host().is_none() {
        return Err(ProbeError::InvalidEndpoint(format!("{raw}: missing host")));
    }
    if url.port().is_none() && url.set_port(Some(DEFAULT_OTLP_GRPC_PORT)).is_err() {
        return Err(ProbeError::InvalidEndpoint(format!("{raw}: cannot set port")));
    }
    Ok(url)
}

/// Opens and immediately drops one TCP connection to the collector.
pub(crate) async fn probe(url: &Url, timeout: Duration) -> Result<(), ProbeError> {
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(ProbeError::InvalidEndpoint(url.to_string())),
    };
    let port = url.port().unwrap_or(DEFAULT_OTLP_GRPC_PORT);

    match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(ProbeError::Unreachable(e)),
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_host_and_port() {
        let url = normalize_endpoint("otel-agent:4317").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.host_str(), Some("otel-agent"));
        assert_eq!(url.port(), Some(4317));
    }

    #[test]
    fn defaults_to_otlp_grpc_port() {
        let url = normalize_endpoint("otel-agent").unwrap();
        assert_eq!(url.port(), Some(DEFAULT_OTLP_GRPC_PORT));

        let url = normalize_endpoint("https://collector.internal").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.port(), Some(DEFAULT_OTLP_GRPC_PORT));
    }

    #[test]
    fn keeps_explicit_url() {
        let url = normalize_endpoint("http://127.0.0.1:55680").unwrap();
        assert_eq!(url.host_str(), Some("127.0.0.1"));
        assert_eq!(url.port(), Some(55680));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            normalize_endpoint("http://"),
            Err(ProbeError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            normalize_endpoint("otel:notaport"),
            Err(ProbeError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn probe_reports_refused_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = normalize_endpoint(&format!("127.0.0.1:{port}")).unwrap();
        let result = probe(&url, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ProbeError::Unreachable(_))));
    }

    #[tokio::test]
    async fn probe_succeeds_against_listening_socket() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let url = normalize_endpoint(&format!("127.0.0.1:{port}")).unwrap();
        probe(&url, Duration::from_secs(1)).await.unwrap();
    }
}
