use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common_database::{Client, CustomDatabaseError, PoolStats};
use envconfig::Envconfig;
use lifecycle::{LifecycleError, ShutdownState};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use api::config::Config;
use api::error::StartupError;
use api::service::{Service, Telemetry};

#[derive(Default)]
struct MockClient {
    ping_fails: bool,
    pings: AtomicUsize,
    closes: AtomicUsize,
}

#[async_trait]
impl Client for MockClient {
    async fn ping(&self) -> Result<(), CustomDatabaseError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.ping_fails {
            return Err(CustomDatabaseError::Other(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closes.load(Ordering::SeqCst) > 0
    }

    fn get_pool_stats(&self) -> Option<PoolStats> {
        None
    }
}

fn config(port: u16) -> Config {
    config_with(port, &[])
}

fn config_with(port: u16, overrides: &[(&str, &str)]) -> Config {
    let mut env: HashMap<String, String> = [
        ("SERVICE_NAME", "api-tests"),
        ("ENVIRONMENT", "test"),
        ("BIND_HOST", "127.0.0.1"),
        ("SHUTDOWN_TIMEOUT_MS", "5000"),
        ("STARTUP_TIMEOUT_MS", "5000"),
        ("PG_USER", "api"),
        ("PG_PASSWORD", "secret"),
        ("PG_HOST", "localhost"),
        ("PG_NAME", "service"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .chain([("BIND_PORT".to_string(), port.to_string())])
    .collect();
    for (key, value) in overrides {
        env.insert(key.to_string(), value.to_string());
    }

    Config::init_from_hashmap(&env).unwrap()
}

#[tokio::test]
async fn failed_ping_aborts_startup_before_binding() {
    // Occupied, so a bind attempt would surface as a bind error instead.
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = occupied.local_addr().unwrap().port();

    let client = Arc::new(MockClient {
        ping_fails: true,
        ..Default::default()
    });

    let result = Service::start_with(&config(port), Telemetry::noop(), client.clone()).await;

    assert!(matches!(result, Err(StartupError::DatabaseUnreachable(_))));
    assert_eq!(client.pings.load(Ordering::SeqCst), 1);
    assert_eq!(client.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bind_failure_releases_the_pool() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = occupied.local_addr().unwrap().port();
    let client = Arc::new(MockClient::default());

    let result = Service::start_with(&config(port), Telemetry::noop(), client.clone()).await;

    assert!(matches!(result, Err(StartupError::Bind { .. })));
    assert_eq!(client.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serves_until_shutdown_then_closes_everything() {
    let client = Arc::new(MockClient::default());
    let service = Service::start_with(&config(0), Telemetry::noop(), client.clone())
        .await
        .unwrap();

    let addr = service.local_addr();
    let coordinator = service.coordinator();
    let running = tokio::spawn(service.run());

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("healthy"), "{response}");

    assert!(coordinator.trigger("test").await);

    running.await.unwrap().unwrap();
    assert_eq!(coordinator.state(), ShutdownState::Closed);
    assert!(!coordinator.health_gate().is_healthy());
    assert_eq!(client.closes.load(Ordering::SeqCst), 1);
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_trigger_does_not_close_twice() {
    let client = Arc::new(MockClient::default());
    let service = Service::start_with(&config(0), Telemetry::noop(), client.clone())
        .await
        .unwrap();

    let coordinator = service.coordinator();
    let running = tokio::spawn(service.run());

    let (first, second) = tokio::join!(coordinator.trigger("SIGTERM"), coordinator.trigger("SIGINT"));
    assert!(first ^ second);

    running.await.unwrap().unwrap();
    assert_eq!(client.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_connection_does_not_outlive_the_shutdown_deadline() {
    let client = Arc::new(MockClient::default());
    let config = config_with(0, &[("SHUTDOWN_TIMEOUT_MS", "500")]);
    let service = Service::start_with(&config, Telemetry::noop(), client.clone())
        .await
        .unwrap();

    let addr = service.local_addr();
    let coordinator = service.coordinator();
    let running = tokio::spawn(service.run());

    // Headers never terminated, so the connection can't drain.
    let mut stalled = TcpStream::connect(addr).await.unwrap();
    stalled
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    assert!(coordinator.trigger("test").await);
    assert_eq!(coordinator.state(), ShutdownState::Closed);

    tokio::time::timeout(Duration::from_secs(3), running)
        .await
        .expect("run kept serving after shutdown closed")
        .unwrap()
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));

    drop(stalled);
}

#[tokio::test]
async fn failed_signal_registration_tears_down_what_started() {
    let client = Arc::new(MockClient::default());
    let mut service = Service::start_with(&config(0), Telemetry::noop(), client.clone())
        .await
        .unwrap();
    let coordinator = service.coordinator();

    let result = service
        .arm_with(|_| {
            Err(LifecycleError::SignalRegistration {
                signal: "SIGTERM",
                source: std::io::Error::other("signal handlers unavailable"),
            })
        })
        .await;

    assert!(matches!(result, Err(StartupError::Signals(_))));
    assert_eq!(coordinator.state(), ShutdownState::Closed);
    assert!(!coordinator.health_gate().is_healthy());
    assert_eq!(client.closes.load(Ordering::SeqCst), 1);
}
