use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use lifecycle::{HealthGate, HealthStatus};
use tracing::{error, instrument};

use crate::middleware::RequestId;

const FIBONACCI_INPUT: u32 = 35;

pub async fn health(State(health): State<HealthGate>) -> HealthStatus {
    health.check()
}

/// Placeholder workload: a deliberately slow CPU-bound computation, kept off
/// the async workers.
#[instrument(skip_all, fields(request_id = %request_id.0))]
pub async fn handle(
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<u64>, StatusCode> {
    tokio::task::spawn_blocking(|| fibonacci(FIBONACCI_INPUT))
        .await
        .map(Json)
        .map_err(|e| {
            error!("Handler task failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

pub fn fibonacci(n: u32) -> u64 {
    if n < 2 {
        u64::from(n)
    } else {
        fibonacci(n - 1) + fibonacci(n - 2)
    }
}
