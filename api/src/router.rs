use std::time::Duration;

use axum::routing::get;
use axum::Router;
use lifecycle::HealthGate;
use tower_http::timeout::TimeoutLayer;

use crate::handlers;
use crate::middleware::{self, HttpMetrics};

pub fn router(health: HealthGate, metrics: HttpMetrics, handler_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/handle", get(handlers::handle))
        // Route layers only see matched routes, so metric paths stay bounded.
        .route_layer(TimeoutLayer::new(handler_timeout))
        .route_layer(axum::middleware::from_fn_with_state(
            metrics,
            middleware::track_metrics,
        ))
        .layer(axum::middleware::from_fn(middleware::request_id))
        .with_state(health)
}
