//! Health gate behind the `/health` probe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Process health flag. Starts healthy and flips to unhealthy once, when
/// shutdown begins, so the load balancer stops routing new requests while
/// in-flight ones drain. Never flips back. Clones share the same flag.
#[derive(Clone, Debug)]
pub struct HealthGate {
    healthy: Arc<AtomicBool>,
}

impl HealthGate {
    pub fn new() -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Lock-free read, safe from any number of concurrent probes.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Flip to unhealthy. Returns true only for the call that performed the
    /// transition; later calls are no-ops.
    pub fn mark_unhealthy(&self) -> bool {
        self.healthy.swap(false, Ordering::AcqRel)
    }

    /// Axum-compatible probe; no I/O.
    pub fn check(&self) -> HealthStatus {
        HealthStatus {
            healthy: self.is_healthy(),
        }
    }
}

impl Default for HealthGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the gate; `200 healthy` or `503`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthStatus {
    pub healthy: bool,
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        if self.healthy {
            (StatusCode::OK, "healthy").into_response()
        } else {
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy() {
        let gate = HealthGate::new();
        assert!(gate.is_healthy());
        assert_eq!(gate.check().into_response().status(), StatusCode::OK);
    }

    #[test]
    fn mark_unhealthy_is_one_way_and_idempotent() {
        let gate = HealthGate::new();
        let probe = gate.clone();

        assert!(gate.mark_unhealthy());
        assert!(!gate.mark_unhealthy());
        assert!(!probe.is_healthy());
        assert_eq!(
            probe.check().into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn only_one_concurrent_caller_wins_the_transition() {
        let gate = HealthGate::new();
        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let gate = gate.clone();
                    s.spawn(move || gate.mark_unhealthy())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });
        assert_eq!(winners, 1);
    }
}
