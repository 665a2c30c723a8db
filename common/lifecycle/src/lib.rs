//! Service lifecycle: a health gate for load-balancer probes, an ordered and
//! deadline-bound teardown of the service's resources, and a signal watcher
//! that starts that teardown at most once.
//!
//! ```text
//! SIGINT/SIGTERM ─▶ SignalWatcher ─▶ ShutdownCoordinator::trigger
//!                                      │ Running ─▶ ShuttingDown (once)
//!                                      │ HealthGate::mark_unhealthy
//!                                      │ close: listener ─▶ database ─▶ metrics ─▶ traces
//!                                      ▼ ShuttingDown ─▶ Closed (all done or deadline)
//! ```

mod coordinator;
mod error;
mod health;
mod metrics;
mod resource;
mod signals;
mod watcher;

pub use coordinator::{ShutdownCoordinator, ShutdownCoordinatorBuilder, ShutdownState};
pub use error::LifecycleError;
pub use health::{HealthGate, HealthStatus};
pub use resource::{ServiceResource, Stage};
pub use signals::ShutdownSignals;
pub use watcher::SignalWatcher;
