//! # serialrelay-observability
//!
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber
//! - Request-Timing Middleware

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod quelle;

pub use health::{health_router, HealthResponse, HealthStatus};
pub use logging::logging_initialisieren;
pub use metrics::{metrics_router, RelayMetrics};
pub use middleware::{request_timing_layer, timing_middleware};
pub use quelle::{RelaySchnappschuss, StatusQuelle};

use axum::Router;
use std::sync::Arc;

/// `/health` und `/metrics` in einem Router
pub fn observability_router(metriken: RelayMetrics, quelle: Arc<dyn StatusQuelle>) -> Router {
    Router::new()
        .merge(metrics_router(metriken, Arc::clone(&quelle)))
        .merge(health_router(quelle))
}
