//! Web server endpoints.
//!
//! Ingestion endpoints accept JSON submissions and enqueue them for aggregation. The health
//! endpoint is served on its own listener.

use axum::Router;
use axum::routing::{get, post};

use crate::service::ServiceState;

mod batch_metrics;
mod common;
mod events;
mod health_check;
mod metrics;

pub use self::common::BadMetricsRequest;

/// Routes of the JSON ingestion listener.
pub fn ingest_routes(state: ServiceState) -> Router {
    Router::new()
        .route("/metrics", post(metrics::handle))
        .route("/events", post(events::handle))
        .route("/metrics_batch", post(batch_metrics::handle))
        .with_state(state)
}

/// Routes of the health check listener.
pub fn health_routes(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(health_check::handle))
        .with_state(state)
}
