//! A simple health check endpoint.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::service::ServiceState;

#[derive(Serialize)]
struct Status {
    is_healthy: bool,
}

/// Reports whether the primary backend is reachable.
pub async fn handle(State(state): State<ServiceState>) -> impl IntoResponse {
    let is_healthy = match state.influxdb() {
        Some(influxdb) => influxdb.ping().await,
        None => true,
    };

    let status = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(Status { is_healthy }))
}
