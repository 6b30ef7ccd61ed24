use std::net::SocketAddr;

use aggregated_metrics::Metric;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use chrono::Utc;

use crate::endpoints::common::BadMetricsRequest;
use crate::service::ServiceState;

/// Accepts a single JSON metric.
pub async fn handle(
    State(state): State<ServiceState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<StatusCode, BadMetricsRequest> {
    let mut metric = Metric::from_json(&body, Utc::now())?;
    metric.attach_source(peer.ip());

    state.metrics().send(metric).await?;
    Ok(StatusCode::OK)
}
