use std::error::Error;
use std::net::SocketAddr;

use aggregated_metrics::MetricBatch;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use chrono::Utc;

use crate::endpoints::common::BadMetricsRequest;
use crate::service::ServiceState;

/// Accepts a batch of JSON metrics.
///
/// Malformed elements are dropped individually. Only a malformed body rejects the whole request.
pub async fn handle(
    State(state): State<ServiceState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<StatusCode, BadMetricsRequest> {
    let batch = MetricBatch::from_json(&body, Utc::now())?;

    if batch.is_empty() {
        aggregated_log::info!(source = %peer.ip(), "received empty metrics batch");
        return Ok(StatusCode::OK);
    }

    if let Some(size) = batch.size.filter(|&size| size != batch.items.len() as u64) {
        aggregated_log::debug!(
            size,
            received = batch.items.len(),
            "metrics batch size does not match its contents"
        );
    }

    for item in batch.items {
        match item {
            Ok(mut metric) => {
                metric.attach_source(peer.ip());
                state.metrics().send(metric).await?;
            }
            Err(error) => aggregated_log::debug!(
                error = &error as &dyn Error,
                source = %peer.ip(),
                "dropping malformed batch element"
            ),
        }
    }

    Ok(StatusCode::OK)
}
