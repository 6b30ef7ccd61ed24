use std::net::SocketAddr;

use aggregated_metrics::Event;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use chrono::Utc;

use crate::endpoints::common::BadMetricsRequest;
use crate::service::ServiceState;

/// Accepts a single JSON event.
pub async fn handle(
    State(state): State<ServiceState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<StatusCode, BadMetricsRequest> {
    let mut event = Event::from_json(&body, Utc::now())?;
    event.attach_source(peer.ip());

    state.events().send(event).await?;
    Ok(StatusCode::OK)
}
