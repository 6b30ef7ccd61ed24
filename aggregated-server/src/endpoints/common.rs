//! Common facilities for the ingestion endpoints.

use std::error::Error;

use aggregated_metrics::DecodeError;
use aggregated_system::SendError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// An error response body, `{"detail": "...", "causes": [...]}`.
#[derive(Debug, Serialize)]
struct ApiErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    causes: Vec<String>,
}

impl ApiErrorResponse {
    fn from_error<E: Error + ?Sized>(error: &E) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            detail: error.to_string(),
            causes,
        }
    }
}

/// A rejected submission.
#[derive(Debug, thiserror::Error)]
pub enum BadMetricsRequest {
    /// The body could not be decoded.
    #[error("invalid payload")]
    InvalidPayload(#[from] DecodeError),

    /// The aggregator does not accept records anymore.
    #[error("aggregator is not running")]
    ShuttingDown(#[from] SendError),
}

impl BadMetricsRequest {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::ShuttingDown(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for BadMetricsRequest {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse::from_error(&self);
        (self.status_code(), Json(body)).into_response()
    }
}
