//! Export of flushed buckets to the primary, fallback and forwarding backends.

use std::error::Error;
use std::fmt;

use aggregated_config::Config;
use aggregated_metrics::Bucket;
use futures::future::BoxFuture;

use crate::services::forward::JsonForwarder;
use crate::services::influxdb::InfluxDbBackend;
use crate::services::redis::RedisBackend;

/// An error returned by a [`Backend`] write.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The backend URL cannot be used to build request URLs.
    #[error("invalid backend url")]
    InvalidUrl(#[from] url::ParseError),
    /// The request could not be sent or timed out.
    #[error("could not send request")]
    Http(#[from] reqwest::Error),
    /// The backend responded with an error status.
    #[error("backend responded with status {0}")]
    Status(reqwest::StatusCode),
    /// A bucket could not be serialized.
    #[error("failed to serialize bucket")]
    Json(#[from] serde_json::Error),
    /// The command could not be sent to redis.
    #[error("failed to communicate with redis")]
    Redis(#[from] redis::RedisError),
}

/// A destination for flushed buckets.
pub trait Backend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Writes all buckets of one flush.
    fn write<'a>(&'a self, buckets: &'a [Bucket]) -> BoxFuture<'a, Result<(), ExportError>>;
}

/// The result of exporting one snapshot through the primary and fallback backends.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExportOutcome {
    /// The primary backend accepted the snapshot.
    Primary,
    /// The primary backend failed and the fallback backend accepted the snapshot.
    Fallback,
    /// All configured backends failed. The snapshot is lost.
    Discarded,
    /// Nothing was written, because the snapshot was empty or no primary backend is configured.
    Skipped,
}

impl fmt::Display for ExportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
            Self::Discarded => f.write_str("discarded"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

/// Writes snapshots to the primary backend, its fallback and the JSON forwarding sink.
///
/// The primary is attempted exactly once per snapshot. If it fails, the fallback is attempted
/// exactly once. The forwarding sink receives every snapshot independently of both.
#[derive(Default)]
pub struct Exporter {
    primary: Option<Box<dyn Backend>>,
    fallback: Option<Box<dyn Backend>>,
    forward: Option<Box<dyn Backend>>,
}

impl Exporter {
    /// Creates an exporter without any backends.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the backends configured in the outputs section.
    pub fn from_config(config: &Config) -> Result<Self, ExportError> {
        let mut exporter = Self::new();

        if let Some(influxdb) = config.influxdb() {
            exporter = exporter.with_primary(InfluxDbBackend::new(influxdb)?);
        }
        if let Some(fallback) = config.fallback() {
            exporter = exporter.with_fallback(RedisBackend::new(fallback)?);
        }
        if let Some(json) = config.json_output() {
            exporter = exporter.with_forward(JsonForwarder::new(json)?);
        }

        Ok(exporter)
    }

    /// Sets the primary backend.
    pub fn with_primary(mut self, backend: impl Backend + 'static) -> Self {
        self.primary = Some(Box::new(backend));
        self
    }

    /// Sets the backend that receives snapshots rejected by the primary.
    pub fn with_fallback(mut self, backend: impl Backend + 'static) -> Self {
        self.fallback = Some(Box::new(backend));
        self
    }

    /// Sets the forwarding sink.
    pub fn with_forward(mut self, backend: impl Backend + 'static) -> Self {
        self.forward = Some(Box::new(backend));
        self
    }

    /// Exports one snapshot and returns the outcome of the primary chain.
    ///
    /// Errors are logged and never returned.
    pub async fn export(&self, buckets: &[Bucket]) -> ExportOutcome {
        if buckets.is_empty() {
            return ExportOutcome::Skipped;
        }

        let (outcome, ()) = futures::join!(
            self.export_primary(buckets),
            self.export_forward(buckets)
        );

        match outcome {
            ExportOutcome::Discarded => aggregated_log::warn!(
                buckets = buckets.len(),
                "all backends failed, discarding buckets"
            ),
            outcome => aggregated_log::debug!(
                buckets = buckets.len(),
                "exported buckets ({outcome})"
            ),
        }

        outcome
    }

    async fn export_primary(&self, buckets: &[Bucket]) -> ExportOutcome {
        let Some(primary) = &self.primary else {
            return ExportOutcome::Skipped;
        };

        let Err(error) = primary.write(buckets).await else {
            return ExportOutcome::Primary;
        };

        aggregated_log::error!(
            error = &error as &dyn Error,
            backend = primary.name(),
            "failed to write buckets to primary backend"
        );

        let Some(fallback) = &self.fallback else {
            return ExportOutcome::Discarded;
        };

        match fallback.write(buckets).await {
            Ok(()) => ExportOutcome::Fallback,
            Err(error) => {
                aggregated_log::error!(
                    error = &error as &dyn Error,
                    backend = fallback.name(),
                    "failed to write buckets to fallback backend"
                );
                ExportOutcome::Discarded
            }
        }
    }

    async fn export_forward(&self, buckets: &[Bucket]) {
        let Some(forward) = &self.forward else {
            return;
        };

        if let Err(error) = forward.write(buckets).await {
            aggregated_log::warn!(
                error = &error as &dyn Error,
                backend = forward.name(),
                "failed to forward buckets"
            );
        }
    }
}

impl fmt::Debug for Exporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporter")
            .field("primary", &self.primary.as_ref().map(|b| b.name()))
            .field("fallback", &self.fallback.as_ref().map(|b| b.name()))
            .field("forward", &self.forward.as_ref().map(|b| b.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use aggregated_metrics::Metric;
    use chrono::Utc;
    use similar_asserts::assert_eq;

    use super::*;

    /// Records every write and fails on demand.
    #[derive(Clone, Default)]
    struct Recorder {
        fail: bool,
        writes: Arc<Mutex<Vec<usize>>>,
    }

    impl Recorder {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn writes(&self) -> Vec<usize> {
            self.writes.lock().unwrap().clone()
        }
    }

    impl Backend for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn write<'a>(&'a self, buckets: &'a [Bucket]) -> BoxFuture<'a, Result<(), ExportError>> {
            Box::pin(async move {
                self.writes.lock().unwrap().push(buckets.len());
                if self.fail {
                    Err(ExportError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn buckets() -> Vec<Bucket> {
        let metric = Metric::new("hits", "counter", 1.0, Utc::now());
        vec![Bucket::for_metric(&metric)]
    }

    #[tokio::test]
    async fn test_primary_success() {
        let primary = Recorder::default();
        let fallback = Recorder::default();

        let exporter = Exporter::new()
            .with_primary(primary.clone())
            .with_fallback(fallback.clone());

        assert_eq!(exporter.export(&buckets()).await, ExportOutcome::Primary);
        assert_eq!(primary.writes(), vec![1]);
        assert!(fallback.writes().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_once() {
        aggregated_log::init_test!();
        let primary = Recorder::failing();
        let fallback = Recorder::default();

        let exporter = Exporter::new()
            .with_primary(primary.clone())
            .with_fallback(fallback.clone());

        assert_eq!(exporter.export(&buckets()).await, ExportOutcome::Fallback);
        assert_eq!(primary.writes(), vec![1]);
        assert_eq!(fallback.writes(), vec![1]);
    }

    #[tokio::test]
    async fn test_discarded() {
        let primary = Recorder::failing();
        let fallback = Recorder::failing();

        let exporter = Exporter::new()
            .with_primary(primary.clone())
            .with_fallback(fallback.clone());

        assert_eq!(exporter.export(&buckets()).await, ExportOutcome::Discarded);
        assert_eq!(primary.writes(), vec![1]);
        assert_eq!(fallback.writes(), vec![1]);
    }

    #[tokio::test]
    async fn test_discarded_without_fallback() {
        let exporter = Exporter::new().with_primary(Recorder::failing());
        assert_eq!(exporter.export(&buckets()).await, ExportOutcome::Discarded);
    }

    #[tokio::test]
    async fn test_forward_independent() {
        let forward = Recorder::default();

        let exporter = Exporter::new()
            .with_primary(Recorder::failing())
            .with_forward(forward.clone());

        assert_eq!(exporter.export(&buckets()).await, ExportOutcome::Discarded);
        assert_eq!(forward.writes(), vec![1]);
    }

    #[tokio::test]
    async fn test_forward_only() {
        let forward = Recorder::default();
        let exporter = Exporter::new().with_forward(forward.clone());

        assert_eq!(exporter.export(&buckets()).await, ExportOutcome::Skipped);
        assert_eq!(forward.writes(), vec![1]);
    }

    #[tokio::test]
    async fn test_empty_snapshot_skips_sinks() {
        let primary = Recorder::default();
        let forward = Recorder::default();

        let exporter = Exporter::new()
            .with_primary(primary.clone())
            .with_forward(forward.clone());

        assert_eq!(exporter.export(&[]).await, ExportOutcome::Skipped);
        assert!(primary.writes().is_empty());
        assert!(forward.writes().is_empty());
    }
}
