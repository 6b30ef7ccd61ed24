//! JSON forwarding of flushed buckets.

use std::time::Duration;

use aggregated_config::JsonOutputConfig;
use aggregated_metrics::Bucket;
use futures::future::{self, BoxFuture};
use url::Url;

use crate::services::export::{Backend, ExportError};

/// Forwards every bucket as JSON with an HTTP `PUT`.
///
/// Buckets are sent concurrently. A failure of one request does not stop the others; the first
/// error is returned after all requests have completed.
#[derive(Clone, Debug)]
pub struct JsonForwarder {
    client: reqwest::Client,
    url: Url,
}

impl JsonForwarder {
    /// Creates the HTTP client for the configured sink.
    pub fn new(config: &JsonOutputConfig) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            client,
            url: Url::parse(&config.url)?,
        })
    }

    async fn put(&self, bucket: &Bucket) -> Result<(), ExportError> {
        let response = self
            .client
            .put(self.url.clone())
            .json(bucket)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Status(status));
        }

        Ok(())
    }

    async fn put_all(&self, buckets: &[Bucket]) -> Result<(), ExportError> {
        let results = future::join_all(buckets.iter().map(|bucket| self.put(bucket))).await;

        let mut failed = 0;
        let mut first_error = None;
        for result in results {
            if let Err(error) = result {
                failed += 1;
                first_error.get_or_insert(error);
            }
        }

        match first_error {
            Some(error) => {
                aggregated_log::debug!(failed, total = buckets.len(), "forwarding incomplete");
                Err(error)
            }
            None => Ok(()),
        }
    }
}

impl Backend for JsonForwarder {
    fn name(&self) -> &'static str {
        "json"
    }

    fn write<'a>(&'a self, buckets: &'a [Bucket]) -> BoxFuture<'a, Result<(), ExportError>> {
        Box::pin(self.put_all(buckets))
    }
}
