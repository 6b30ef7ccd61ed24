//! The Redis fallback store.

use aggregated_config::FallbackConfig;
use aggregated_metrics::Bucket;
use futures::future::BoxFuture;

use crate::services::export::{Backend, ExportError};

/// Serializes every bucket into one JSON document.
pub fn encode_entries(buckets: &[Bucket]) -> Result<Vec<String>, ExportError> {
    buckets
        .iter()
        .map(|bucket| Ok(serde_json::to_string(bucket)?))
        .collect()
}

/// The fallback store, a Redis list of JSON encoded buckets.
///
/// A connection is opened for every flush, since the fallback is only used while the primary
/// backend is failing.
#[derive(Clone, Debug)]
pub struct RedisBackend {
    client: redis::Client,
    key: String,
}

impl RedisBackend {
    /// Creates a client for the configured server without connecting.
    pub fn new(config: &FallbackConfig) -> Result<Self, ExportError> {
        Ok(Self {
            client: redis::Client::open(config.url.as_str())?,
            key: config.key.clone(),
        })
    }

    async fn push(&self, buckets: &[Bucket]) -> Result<(), ExportError> {
        let entries = encode_entries(buckets)?;

        let mut pipeline = redis::pipe();
        for entry in entries {
            pipeline.rpush(&self.key, entry).ignore();
        }

        let mut connection = self.client.get_multiplexed_async_connection().await?;
        pipeline.query_async::<()>(&mut connection).await?;

        aggregated_log::debug!(
            key = %self.key,
            buckets = buckets.len(),
            "pushed buckets to fallback store"
        );
        Ok(())
    }
}

impl Backend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn write<'a>(&'a self, buckets: &'a [Bucket]) -> BoxFuture<'a, Result<(), ExportError>> {
        Box::pin(self.push(buckets))
    }
}
