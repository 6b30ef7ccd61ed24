//! The aggregated server application.
//!
//! This crate contains the [`run`] function which starts all listeners, the aggregation service
//! and the exporters described by a [`Config`].
//!
//! # Path of a Metric
//!
//! ```text
//! UDP / HTTP listener ──> ingestion channel ──> AggregatorService ──> Exporter
//!     (decode, source)      (bounded)            (buckets, flush)     ├─> InfluxDB
//!                                                                     │   └─> Redis (fallback)
//!                                                                     └─> JSON forwarding
//! ```
//!
//! Listeners decode wire messages into metrics and events and attach the transport source. The
//! aggregator is the only task that owns buckets. On every flush tick it takes all buckets and
//! exports them on a separate task, while new submissions start a fresh window.
#![warn(missing_docs)]

use std::num::NonZeroUsize;
use std::sync::Arc;

use aggregated_config::Config;

mod endpoints;
mod service;
pub mod services;

pub use self::endpoints::{BadMetricsRequest, health_routes, ingest_routes};
pub use self::service::*;

/// Runs the daemon until all services have stopped.
///
/// Creates the runtime, binds all listeners and blocks the current thread. Startup errors, such as
/// an address that is already in use, are returned before any traffic is accepted.
pub fn run(config: Config) -> anyhow::Result<()> {
    let threads = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    let runtime = aggregated_system::create_runtime("aggregated-rt", threads)?;

    runtime.block_on(async {
        let server = Server::start(Arc::new(config)).await?;
        server.join().await;
        Ok(())
    })
}
