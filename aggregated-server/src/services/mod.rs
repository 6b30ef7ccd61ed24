//! Long running services of the daemon.
//!
//! Listeners decode submissions and hand them to the [`AggregatorService`] through bounded
//! channels. On every flush the aggregator hands its buckets to the [`Exporter`], which writes
//! them to the configured backends.
//!
//! [`AggregatorService`]: aggregator::AggregatorService
//! [`Exporter`]: export::Exporter

pub mod aggregator;
pub mod export;
pub mod forward;
pub mod influxdb;
pub mod redis;
pub mod server;
pub mod statsd;
