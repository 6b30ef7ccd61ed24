//! Configuration for the aggregated daemon.
//!
//! The daemon reads a single YAML file. See [`Config::from_path`] for loading and the section
//! types in this crate for all recognized options and their defaults.
//!
//! ```yaml
//! inputs:
//!   http:
//!     enabled: true
//!   dogstatsd:
//!     enabled: true
//!     port: 8125
//! outputs:
//!   influxdb:
//!     url: http://localhost:8086
//!     database: metrics
//!   fallback:
//!     url: redis://localhost:6379
//! aggregator:
//!   flush_interval: 10
//! ```
#![warn(missing_docs)]

mod config;
mod outputs;

pub use self::config::*;
pub use self::outputs::*;
