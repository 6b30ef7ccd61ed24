//! The `aggregated` daemon.
//!
//! Listens for metrics and events over UDP line protocol and HTTP JSON, aggregates them in memory
//! and flushes the aggregated buckets to InfluxDB at a fixed interval.
//!
//! # Usage
//!
//! ```text
//! aggregated --config /etc/aggregated/config.yml
//! ```
//!
//! The configuration path can also be given through the `AGGREGATED_CONFIG` environment
//! variable. The process exits with status `2` on usage errors and `1` if it fails to start.

mod cli;
mod cliapp;
mod setup;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            aggregated_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
