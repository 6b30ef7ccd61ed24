//! Metrics and events protocol, decoding and aggregation.
//!
//! Clients submit [`Metric`]s and [`Event`]s over one of three wire protocols:
//!
//!  - The plain line protocol, see [`parse_lines`] with [`LineDialect::Statsd`].
//!  - The tagged line protocol with events, see [`parse_lines`] with
//!    [`LineDialect::DogStatsd`].
//!  - JSON objects and batches, see [`Metric::from_json`], [`Event::from_json`] and
//!    [`MetricBatch::from_json`].
//!
//! # Line Protocol
//!
//! ```text
//! <name>:<value>|<type>[|@<sample_rate>][|#<tag1>:<value1>,<tag2>]
//! ```
//!
//! Multiple submissions are separated by newlines. The type is one of `c` (counter), `g` (gauge),
//! `s` (set), `h` (histogram) or `ms` (timer, which is decoded but not aggregated).
//!
//! # Aggregation
//!
//! The [`Aggregator`] keeps one [`Bucket`] per [`MetricKey`] and [`EventKey`]. Submissions with the
//! same key are merged according to their [`MetricType`]:
//!
//!  - **Counter**: values are summed up, scaled by the inverse of the sample rate.
//!  - **Gauge**: the last processed value wins.
//!  - **Set**: every distinct value becomes a field.
//!  - **Histogram**: all values are kept and summarized as `count`, `avg`, `median`, `min`,
//!    `max` and `95percentile`.
//!
//! [`Aggregator::take_snapshot`] hands out all buckets and starts a new window.
#![warn(missing_docs)]

mod aggregator;
mod bucket;
mod json;
mod key;
mod protocol;
mod statsd;

pub use self::aggregator::*;
pub use self::bucket::*;
pub use self::json::*;
pub use self::key::*;
pub use self::protocol::*;
pub use self::statsd::*;
