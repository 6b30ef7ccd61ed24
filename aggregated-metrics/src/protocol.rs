use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The name of the metric reported for every processed metric when meta stats are enabled.
pub const META_METRIC_NAME: &str = "aggregated_metric_count";

/// The key under which the transport source is recorded.
pub const SOURCE_KEY: &str = "source";

/// The type of a [`Metric`], determining how submissions are aggregated.
///
/// Metrics of any other type are decoded, but never aggregated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricType {
    /// Sums up all submitted values, scaled by their sample rate.
    Counter,
    /// Keeps the last processed value.
    Gauge,
    /// Counts distinct values.
    Set,
    /// Summarizes the distribution of all values.
    Histogram,
}

impl MetricType {
    /// Returns the name of this type as used in [`Metric::ty`].
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Set => "set",
            MetricType::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error returned when parsing an unknown [`MetricType`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric type {0:?}")]
pub struct UnknownMetricType(pub String);

impl FromStr for MetricType {
    type Err = UnknownMetricType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "counter" => Self::Counter,
            "gauge" => Self::Gauge,
            "set" => Self::Set,
            "histogram" => Self::Histogram,
            _ => return Err(UnknownMetricType(s.to_owned())),
        })
    }
}

/// A scalar value in the secondary data of a metric or the fields of a bucket.
///
/// All aggregated values are floats. Strings and booleans only occur as passthrough metadata,
/// such as the transport source or event attributes.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    /// A numeric value.
    Float(f64),
    /// A boolean flag.
    Bool(bool),
    /// A text value.
    String(String),
}

impl Scalar {
    /// Returns the float value, if this is a [`Scalar::Float`].
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the text value, if this is a [`Scalar::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(value) => Some(value),
            _ => None,
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<serde_json::Value> for Scalar {
    /// Converts arbitrary JSON into a scalar.
    ///
    /// `null` becomes `0.0`. Arrays and objects are kept as their JSON text.
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Float(0.0),
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Float(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => Self::String(s),
            other => Self::String(other.to_string()),
        }
    }
}

/// A single measurement submitted by a client.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    /// The name of the measurement. Required.
    pub name: String,
    /// The host that submitted the measurement. Filled from the transport source if empty.
    pub host: String,
    /// The submission time.
    pub timestamp: DateTime<Utc>,
    /// The wire name of the metric type, see [`MetricType`].
    ///
    /// Unknown types, such as `timer`, are kept so they can be dropped by the aggregator.
    pub ty: String,
    /// The sample rate. `0` is treated as `1`.
    pub sampling: f64,
    /// The submitted value.
    pub value: f64,
    /// Tags, merged into the bucket with last write wins.
    pub tags: BTreeMap<String, String>,
    /// Side channel metadata which is part of the metric identity.
    pub secondary_data: BTreeMap<String, Scalar>,
}

impl Metric {
    /// Creates a metric with a sample rate of `1` and no tags.
    pub fn new(
        name: impl Into<String>,
        ty: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            host: String::new(),
            timestamp,
            ty: ty.into(),
            sampling: 1.0,
            value,
            tags: BTreeMap::new(),
            secondary_data: BTreeMap::new(),
        }
    }

    /// Returns the aggregatable type of this metric, or `None` for unknown types.
    pub fn metric_type(&self) -> Option<MetricType> {
        self.ty.parse().ok()
    }

    /// Records the transport source unless the client supplied one.
    ///
    /// The source is written to `secondary_data["source"]`. An empty `host` is filled with the
    /// source address.
    pub fn attach_source(&mut self, source: IpAddr) {
        let source = source.to_string();
        self.secondary_data
            .entry(SOURCE_KEY.to_owned())
            .or_insert_with(|| Scalar::String(source.clone()));
        if self.host.is_empty() {
            self.host = source;
        }
    }

    /// Returns the recorded transport source, if any.
    pub fn source(&self) -> Option<&str> {
        self.secondary_data.get(SOURCE_KEY).and_then(Scalar::as_str)
    }
}

/// A discrete occurrence submitted by a client.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Event {
    /// The title of the event. Required.
    pub name: String,
    /// The body of the event. Required.
    pub text: String,
    /// The host that submitted the event.
    pub host: String,
    /// Groups events with the same name into one bucket.
    pub aggregation_key: String,
    /// Priority, such as `normal` or `low`.
    pub priority: String,
    /// Alert type, such as `error` or `info`.
    pub alert_type: String,
    /// The source type of the event.
    pub source_type: String,
    /// The submission time.
    pub timestamp: DateTime<Utc>,
    /// Tags, merged into the bucket with last write wins.
    pub tags: BTreeMap<String, String>,
}

impl Event {
    /// Records the transport source in the `source` tag unless the client supplied one.
    ///
    /// An empty `host` is filled with the source address.
    pub fn attach_source(&mut self, source: IpAddr) {
        let source = source.to_string();
        self.tags
            .entry(SOURCE_KEY.to_owned())
            .or_insert_with(|| source.clone());
        if self.host.is_empty() {
            self.host = source;
        }
    }

    /// Returns the recorded transport source, if any.
    pub fn source(&self) -> Option<&str> {
        self.tags.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A decoded submission of the line protocol, which carries both metrics and events.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    /// A measurement.
    Metric(Metric),
    /// An occurrence.
    Event(Event),
}

impl Record {
    /// Records the transport source, see [`Metric::attach_source`] and
    /// [`Event::attach_source`].
    pub fn attach_source(&mut self, source: IpAddr) {
        match self {
            Record::Metric(metric) => metric.attach_source(source),
            Record::Event(event) => event.attach_source(source),
        }
    }
}

/// An error returned when a wire message cannot be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The message is not valid UTF-8.
    #[error("message is not valid utf-8")]
    InvalidUtf8,
    /// A required `:` or `|` delimiter is missing.
    #[error("missing delimiter {0:?}")]
    MissingDelimiter(char),
    /// The metric or event name is empty.
    #[error("empty name")]
    EmptyName,
    /// The value is not a number.
    #[error("invalid value {0:?}")]
    InvalidValue(String),
    /// The type token is not recognized.
    #[error("invalid metric type {0:?}")]
    InvalidType(String),
    /// The sample rate is not a number within `[0, 1]`.
    #[error("invalid sample rate {0:?}")]
    InvalidSampleRate(String),
    /// The event header or its declared lengths do not match the message.
    #[error("malformed event")]
    InvalidEvent,
    /// The JSON body could not be parsed.
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
}
