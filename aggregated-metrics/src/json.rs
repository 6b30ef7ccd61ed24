use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::protocol::{DecodeError, Event, Metric, Scalar};

/// Naive formats, interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a client supplied timestamp.
///
/// Supports RFC 3339, `%Y-%m-%d %H:%M:%S %z`, RFC 2822 (including the `GMT` and `UTC` zones of
/// RFC 1123), naive date-times as UTC, and unix seconds.
pub fn parse_timestamp(string: &str) -> Option<DateTime<Utc>> {
    let string = string.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(string) {
        return Some(dt.to_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(string, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Some(dt.to_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(string) {
        return Some(dt.to_utc());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(string, format) {
            return Some(dt.and_utc());
        }
    }

    string.parse::<f64>().ok().and_then(timestamp_from_secs)
}

fn timestamp_from_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let nanos = (secs.fract().abs() * 1e9) as u32;
    DateTime::from_timestamp(secs.trunc() as i64, nanos)
}

/// A timestamp as sent by clients, either text or unix seconds.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimestampValue {
    Secs(f64),
    Text(String),
}

impl TimestampValue {
    fn resolve(value: Option<Self>, received: DateTime<Utc>) -> DateTime<Utc> {
        let parsed = match value {
            Some(TimestampValue::Secs(secs)) => timestamp_from_secs(secs),
            Some(TimestampValue::Text(text)) => parse_timestamp(&text),
            None => None,
        };
        parsed.unwrap_or(received)
    }
}

#[derive(Debug, Deserialize)]
struct MetricPayload {
    #[serde(default, alias = "Name")]
    name: Option<String>,
    #[serde(default, alias = "Host")]
    host: Option<String>,
    #[serde(default, alias = "Timestamp")]
    timestamp: Option<TimestampValue>,
    #[serde(default, rename = "type", alias = "Type")]
    ty: Option<String>,
    #[serde(default, alias = "Value")]
    value: Option<f64>,
    #[serde(default, alias = "Sampling")]
    sampling: Option<f64>,
    #[serde(default, alias = "Tags")]
    tags: Option<BTreeMap<String, String>>,
    #[serde(
        default,
        alias = "SecondaryData",
        alias = "secondaryData",
        alias = "secondarydata"
    )]
    secondary_data: Option<BTreeMap<String, serde_json::Value>>,
}

impl MetricPayload {
    fn into_metric(self, received: DateTime<Utc>) -> Result<Metric, DecodeError> {
        let value = self.value.unwrap_or_default();
        if !value.is_finite() {
            return Err(DecodeError::InvalidValue(value.to_string()));
        }

        let sampling = self.sampling.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&sampling) {
            return Err(DecodeError::InvalidSampleRate(sampling.to_string()));
        }

        Ok(Metric {
            name: self.name.unwrap_or_default(),
            host: self.host.unwrap_or_default(),
            timestamp: TimestampValue::resolve(self.timestamp, received),
            ty: self.ty.unwrap_or_default(),
            sampling,
            value,
            tags: self.tags.unwrap_or_default(),
            secondary_data: self
                .secondary_data
                .unwrap_or_default()
                .into_iter()
                .map(|(key, value)| (key, Scalar::from(value)))
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default, alias = "Name")]
    name: Option<String>,
    #[serde(default, alias = "Text")]
    text: Option<String>,
    #[serde(default, alias = "Host")]
    host: Option<String>,
    #[serde(
        default,
        alias = "AggregationKey",
        alias = "aggregationKey",
        alias = "aggregationkey"
    )]
    aggregation_key: Option<String>,
    #[serde(default, alias = "Priority")]
    priority: Option<String>,
    #[serde(default, alias = "AlertType", alias = "alertType", alias = "alerttype")]
    alert_type: Option<String>,
    #[serde(default, alias = "SourceType", alias = "sourceType", alias = "sourcetype")]
    source_type: Option<String>,
    #[serde(default, alias = "Timestamp")]
    timestamp: Option<TimestampValue>,
    #[serde(default, alias = "Tags")]
    tags: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct BatchPayload {
    #[serde(default, alias = "Batch")]
    batch: Option<Vec<serde_json::Value>>,
    #[serde(default, alias = "Size")]
    size: Option<u64>,
}

impl Metric {
    /// Decodes a metric from a JSON object.
    ///
    /// Field names are accepted in lower case, snake case and with a leading capital, e.g. `Name`
    /// and `SecondaryData`. `null` values in the secondary data become `0.0`. A missing or
    /// unparseable timestamp is replaced by `received`.
    ///
    /// # Example
    ///
    /// ```
    /// use aggregated_metrics::Metric;
    ///
    /// let json = br#"{"Name": "api.hits", "Type": "counter", "Value": 1}"#;
    /// let metric = Metric::from_json(json, chrono::Utc::now()).unwrap();
    /// assert_eq!(metric.name, "api.hits");
    /// ```
    pub fn from_json(slice: &[u8], received: DateTime<Utc>) -> Result<Self, DecodeError> {
        let payload: MetricPayload = serde_json::from_slice(slice)?;
        payload.into_metric(received)
    }
}

impl Event {
    /// Decodes an event from a JSON object.
    ///
    /// See [`Metric::from_json`] for the accepted field names and timestamps.
    pub fn from_json(slice: &[u8], received: DateTime<Utc>) -> Result<Self, DecodeError> {
        let payload: EventPayload = serde_json::from_slice(slice)?;

        Ok(Event {
            name: payload.name.unwrap_or_default(),
            text: payload.text.unwrap_or_default(),
            host: payload.host.unwrap_or_default(),
            aggregation_key: payload.aggregation_key.unwrap_or_default(),
            priority: payload.priority.unwrap_or_default(),
            alert_type: payload.alert_type.unwrap_or_default(),
            source_type: payload.source_type.unwrap_or_default(),
            timestamp: TimestampValue::resolve(payload.timestamp, received),
            tags: payload.tags.unwrap_or_default(),
        })
    }
}

/// A batch of metrics in the format `{"Batch": [<metric>, ...], "Size": <n>}`.
///
/// Every element is decoded independently, so a malformed element does not affect the others.
#[derive(Debug)]
pub struct MetricBatch {
    /// The decoded elements, in submission order.
    pub items: Vec<Result<Metric, DecodeError>>,
    /// The size declared by the client, if any.
    pub size: Option<u64>,
}

impl MetricBatch {
    /// Decodes a batch of metrics.
    ///
    /// Fails only if the body itself is not a JSON object with an optional `Batch` array.
    pub fn from_json(slice: &[u8], received: DateTime<Utc>) -> Result<Self, DecodeError> {
        let payload: BatchPayload = serde_json::from_slice(slice)?;

        let items = payload
            .batch
            .unwrap_or_default()
            .into_iter()
            .map(|value| {
                let payload: MetricPayload = serde_json::from_value(value)?;
                payload.into_metric(received)
            })
            .collect();

        Ok(Self {
            items,
            size: payload.size,
        })
    }

    /// Returns `true` if the batch has no elements.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use similar_asserts::assert_eq;

    use super::*;

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_metric_capitalized() {
        let json = br#"{
            "Name": "api.latency",
            "Host": "web-1",
            "Timestamp": "2024-02-29 10:30:00 +0100",
            "Type": "histogram",
            "Value": 25.5,
            "Sampling": 0.5,
            "Tags": {"route": "/users"},
            "SecondaryData": {"region": "eu", "shard": null, "weight": 3}
        }"#;

        let metric = Metric::from_json(json, received()).unwrap();
        insta::assert_debug_snapshot!(metric, @r#"
        Metric {
            name: "api.latency",
            host: "web-1",
            timestamp: 2024-02-29T09:30:00Z,
            ty: "histogram",
            sampling: 0.5,
            value: 25.5,
            tags: {
                "route": "/users",
            },
            secondary_data: {
                "region": String(
                    "eu",
                ),
                "shard": Float(
                    0.0,
                ),
                "weight": Float(
                    3.0,
                ),
            },
        }
        "#);
    }

    #[test]
    fn test_metric_lowercase_defaults() {
        let json = br#"{"name": "jobs", "type": "counter", "value": 2, "tags": null}"#;
        let metric = Metric::from_json(json, received()).unwrap();

        assert_eq!(metric.name, "jobs");
        assert_eq!(metric.sampling, 1.0);
        assert_eq!(metric.timestamp, received());
        assert!(metric.tags.is_empty());
        assert!(metric.secondary_data.is_empty());
    }

    #[test]
    fn test_metric_invalid_timestamp_uses_receive_time() {
        let json = br#"{"name": "jobs", "type": "gauge", "timestamp": "yesterday"}"#;
        let metric = Metric::from_json(json, received()).unwrap();
        assert_eq!(metric.timestamp, received());
    }

    #[test]
    fn test_metric_numeric_timestamp() {
        let json = br#"{"name": "jobs", "type": "gauge", "timestamp": 1700000000}"#;
        let metric = Metric::from_json(json, received()).unwrap();
        assert_eq!(metric.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_metric_malformed() {
        assert!(matches!(
            Metric::from_json(b"{\"name\": ", received()),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            Metric::from_json(br#"{"name": "x", "value": "high"}"#, received()),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_metric_sampling_out_of_range() {
        for sampling in ["-0.5", "1.5"] {
            let json = format!(r#"{{"name": "jobs", "value": 2, "sampling": {sampling}}}"#);
            assert!(matches!(
                Metric::from_json(json.as_bytes(), received()),
                Err(DecodeError::InvalidSampleRate(_))
            ));
        }

        let json = br#"{"name": "jobs", "type": "counter", "value": 2, "sampling": 0}"#;
        assert_eq!(Metric::from_json(json, received()).unwrap().sampling, 0.0);
    }

    #[test]
    fn test_batch_sampling_out_of_range() {
        let json = br#"{"Batch": [
            {"Name": "a", "Type": "counter", "Value": 1, "Sampling": 2},
            {"Name": "a", "Type": "counter", "Value": 1, "Sampling": 0.5}
        ]}"#;

        let batch = MetricBatch::from_json(json, received()).unwrap();
        assert!(matches!(batch.items[0], Err(DecodeError::InvalidSampleRate(_))));
        assert_eq!(batch.items[1].as_ref().unwrap().sampling, 0.5);
    }

    #[test]
    fn test_event() {
        let json = br#"{
            "Name": "deploy",
            "Text": "version 42",
            "AggregationKey": "release",
            "Priority": "normal",
            "AlertType": "info",
            "SourceType": "ci",
            "Tags": {"team": "core"}
        }"#;

        let event = Event::from_json(json, received()).unwrap();
        assert_eq!(event.name, "deploy");
        assert_eq!(event.aggregation_key, "release");
        assert_eq!(event.alert_type, "info");
        assert_eq!(event.source_type, "ci");
        assert_eq!(event.timestamp, received());
        assert_eq!(event.tags.get("team").map(String::as_str), Some("core"));
    }

    #[test]
    fn test_batch_partial_failure() {
        let json = br#"{
            "Batch": [
                {"Name": "a", "Type": "counter", "Value": 1},
                {"Name": "b", "Type": "counter", "Value": "oops"},
                {"Name": "c", "Type": "gauge", "Value": 3}
            ],
            "Size": 3
        }"#;

        let batch = MetricBatch::from_json(json, received()).unwrap();
        assert_eq!(batch.size, Some(3));
        assert_eq!(batch.items.len(), 3);
        assert!(batch.items[0].is_ok());
        assert!(batch.items[1].is_err());
        assert_eq!(batch.items[2].as_ref().unwrap().name, "c");
    }

    #[test]
    fn test_batch_empty() {
        let batch = MetricBatch::from_json(br#"{"Batch": [], "Size": 0}"#, received()).unwrap();
        assert!(batch.is_empty());

        let batch = MetricBatch::from_json(b"{}", received()).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_batch_malformed() {
        assert!(MetricBatch::from_json(br#"{"Batch": 5}"#, received()).is_err());
        assert!(MetricBatch::from_json(b"\"metrics\"", received()).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 2, 29, 9, 30, 0).unwrap();

        for string in [
            "2024-02-29T09:30:00Z",
            "2024-02-29T10:30:00+01:00",
            "2024-02-29 10:30:00 +0100",
            "Thu, 29 Feb 2024 09:30:00 GMT",
            "Thu, 29 Feb 2024 09:30:00 +0000",
            "2024-02-29T09:30:00",
            "2024-02-29 09:30:00",
            "1709199000",
        ] {
            assert_eq!(parse_timestamp(string), Some(expected), "{string}");
        }

        assert_eq!(parse_timestamp("not a date"), None);
    }
}
