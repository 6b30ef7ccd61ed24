use std::collections::BTreeMap;

use serde::Serialize;

use crate::protocol::{Event, Metric};

/// Serializes a sorted map into a deterministic string.
///
/// `BTreeMap` iterates in key order, so equal maps always produce equal strings regardless of
/// insertion order.
fn canonical<V: Serialize>(map: &BTreeMap<String, V>) -> String {
    serde_json::to_string(map).unwrap_or_default()
}

/// The identity under which metrics are aggregated.
///
/// Two metrics merge into the same bucket if and only if their name, tags and secondary data are
/// equal. The metric type is not part of the key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricKey {
    /// The metric name.
    pub name: String,
    /// Canonical serialization of the tags.
    pub tags: String,
    /// Canonical serialization of the secondary data.
    pub secondary_data: String,
}

impl MetricKey {
    /// Computes the key of a metric.
    pub fn new(metric: &Metric) -> Self {
        Self {
            name: metric.name.clone(),
            tags: canonical(&metric.tags),
            secondary_data: canonical(&metric.secondary_data),
        }
    }
}

/// The identity under which events are aggregated.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    /// The event name.
    pub name: String,
    /// The client supplied aggregation key, possibly empty.
    pub aggregation_key: String,
}

impl EventKey {
    /// Computes the key of an event.
    pub fn new(event: &Event) -> Self {
        Self {
            name: event.name.clone(),
            aggregation_key: event.aggregation_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::protocol::Scalar;

    fn metric(tags: &[(&str, &str)]) -> Metric {
        let mut metric = Metric::new("requests", "counter", 1.0, Utc::now());
        for (key, value) in tags {
            metric.tags.insert((*key).to_owned(), (*value).to_owned());
        }
        metric
    }

    #[test]
    fn test_key_order_independent() {
        let a = metric(&[("region", "eu"), ("env", "prod")]);
        let b = metric(&[("env", "prod"), ("region", "eu")]);
        assert_eq!(MetricKey::new(&a), MetricKey::new(&b));
    }

    #[test]
    fn test_key_tags_differ() {
        let a = metric(&[("env", "prod")]);
        let b = metric(&[("env", "staging")]);
        assert_ne!(MetricKey::new(&a), MetricKey::new(&b));
    }

    #[test]
    fn test_key_secondary_data_differ() {
        let a = metric(&[]);
        let mut b = metric(&[]);
        b.secondary_data
            .insert("source".to_owned(), Scalar::from("10.0.0.1"));
        assert_ne!(MetricKey::new(&a), MetricKey::new(&b));
    }

    #[test]
    fn test_key_ignores_value_and_type() {
        let a = metric(&[]);
        let mut b = metric(&[]);
        b.ty = "gauge".to_owned();
        b.value = 42.0;
        assert_eq!(MetricKey::new(&a), MetricKey::new(&b));
    }

    #[test]
    fn test_event_key() {
        let a = Event {
            name: "deploy".to_owned(),
            aggregation_key: "release".to_owned(),
            text: "v1".to_owned(),
            ..Default::default()
        };
        let b = Event {
            text: "v2".to_owned(),
            ..a.clone()
        };
        let c = Event {
            aggregation_key: "rollback".to_owned(),
            ..a.clone()
        };

        assert_eq!(EventKey::new(&a), EventKey::new(&b));
        assert_ne!(EventKey::new(&a), EventKey::new(&c));
    }
}
