use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::{Event, Metric, MetricType, Scalar};

/// The field holding the value of counters and gauges.
const VALUE_FIELD: &str = "value";

/// The aggregated state of one metric or event identity during one flush window.
///
/// Buckets serialize to `{"name", "timestamp", "tags", "fields"}`. The raw histogram samples are
/// internal and never exported.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bucket {
    /// The name of the metric or event.
    pub name: String,
    /// The timestamp of the most recently processed submission.
    pub timestamp: DateTime<Utc>,
    /// Tags of all submissions, last write wins per tag.
    pub tags: BTreeMap<String, String>,
    /// The aggregated values.
    pub fields: BTreeMap<String, Scalar>,
    /// Raw histogram samples of the current window, sorted ascending.
    #[serde(skip)]
    pub values: Vec<f64>,
}

impl Bucket {
    /// Creates an empty bucket for the first submission of a metric.
    ///
    /// Fields are seeded from the secondary data and tags from the metric's tags.
    pub fn for_metric(metric: &Metric) -> Self {
        Self {
            name: metric.name.clone(),
            timestamp: metric.timestamp,
            tags: metric.tags.clone(),
            fields: metric.secondary_data.clone(),
            values: Vec::new(),
        }
    }

    /// Creates an empty bucket for the first submission of an event.
    pub fn for_event(event: &Event) -> Self {
        Self {
            name: event.name.clone(),
            timestamp: event.timestamp,
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            values: Vec::new(),
        }
    }

    /// Merges tags into the tag snapshot, overwriting existing values.
    pub fn merge_tags(&mut self, tags: &BTreeMap<String, String>) {
        for (key, value) in tags {
            self.tags.insert(key.clone(), value.clone());
        }
    }

    /// Applies a metric submission according to its type.
    pub fn aggregate(&mut self, ty: MetricType, metric: &Metric) {
        match ty {
            MetricType::Counter => self.aggregate_counter(metric),
            MetricType::Gauge => self.aggregate_gauge(metric),
            MetricType::Set => self.aggregate_set(metric),
            MetricType::Histogram => self.aggregate_histogram(metric),
        }
        self.timestamp = metric.timestamp;
    }

    /// Adds the value scaled by the inverse sample rate. A rate of `0` counts as `1`.
    fn aggregate_counter(&mut self, metric: &Metric) {
        let sampling = if metric.sampling == 0.0 {
            1.0
        } else {
            metric.sampling
        };

        let previous = self
            .fields
            .get(VALUE_FIELD)
            .and_then(Scalar::as_f64)
            .unwrap_or(0.0);

        self.fields.insert(
            VALUE_FIELD.to_owned(),
            Scalar::Float(previous + metric.value * (1.0 / sampling)),
        );
    }

    /// Replaces the value. Processing order wins, not the submission timestamp.
    fn aggregate_gauge(&mut self, metric: &Metric) {
        self.fields
            .insert(VALUE_FIELD.to_owned(), Scalar::Float(metric.value));
    }

    /// Records the value under its two-decimal representation.
    fn aggregate_set(&mut self, metric: &Metric) {
        self.fields
            .insert(format!("{:.2}", metric.value), Scalar::Float(metric.value));
    }

    /// Appends the sample and recomputes all statistics from the sorted samples.
    ///
    /// Median and 95th percentile use the nearest rank without interpolation, at index `n / 2`
    /// and `floor(0.95 * n)`.
    fn aggregate_histogram(&mut self, metric: &Metric) {
        self.values.push(metric.value);
        self.values.sort_by(f64::total_cmp);

        let values = &self.values;
        let count = values.len();
        let sum: f64 = values.iter().sum();
        let p95_index = ((0.95 * count as f64) as usize).min(count - 1);

        let stats = [
            ("count", count as f64),
            ("avg", sum / count as f64),
            ("median", values[count / 2]),
            ("max", values[count - 1]),
            ("min", values[0]),
            ("95percentile", values[p95_index]),
        ];

        for (name, value) in stats {
            self.fields.insert(name.to_owned(), Scalar::Float(value));
        }
    }

    /// Applies an event submission, overwriting all event fields.
    pub fn aggregate_event(&mut self, event: &Event) {
        let fields = [
            ("name", &event.name),
            ("text", &event.text),
            ("host", &event.host),
            ("aggregation_key", &event.aggregation_key),
            ("priority", &event.priority),
            ("alert_type", &event.alert_type),
        ];

        for (name, value) in fields {
            self.fields
                .insert(name.to_owned(), Scalar::String(value.clone()));
        }

        self.merge_tags(&event.tags);
        self.timestamp = event.timestamp;
    }

    /// Returns the float value of a field.
    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Scalar::as_f64)
    }
}
