use hashbrown::HashMap;

use crate::bucket::Bucket;
use crate::key::{EventKey, MetricKey};
use crate::protocol::{Event, META_METRIC_NAME, Metric, MetricType, UnknownMetricType};

/// A submission that cannot be aggregated.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    /// The metric or event has no name.
    #[error("name is empty")]
    EmptyName,
    /// The metric has no type.
    #[error("metric type is empty")]
    EmptyType,
    /// The event has no text.
    #[error("event text is empty")]
    EmptyText,
    /// The value is NaN or infinite.
    #[error("metric value is not finite")]
    NonFiniteValue,
    /// The metric type has no aggregator, such as `timer`.
    #[error(transparent)]
    UnknownType(#[from] UnknownMetricType),
}

/// Single-owner state of all buckets in the current flush window.
///
/// The aggregator is not synchronized. It is owned by exactly one task which applies every
/// submission in the order it was received.
#[derive(Debug, Default)]
pub struct Aggregator {
    metrics: HashMap<MetricKey, Bucket>,
    events: HashMap<EventKey, Bucket>,
    report_meta_stats: bool,
}

impl Aggregator {
    /// Creates an empty aggregator.
    ///
    /// With `report_meta_stats`, every aggregated metric also increments the
    /// `aggregated_metric_count` counter.
    pub fn new(report_meta_stats: bool) -> Self {
        Self {
            report_meta_stats,
            ..Default::default()
        }
    }

    /// Validates a metric and merges it into its bucket.
    ///
    /// Metrics without name or type, with a non-finite value and of unknown types are rejected
    /// without touching any bucket.
    pub fn merge_metric(&mut self, metric: &Metric) -> Result<(), AggregateError> {
        if metric.name.is_empty() {
            return Err(AggregateError::EmptyName);
        }
        if metric.ty.is_empty() {
            return Err(AggregateError::EmptyType);
        }
        if !metric.value.is_finite() {
            return Err(AggregateError::NonFiniteValue);
        }

        let ty: MetricType = metric.ty.parse()?;
        self.merge_typed(ty, metric);

        if self.report_meta_stats && metric.name != META_METRIC_NAME {
            let meta = Metric::new(META_METRIC_NAME, "counter", 1.0, metric.timestamp);
            self.merge_typed(MetricType::Counter, &meta);
        }

        Ok(())
    }

    fn merge_typed(&mut self, ty: MetricType, metric: &Metric) {
        let bucket = self
            .metrics
            .entry(MetricKey::new(metric))
            .or_insert_with(|| Bucket::for_metric(metric));

        bucket.merge_tags(&metric.tags);
        bucket.aggregate(ty, metric);
    }

    /// Validates an event and merges it into its bucket.
    pub fn merge_event(&mut self, event: &Event) -> Result<(), AggregateError> {
        if event.name.is_empty() {
            return Err(AggregateError::EmptyName);
        }
        if event.text.is_empty() {
            return Err(AggregateError::EmptyText);
        }

        self.events
            .entry(EventKey::new(event))
            .or_insert_with(|| Bucket::for_event(event))
            .aggregate_event(event);

        Ok(())
    }

    /// Returns the bucket of a metric identity, if it exists in the current window.
    pub fn metric_bucket(&self, key: &MetricKey) -> Option<&Bucket> {
        self.metrics.get(key)
    }

    /// Returns the bucket of an event identity, if it exists in the current window.
    pub fn event_bucket(&self, key: &EventKey) -> Option<&Bucket> {
        self.events.get(key)
    }

    /// Returns the number of metric and event buckets.
    pub fn len(&self) -> usize {
        self.metrics.len() + self.events.len()
    }

    /// Returns `true` if there are no buckets in the current window.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.events.is_empty()
    }

    /// Takes all buckets and starts a new, empty window.
    ///
    /// Metric buckets come first, followed by event buckets.
    pub fn take_snapshot(&mut self) -> Vec<Bucket> {
        let metrics = std::mem::take(&mut self.metrics);
        let events = std::mem::take(&mut self.events);

        let mut snapshot = Vec::with_capacity(metrics.len() + events.len());
        snapshot.extend(metrics.into_values());
        snapshot.extend(events.into_values());
        snapshot
    }
}
