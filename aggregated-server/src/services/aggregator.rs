//! The single task that owns all buckets.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use aggregated_metrics::{Aggregator, Event, Metric};
use aggregated_system::{Receiver, Service};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::services::export::Exporter;

/// Service owning the [`Aggregator`].
///
/// Every iteration of the service loop handles exactly one of a flush tick, a metric or an event.
/// This is the only task that mutates buckets.
///
/// On every tick, the current buckets are handed to the [`Exporter`] on a separate task and a new
/// window starts. Before a new export is started, the service waits for the previous one, so
/// exports never overlap. Once all senders are gone, the service flushes a last time and stops.
#[derive(Debug)]
pub struct AggregatorService {
    aggregator: Aggregator,
    exporter: Arc<Exporter>,
    metrics: Receiver<Metric>,
    events: Receiver<Event>,
    flush_interval: Duration,
    export: Option<JoinHandle<()>>,
}

impl AggregatorService {
    /// Creates a new aggregator service reading from the given channels.
    pub fn new(
        aggregator: Aggregator,
        exporter: Arc<Exporter>,
        metrics: Receiver<Metric>,
        events: Receiver<Event>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            aggregator,
            exporter,
            metrics,
            events,
            flush_interval,
            export: None,
        }
    }

    fn handle_metric(&mut self, metric: Metric) {
        if let Err(error) = self.aggregator.merge_metric(&metric) {
            aggregated_log::warn!(
                error = &error as &dyn Error,
                metric = %metric.name,
                source = metric.source().unwrap_or("unknown"),
                "dropping invalid metric"
            );
        }
    }

    fn handle_event(&mut self, event: Event) {
        if let Err(error) = self.aggregator.merge_event(&event) {
            aggregated_log::warn!(
                error = &error as &dyn Error,
                event = %event.name,
                source = event.source().unwrap_or("unknown"),
                "dropping invalid event"
            );
        }
    }

    fn log_dropped(&self) {
        let metrics = self.metrics.take_dropped();
        let events = self.events.take_dropped();

        if metrics > 0 || events > 0 {
            aggregated_log::warn!(
                metrics,
                events,
                "ingestion channels full, dropped records since last flush"
            );
        }
    }

    async fn wait_for_export(&mut self) {
        if let Some(export) = self.export.take() {
            if let Err(error) = export.await {
                aggregated_log::error!(
                    error = &error as &dyn Error,
                    "export task failed"
                );
            }
        }
    }

    async fn flush(&mut self) {
        self.log_dropped();

        let snapshot = self.aggregator.take_snapshot();
        if snapshot.is_empty() {
            aggregated_log::trace!("no buckets to flush");
            return;
        }

        self.wait_for_export().await;

        aggregated_log::debug!(buckets = snapshot.len(), "flushing buckets");
        let exporter = Arc::clone(&self.exporter);
        self.export = Some(tokio::spawn(async move {
            exporter.export(&snapshot).await;
        }));
    }
}

impl Service for AggregatorService {
    async fn run(mut self) {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut metrics_open = true;
        let mut events_open = true;

        aggregated_log::info!(
            "aggregator started, flushing every {}s",
            self.flush_interval.as_secs()
        );

        while metrics_open || events_open {
            tokio::select! {
                biased;

                _ = ticker.tick() => self.flush().await,
                metric = self.metrics.recv(), if metrics_open => match metric {
                    Some(metric) => self.handle_metric(metric),
                    None => metrics_open = false,
                },
                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event),
                    None => events_open = false,
                },
            }
        }

        self.flush().await;
        self.wait_for_export().await;
        aggregated_log::info!("aggregator stopped");
    }
}
