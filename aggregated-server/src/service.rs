use std::sync::Arc;

use aggregated_config::Config;
use aggregated_metrics::{Aggregator, Event, LineDialect, Metric};
use aggregated_system::{Sender, Service, channel};
use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::endpoints;
use crate::services::aggregator::AggregatorService;
use crate::services::export::Exporter;
use crate::services::influxdb::InfluxDbBackend;
use crate::services::server::HttpServer;
use crate::services::statsd::UdpListener;

/// Indicates the type of failure during startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The configured outputs could not be initialized.
    #[error("could not initialize outputs")]
    Outputs,

    /// A listener could not be bound to its address.
    #[error("could not start {0} listener")]
    Listener(&'static str),
}

/// State shared by all endpoints.
#[derive(Clone, Debug)]
pub struct ServiceState {
    metrics: Sender<Metric>,
    events: Sender<Event>,
    influxdb: Option<InfluxDbBackend>,
}

impl ServiceState {
    /// Creates the state from the ingestion channels.
    pub fn new(metrics: Sender<Metric>, events: Sender<Event>) -> Self {
        Self {
            metrics,
            events,
            influxdb: None,
        }
    }

    /// Sets the backend checked by the health endpoint.
    pub fn with_influxdb(mut self, influxdb: Option<InfluxDbBackend>) -> Self {
        self.influxdb = influxdb;
        self
    }

    /// Returns the sender for decoded metrics.
    pub fn metrics(&self) -> &Sender<Metric> {
        &self.metrics
    }

    /// Returns the sender for decoded events.
    pub fn events(&self) -> &Sender<Event> {
        &self.events
    }

    /// Returns the primary backend, if configured.
    pub fn influxdb(&self) -> Option<&InfluxDbBackend> {
        self.influxdb.as_ref()
    }
}

/// All running services of the daemon.
#[derive(Debug)]
pub struct Server {
    handles: Vec<JoinHandle<()>>,
}

impl Server {
    /// Binds all configured listeners and starts all services on the current runtime.
    ///
    /// Fails before any service is started if the outputs cannot be created, and fails if a
    /// listener cannot be bound.
    pub async fn start(config: Arc<Config>) -> Result<Self> {
        let exporter = Exporter::from_config(&config).context(ServiceError::Outputs)?;
        let influxdb = match config.influxdb() {
            Some(influxdb) => Some(InfluxDbBackend::new(influxdb).context(ServiceError::Outputs)?),
            None => None,
        };

        let (metrics_tx, metrics_rx) = channel(config.ingest_capacity(), config.backpressure());
        let (events_tx, events_rx) = channel(config.ingest_capacity(), config.backpressure());

        let mut handles = Vec::new();

        let aggregator = AggregatorService::new(
            Aggregator::new(config.report_meta_stats()),
            Arc::new(exporter),
            metrics_rx,
            events_rx,
            config.flush_interval(),
        );
        handles.push(aggregator.start());

        let udp_inputs = [
            (config.statsd_addr(), LineDialect::Statsd),
            (config.dogstatsd_addr(), LineDialect::DogStatsd),
        ];

        for (addr, dialect) in udp_inputs {
            let Some(addr) = addr else { continue };

            let listener = UdpListener::bind(addr, dialect, metrics_tx.clone(), events_tx.clone())
                .await
                .context(ServiceError::Listener(dialect.name()))?;

            aggregated_log::info!("spawning {dialect} listener");
            aggregated_log::info!("  listening on udp://{addr}/");
            handles.push(listener.start());
        }

        let state = ServiceState::new(metrics_tx, events_tx).with_influxdb(influxdb);

        if let Some(addr) = config.http_input_addr() {
            let router = endpoints::ingest_routes(state.clone());
            let server = HttpServer::bind("ingest", addr, router)
                .await
                .context(ServiceError::Listener("http"))?;
            handles.push(server.start());
        }

        if let Some(addr) = config.health_addr() {
            let router = endpoints::health_routes(state);
            let server = HttpServer::bind("health", addr, router)
                .await
                .context(ServiceError::Listener("health"))?;
            handles.push(server.start());
        }

        Ok(Self { handles })
    }

    /// Waits until all services have stopped.
    pub async fn join(self) {
        for result in futures::future::join_all(self.handles).await {
            if let Err(error) = result {
                aggregated_log::error!(
                    error = &error as &dyn std::error::Error,
                    "service terminated unexpectedly"
                );
            }
        }
    }
}
