//! UDP listeners for the line protocol.

use std::error::Error;
use std::net::{IpAddr, SocketAddr};

use aggregated_metrics::{Event, LineDialect, Metric, Record, parse_lines};
use aggregated_system::{Sender, Service};
use chrono::Utc;
use tokio::net::UdpSocket;

use crate::services::server::ServerError;

/// The largest payload of a UDP datagram.
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Receives line protocol datagrams and hands decoded records to the aggregator.
///
/// The listener never touches aggregation state. Malformed lines are logged and skipped without
/// affecting the other lines of the same datagram.
#[derive(Debug)]
pub struct UdpListener {
    socket: UdpSocket,
    dialect: LineDialect,
    metrics: Sender<Metric>,
    events: Sender<Event>,
}

impl UdpListener {
    /// Binds the socket. Fails if the address is in use.
    pub async fn bind(
        addr: SocketAddr,
        dialect: LineDialect,
        metrics: Sender<Metric>,
        events: Sender<Event>,
    ) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(addr).await?;

        Ok(Self {
            socket,
            dialect,
            metrics,
            events,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Decodes and enqueues all records of one datagram.
    ///
    /// Returns `false` once the aggregator has shut down.
    async fn handle_datagram(&self, payload: &[u8], source: IpAddr) -> bool {
        for result in parse_lines(payload, Utc::now(), self.dialect) {
            let mut record = match result {
                Ok(record) => record,
                Err(error) => {
                    aggregated_log::debug!(
                        error = &error as &dyn Error,
                        source = %source,
                        dialect = self.dialect.name(),
                        "dropping malformed line"
                    );
                    continue;
                }
            };

            record.attach_source(source);

            let sent = match record {
                Record::Metric(metric) => self.metrics.send(metric).await,
                Record::Event(event) => self.events.send(event).await,
            };

            if sent.is_err() {
                return false;
            }
        }

        true
    }
}

impl Service for UdpListener {
    async fn run(self) {
        let mut buffer = vec![0; MAX_DATAGRAM_SIZE];

        loop {
            let (len, peer) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(error) => {
                    aggregated_log::error!(
                        error = &error as &dyn Error,
                        dialect = self.dialect.name(),
                        "failed to receive datagram"
                    );
                    continue;
                }
            };

            if !self.handle_datagram(&buffer[..len], peer.ip()).await {
                aggregated_log::info!(
                    dialect = self.dialect.name(),
                    "aggregator stopped, shutting down udp listener"
                );
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use aggregated_system::{Backpressure, channel};
    use similar_asserts::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_datagram_with_malformed_line() {
        aggregated_log::init_test!();

        let (metrics_tx, mut metrics_rx) = channel(16, Backpressure::Block);
        let (events_tx, mut events_rx) = channel(16, Backpressure::Block);

        let listener = UdpListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            LineDialect::DogStatsd,
            metrics_tx,
            events_tx,
        )
        .await
        .unwrap();
        let addr = listener.local_addr().unwrap();
        listener.start();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(
                b"api.hits:1|c|#env:prod\nbroken\n_e{6,4}:deploy|done\napi.load:0.5|g",
                addr,
            )
            .await
            .unwrap();

        let first = metrics_rx.recv().await.unwrap();
        assert_eq!(first.name, "api.hits");
        assert_eq!(first.tags.get("env").map(String::as_str), Some("prod"));
        assert_eq!(first.source(), Some("127.0.0.1"));

        let second = metrics_rx.recv().await.unwrap();
        assert_eq!(second.name, "api.load");

        let event = events_rx.recv().await.unwrap();
        assert_eq!(event.name, "deploy");
        assert_eq!(event.source(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_plain_dialect_ignores_tags() {
        let (metrics_tx, mut metrics_rx) = channel(16, Backpressure::Block);
        let (events_tx, _events_rx) = channel(16, Backpressure::Block);

        let listener = UdpListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            LineDialect::Statsd,
            metrics_tx,
            events_tx,
        )
        .await
        .unwrap();
        let addr = listener.local_addr().unwrap();
        listener.start();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"api.hits:2|c|#env:prod", addr).await.unwrap();

        let metric = metrics_rx.recv().await.unwrap();
        assert_eq!(metric.value, 2.0);
        assert!(metric.tags.is_empty());
    }
}
