use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// What a [`Sender`] does when its channel is at capacity.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backpressure {
    /// Wait until the receiver has made room. Stalls the producer.
    #[default]
    Block,
    /// Discard the record and count it. The count is available via
    /// [`Receiver::take_dropped`].
    Drop,
}

impl fmt::Display for Backpressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block => f.write_str("block"),
            Self::Drop => f.write_str("drop"),
        }
    }
}

/// An error returned by [`Sender::send`] when the receiving side has shut down.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("failed to send record, the receiver has shut down")]
pub struct SendError;

/// Creates a bounded channel with the given capacity and full-channel policy.
///
/// # Panics
///
/// Panics if `capacity` is zero. The configuration rejects a zero capacity at startup.
pub fn channel<T>(capacity: usize, backpressure: Backpressure) -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));

    let sender = Sender {
        tx,
        backpressure,
        dropped: Arc::clone(&dropped),
    };

    (sender, Receiver { rx, dropped })
}

/// The sending half of an ingestion channel.
///
/// Senders can be freely cloned and handed to each listener.
#[derive(Debug)]
pub struct Sender<T> {
    tx: mpsc::Sender<T>,
    backpressure: Backpressure,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            backpressure: self.backpressure,
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<T> Sender<T> {
    /// Enqueues a record.
    ///
    /// With [`Backpressure::Block`] this waits for free capacity. With [`Backpressure::Drop`] a
    /// full channel discards the record and increments the drop counter; this still returns `Ok`.
    pub async fn send(&self, value: T) -> Result<(), SendError> {
        match self.backpressure {
            Backpressure::Block => self.tx.send(value).await.map_err(|_| SendError),
            Backpressure::Drop => match self.tx.try_send(value) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError),
            },
        }
    }
}

/// The receiving half of an ingestion channel.
#[derive(Debug)]
pub struct Receiver<T> {
    rx: mpsc::Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Receiver<T> {
    /// Receives the next record, or `None` once all senders are gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Returns the number of records dropped since the last call and resets the counter.
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}
