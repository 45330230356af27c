//! Connection handle and its I/O tasks

use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::config::ConnectionConfig;
use super::error::ConnectionError;
use super::state::{CloseReason, ConnectionState};

/// Upper bound on flushing a close to a peer that stopped reading
const SINK_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Logical duplex connection for one client
///
/// Shared as `Arc<Connection>` between its reader/writer tasks, the heartbeat,
/// and whichever bucket indexes it. Dropping it from a bucket never closes it;
/// closing is always explicit through [`Connection::close`].
#[derive(Debug)]
pub struct Connection {
    client_id: u64,
    state: Mutex<ConnectionState>,
    ingress_rx: async_channel::Receiver<Bytes>,
    egress_tx: async_channel::Sender<Bytes>,
    cancel: CancellationToken,
    opened_at: Instant,
}

impl Connection {
    /// Wrap the two halves of a socket and start the reader and writer tasks
    ///
    /// `writer` receives every payload accepted by [`Connection::write`];
    /// `reader` feeds [`Connection::read`]. Must be called inside a tokio
    /// runtime.
    pub fn from_parts<W, R, RE>(
        client_id: u64,
        writer: W,
        reader: R,
        config: &ConnectionConfig,
    ) -> Arc<Self>
    where
        W: Sink<Bytes> + Send + 'static,
        W::Error: Display + Send,
        R: Stream<Item = Result<Bytes, RE>> + Send + 'static,
        RE: Display + Send + 'static,
    {
        let (ingress_tx, ingress_rx) = async_channel::bounded(config.ingress_capacity.max(1));
        let (egress_tx, egress_rx) = async_channel::bounded(config.egress_capacity.max(1));

        let connection = Arc::new(Self {
            client_id,
            state: Mutex::new(ConnectionState::Open),
            ingress_rx,
            egress_tx,
            cancel: CancellationToken::new(),
            opened_at: Instant::now(),
        });

        tokio::spawn(read_loop(Arc::clone(&connection), reader, ingress_tx));
        tokio::spawn(write_loop(Arc::clone(&connection), writer, egress_rx));

        tracing::debug!(client_id = client_id, "Connection opened");

        connection
    }

    /// Client id this connection was opened for
    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    /// Time since the connection was opened
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Wait for the next payload from the peer
    ///
    /// Returns [`ConnectionError::Closed`] once the connection is torn down,
    /// even if payloads are still queued.
    pub async fn read(&self) -> Result<Bytes, ConnectionError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.closed_error()),
            item = self.ingress_rx.recv() => item.map_err(|_| self.closed_error()),
        }
    }

    /// Queue a payload for the peer
    ///
    /// Waits while the egress queue is full rather than dropping the payload.
    pub async fn write(&self, payload: Bytes) -> Result<(), ConnectionError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.closed_error()),
            sent = self.egress_tx.send(payload) => sent.map_err(|_| self.closed_error()),
        }
    }

    /// Close the connection
    ///
    /// Returns `true` if this call performed the close.
    pub fn close(&self) -> bool {
        self.close_with(CloseReason::Explicit)
    }

    /// Close the connection, recording why
    ///
    /// Only the first close takes effect; it fires the cancellation signal,
    /// which stops the I/O tasks and releases the socket. Safe to call from
    /// any number of tasks concurrently.
    pub fn close_with(&self, reason: CloseReason) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.is_closed() {
                return false;
            }
            *state = ConnectionState::Closed(reason.clone());
        }

        self.cancel.cancel();

        tracing::info!(
            client_id = self.client_id,
            reason = %reason,
            age_ms = self.age().as_millis() as u64,
            "Connection closed"
        );

        true
    }

    /// Check if the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reason the connection was closed, if it has been
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.state().close_reason().cloned()
    }

    /// Resolve once the connection is closed
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    fn closed_error(&self) -> ConnectionError {
        ConnectionError::Closed {
            client_id: self.client_id,
        }
    }
}

/// Pump socket reads into the ingress queue until failure or cancellation
async fn read_loop<R, RE>(
    connection: Arc<Connection>,
    reader: R,
    ingress: async_channel::Sender<Bytes>,
) where
    R: Stream<Item = Result<Bytes, RE>>,
    RE: Display,
{
    tokio::pin!(reader);
    let client_id = connection.client_id;

    let reason = loop {
        let item = tokio::select! {
            biased;
            _ = connection.cancel.cancelled() => break None,
            item = reader.next() => item,
        };

        let payload = match item {
            Some(Ok(payload)) => payload,
            Some(Err(e)) => {
                tracing::warn!(client_id = client_id, error = %e, "Socket read failed");
                break Some(CloseReason::ReadError(e.to_string()));
            }
            None => break Some(CloseReason::PeerClosed),
        };

        tokio::select! {
            biased;
            _ = connection.cancel.cancelled() => break None,
            sent = ingress.send(payload) => {
                if sent.is_err() {
                    break None;
                }
            }
        }
    };

    if let Some(reason) = reason {
        connection.close_with(reason);
    }
}

/// Pump the egress queue onto the socket until failure or cancellation
async fn write_loop<W>(
    connection: Arc<Connection>,
    writer: W,
    egress: async_channel::Receiver<Bytes>,
) where
    W: Sink<Bytes>,
    W::Error: Display,
{
    tokio::pin!(writer);
    let client_id = connection.client_id;

    let reason = loop {
        let payload = tokio::select! {
            biased;
            _ = connection.cancel.cancelled() => break None,
            payload = egress.recv() => match payload {
                Ok(payload) => payload,
                Err(_) => break None,
            },
        };

        let sent = tokio::select! {
            biased;
            _ = connection.cancel.cancelled() => break None,
            sent = writer.send(payload) => sent,
        };

        if let Err(e) = sent {
            tracing::warn!(client_id = client_id, error = %e, "Socket write failed");
            break Some(CloseReason::WriteError(e.to_string()));
        }
    };

    if let Some(reason) = reason {
        connection.close_with(reason);
    }

    // Release the socket; a peer that stopped reading must not pin this task
    match tokio::time::timeout(SINK_CLOSE_TIMEOUT, writer.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(client_id = client_id, error = %e, "Socket close failed");
        }
        Err(_) => {
            tracing::debug!(client_id = client_id, "Socket close timed out");
        }
    }
}
