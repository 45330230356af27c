//! Connection error types

use thiserror::Error;

/// Error returned by logical reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The connection's cancellation signal has fired
    #[error("connection for client {client_id} is closed")]
    Closed {
        /// Client the connection belongs to
        client_id: u64,
    },
}
