//! Registry error types

use thiserror::Error;

use crate::connection::ConnectionError;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The ingest buffer no longer has any dispatch worker behind it
    #[error("push pipeline is closed")]
    PipelineClosed,

    /// No connection is registered for the client id
    #[error("client {0} is not connected")]
    ClientNotFound(u64),

    /// The target connection was torn down
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
