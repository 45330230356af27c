//! Crate-level error type

use thiserror::Error;

use crate::connection::ConnectionError;
use crate::registry::RegistryError;

/// Top-level error for gateway operations
#[derive(Debug, Error)]
pub enum Error {
    /// Operation on a torn-down connection
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Registry or pipeline failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Listener or socket setup failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;
