//! Connection lifecycle state
//!
//! A connection is either open or closed, and closed is terminal. The first
//! close wins and its reason is kept; later closes are no-ops.

use std::fmt;

/// Why a connection was torn down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed by the owner
    Explicit,
    /// The peer ended the stream
    PeerClosed,
    /// Reading from the socket failed
    ReadError(String),
    /// Writing to the socket failed
    WriteError(String),
    /// Replaced by a newer connection for the same client id
    Superseded,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Explicit => write!(f, "closed by owner"),
            CloseReason::PeerClosed => write!(f, "peer closed the stream"),
            CloseReason::ReadError(e) => write!(f, "read error: {}", e),
            CloseReason::WriteError(e) => write!(f, "write error: {}", e),
            CloseReason::Superseded => write!(f, "superseded by a newer connection"),
        }
    }
}

/// Open/closed flag of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Reads and writes are accepted
    Open,
    /// Torn down; every read and write reports closed
    Closed(CloseReason),
}

impl ConnectionState {
    /// Check if the connection is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed(_))
    }

    /// Reason for the close, if closed
    pub fn close_reason(&self) -> Option<&CloseReason> {
        match self {
            ConnectionState::Open => None,
            ConnectionState::Closed(reason) => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_reason() {
        assert!(!ConnectionState::Open.is_closed());
        assert!(ConnectionState::Open.close_reason().is_none());

        let closed = ConnectionState::Closed(CloseReason::ReadError("reset".into()));
        assert!(closed.is_closed());
        assert_eq!(
            closed.close_reason().map(|r| r.to_string()),
            Some("read error: reset".to_string())
        );
    }
}
