//! Per-connection duplex transport
//!
//! A [`Connection`] owns one physical socket and hides it behind two bounded
//! queues and a cancellation signal. Application code never touches the raw
//! socket: it calls [`Connection::read`] and [`Connection::write`], which only
//! wait on queues.
//!
//! ```text
//!              socket (Stream half)               socket (Sink half)
//!                     │                                  ▲
//!                     ▼                                  │
//!               [reader task]                      [writer task]
//!                     │                                  ▲
//!                     ▼                                  │
//!          ingress queue (bounded)           egress queue (bounded)
//!                     │                                  ▲
//!                     ▼                                  │
//!              Connection::read()              Connection::write()
//!
//!                  cancellation token: observed by every waiter
//! ```
//!
//! Any I/O error is terminal: the task that sees it closes the connection,
//! which fires the token and unblocks every pending `read`/`write` with
//! [`ConnectionError::Closed`].

pub mod config;
pub mod error;
pub mod handle;
pub mod state;

pub use config::ConnectionConfig;
pub use error::ConnectionError;
pub use handle::Connection;
pub use state::{CloseReason, ConnectionState};
