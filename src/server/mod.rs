//! HTTP/WebSocket front end
//!
//! Accepts client sockets, hands them to the registry, and exposes the push
//! and status endpoints.

pub mod config;
pub mod hooks;
pub mod listener;
pub mod routes;
pub mod socket;

pub use config::ServerConfig;
pub use listener::PushServer;
pub use routes::{AppState, ErrorBody, PushRequest, PushResponse};
