//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::connection::ConnectionConfig;
use crate::registry::RegistryConfig;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent WebSocket connections (0 = unlimited)
    pub max_connections: usize,

    /// Sent to every client right after the upgrade (None = nothing)
    pub welcome_message: Option<String>,

    /// Write every inbound payload back to its sender
    pub echo_inbound: bool,

    /// Queue sizes and heartbeat for each client connection
    pub connection: ConnectionConfig,

    /// Bucket count and pipeline sizing
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 29999)),
            max_connections: 0, // Unlimited
            welcome_message: Some("welcome to connection ...".to_string()),
            echo_inbound: false,
            connection: ConnectionConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the welcome message
    pub fn welcome_message(mut self, message: impl Into<String>) -> Self {
        self.welcome_message = Some(message.into());
        self
    }

    /// Send nothing on connect
    pub fn disable_welcome_message(mut self) -> Self {
        self.welcome_message = None;
        self
    }

    /// Echo inbound payloads back to the client that sent them
    pub fn echo_inbound(mut self, enabled: bool) -> Self {
        self.echo_inbound = enabled;
        self
    }

    /// Set the heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.connection = self.connection.heartbeat_interval(interval);
        self
    }

    /// Replace the per-connection configuration
    pub fn connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }

    /// Replace the registry configuration
    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry = config;
        self
    }
}
