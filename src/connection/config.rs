//! Connection configuration

use std::time::Duration;

use bytes::Bytes;

/// Per-connection queue and liveness settings
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Capacity of the socket → application queue
    pub ingress_capacity: usize,

    /// Capacity of the application → socket queue
    pub egress_capacity: usize,

    /// Delay between liveness probes
    pub heartbeat_interval: Duration,

    /// Payload written as the liveness probe
    pub heartbeat_payload: Bytes,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ingress_capacity: 1000,
            egress_capacity: 1000,
            heartbeat_interval: Duration::from_secs(60),
            heartbeat_payload: Bytes::from_static(b"heartbeat..."),
        }
    }
}

impl ConnectionConfig {
    /// Set the ingress queue capacity (minimum 1)
    pub fn ingress_capacity(mut self, capacity: usize) -> Self {
        self.ingress_capacity = capacity.max(1);
        self
    }

    /// Set the egress queue capacity (minimum 1)
    pub fn egress_capacity(mut self, capacity: usize) -> Self {
        self.egress_capacity = capacity.max(1);
        self
    }

    /// Set the heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the heartbeat payload
    pub fn heartbeat_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.heartbeat_payload = payload.into();
        self
    }
}
