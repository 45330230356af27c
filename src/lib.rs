//! Sharded WebSocket push gateway
//!
//! Holds a large set of long-lived duplex connections and fans broadcast
//! messages out to them with bounded memory. A slow or dead client can only
//! stall its own shard, never delivery to other shards.
//!
//! The crate is layered leaf-first:
//!
//! - [`connection`]: one socket behind bounded ingress/egress queues and a
//!   cancellation signal
//! - [`registry`]: shards (buckets) of connections plus the two-stage
//!   fan-out pipeline
//! - [`stats`]: lock-free counters observing registry size and delivery
//! - [`server`]: the HTTP/WebSocket front end
//!
//! # Example
//!
//! ```no_run
//! use wspush_rs::{PushServer, ServerConfig};
//!
//! # async fn example() -> wspush_rs::error::Result<()> {
//! let server = PushServer::new(ServerConfig::default());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod registry;
pub mod server;
pub mod stats;

pub use connection::{Connection, ConnectionConfig, ConnectionError};
pub use error::{Error, Result};
pub use registry::{PushMessage, Registry, RegistryConfig, RegistryError};
pub use server::{PushServer, ServerConfig};
pub use stats::{Stats, StatsSnapshot};
