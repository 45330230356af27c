//! A single bucket (shard) of the registry
//!
//! Each bucket owns one `RwLock`-guarded map of client id to connection.
//! Register/unregister take the write lock; broadcasts only take the read
//! lock long enough to snapshot the members, so a slow recipient never holds
//! the lock while its write waits.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::connection::Connection;

use super::message::PushMessage;

/// Outcome of broadcasting one message to a bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections whose egress queue accepted the message
    pub delivered: usize,
    /// Connections that were already closed
    pub failed: usize,
}

/// Partition of the connection set
#[derive(Debug)]
pub struct Bucket {
    index: usize,
    connections: RwLock<HashMap<u64, Arc<Connection>>>,
}

impl Bucket {
    /// Create an empty bucket
    pub fn new(index: usize) -> Self {
        Self {
            index,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Index of this bucket in the registry
    pub fn index(&self) -> usize {
        self.index
    }

    /// Insert a connection, keyed by its client id
    ///
    /// Returns whatever entry was previously stored under that id.
    pub async fn register(&self, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let mut connections = self.connections.write().await;
        connections.insert(connection.client_id(), connection)
    }

    /// Remove a connection
    ///
    /// Only removes the entry if it is this exact connection, so a stale
    /// handle cannot evict its replacement. Returns whether anything was
    /// removed.
    pub async fn unregister(&self, connection: &Arc<Connection>) -> bool {
        let mut connections = self.connections.write().await;

        match connections.get(&connection.client_id()) {
            Some(current) if Arc::ptr_eq(current, connection) => {
                connections.remove(&connection.client_id());
                true
            }
            _ => false,
        }
    }

    /// Look up the connection registered for a client id
    pub async fn get(&self, client_id: u64) -> Option<Arc<Connection>> {
        self.connections.read().await.get(&client_id).cloned()
    }

    /// Number of registered connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Check if the bucket has no connections
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Write a message to every registered connection
    ///
    /// A closed connection is logged and counted but never stops delivery to
    /// the rest of the bucket. Iteration order is unspecified.
    pub async fn broadcast(&self, message: &PushMessage) -> DeliveryReport {
        let members: Vec<Arc<Connection>> =
            self.connections.read().await.values().cloned().collect();

        let mut report = DeliveryReport::default();

        for connection in members {
            match connection.write(message.payload().clone()).await {
                Ok(()) => {
                    report.delivered += 1;
                    tracing::debug!(
                        bucket = self.index,
                        client_id = connection.client_id(),
                        bytes = message.len(),
                        "Message delivered"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        bucket = self.index,
                        client_id = connection.client_id(),
                        error = %e,
                        "Broadcast write failed"
                    );
                }
            }
        }

        report
    }
}
