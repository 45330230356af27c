//! Gateway-wide counters
//!
//! Lock-free atomics updated by the registry and its workers. Purely
//! advisory: nothing reads them to make a control decision.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters shared by the registry, its workers, and the status page
#[derive(Debug, Default)]
pub struct Stats {
    connections_online: AtomicI64,
    messages_buffered: AtomicI64,
    send_failures: AtomicU64,
    messages_delivered: AtomicU64,
}

impl Stats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection joined a bucket
    pub fn connection_added(&self) {
        self.connections_online.fetch_add(1, Ordering::Relaxed);
    }

    /// A connection left its bucket
    pub fn connection_removed(&self) {
        self.connections_online.fetch_sub(1, Ordering::Relaxed);
    }

    /// A message entered the ingest buffer
    pub fn message_buffered(&self) {
        self.messages_buffered.fetch_add(1, Ordering::Relaxed);
    }

    /// A message left the ingest buffer for fan-out
    pub fn message_dispatched(&self) {
        self.messages_buffered.fetch_sub(1, Ordering::Relaxed);
    }

    /// Writes that hit a closed connection
    pub fn send_failed(&self, count: u64) {
        if count > 0 {
            self.send_failures.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Writes accepted by a connection's egress queue
    pub fn delivered(&self, count: u64) {
        if count > 0 {
            self.messages_delivered.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Connections currently registered
    pub fn connections_online(&self) -> i64 {
        self.connections_online.load(Ordering::Relaxed)
    }

    /// Messages submitted but not yet fanned out
    pub fn messages_buffered(&self) -> i64 {
        self.messages_buffered.load(Ordering::Relaxed)
    }

    /// Total failed writes
    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    /// Total successful writes
    pub fn messages_delivered(&self) -> u64 {
        self.messages_delivered.load(Ordering::Relaxed)
    }

    /// Copy the current values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connection_total: self.connections_online(),
            message_buffer_total: self.messages_buffered(),
            message_send_fail_total: self.send_failures(),
            message_delivered_total: self.messages_delivered(),
        }
    }
}

/// Point-in-time copy of [`Stats`], as served on the status page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Connections currently registered
    pub connection_total: i64,
    /// Messages waiting in the ingest buffer
    pub message_buffer_total: i64,
    /// Writes that failed because the connection was closed
    pub message_send_fail_total: u64,
    /// Writes accepted by connections
    pub message_delivered_total: u64,
}
