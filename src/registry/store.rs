//! Registry implementation
//!
//! Owns every bucket and runs the fan-out pipeline that turns one submitted
//! message into a delivery per bucket.

use std::sync::Arc;

use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;

use crate::connection::{CloseReason, Connection, ConnectionConfig};
use crate::stats::Stats;

use super::bucket::Bucket;
use super::config::RegistryConfig;
use super::error::RegistryError;
use super::message::PushMessage;

/// Sharded set of live connections plus its delivery workers
///
/// The bucket list and queue handles never change after construction, so
/// routing needs no lock; only each bucket's own map is locked.
pub struct Registry {
    buckets: Vec<Arc<Bucket>>,

    /// Shared ingest buffer feeding the dispatch workers
    ingest_tx: Sender<PushMessage>,

    stats: Arc<Stats>,

    config: RegistryConfig,
}

impl Registry {
    /// Create a registry with default configuration
    ///
    /// Spawns the pipeline workers, so it must be called inside a tokio
    /// runtime.
    pub fn new(stats: Arc<Stats>) -> Self {
        Self::with_config(RegistryConfig::default(), stats)
    }

    /// Create a registry with custom configuration
    ///
    /// Workers live until the registry is dropped: dropping it closes the
    /// ingest buffer, the dispatch workers drain it and exit, which in turn
    /// closes the job queues and retires the delivery workers.
    pub fn with_config(config: RegistryConfig, stats: Arc<Stats>) -> Self {
        let bucket_count = config.bucket_count.max(1);
        let (ingest_tx, ingest_rx) = async_channel::bounded(config.ingest_capacity.max(1));

        let mut buckets = Vec::with_capacity(bucket_count);
        let mut job_queues = Vec::with_capacity(bucket_count);

        for index in 0..bucket_count {
            let bucket = Arc::new(Bucket::new(index));
            let (job_tx, job_rx) = async_channel::bounded(config.job_capacity.max(1));

            for worker in 0..config.delivery_workers_per_bucket.max(1) {
                tokio::spawn(delivery_worker(
                    worker,
                    Arc::clone(&bucket),
                    job_rx.clone(),
                    Arc::clone(&stats),
                ));
            }

            buckets.push(bucket);
            job_queues.push(job_tx);
        }

        let job_queues: Arc<[Sender<PushMessage>]> = job_queues.into();
        for worker in 0..config.dispatch_workers.max(1) {
            tokio::spawn(dispatch_worker(
                worker,
                ingest_rx.clone(),
                Arc::clone(&job_queues),
                Arc::clone(&stats),
            ));
        }

        tracing::info!(
            buckets = bucket_count,
            dispatch_workers = config.dispatch_workers,
            delivery_workers_per_bucket = config.delivery_workers_per_bucket,
            "Registry started"
        );

        Self {
            buckets,
            ingest_tx,
            stats,
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get the shared counters
    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Number of buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Get a bucket by index
    pub fn bucket(&self, index: usize) -> Option<&Arc<Bucket>> {
        self.buckets.get(index)
    }

    /// Bucket index a client id routes to
    ///
    /// Stable for the lifetime of the registry.
    pub fn assign_shard(&self, client_id: u64) -> usize {
        (client_id % self.buckets.len() as u64) as usize
    }

    fn bucket_for(&self, client_id: u64) -> &Arc<Bucket> {
        &self.buckets[self.assign_shard(client_id)]
    }

    /// Add a connection to its bucket
    ///
    /// A different connection already registered under the same client id is
    /// replaced and closed.
    pub async fn register_connection(&self, connection: Arc<Connection>) {
        let client_id = connection.client_id();
        let bucket = self.bucket_for(client_id);

        match bucket.register(Arc::clone(&connection)).await {
            None => {
                self.stats.connection_added();
                tracing::info!(
                    client_id = client_id,
                    bucket = bucket.index(),
                    online = self.stats.connections_online(),
                    "Connection registered"
                );
            }
            Some(previous) if Arc::ptr_eq(&previous, &connection) => {}
            Some(previous) => {
                previous.close_with(CloseReason::Superseded);
                tracing::info!(
                    client_id = client_id,
                    bucket = bucket.index(),
                    "Connection replaced"
                );
            }
        }
    }

    /// Remove a connection from its bucket
    ///
    /// Does not close it. Returns whether it was registered.
    pub async fn unregister_connection(&self, connection: &Arc<Connection>) -> bool {
        let client_id = connection.client_id();
        let bucket = self.bucket_for(client_id);

        let removed = bucket.unregister(connection).await;
        if removed {
            self.stats.connection_removed();
            tracing::info!(
                client_id = client_id,
                bucket = bucket.index(),
                online = self.stats.connections_online(),
                "Connection unregistered"
            );
        }

        removed
    }

    /// Look up the connection registered for a client id
    pub async fn connection(&self, client_id: u64) -> Option<Arc<Connection>> {
        self.bucket_for(client_id).get(client_id).await
    }

    /// Total connections across all buckets
    pub async fn connection_count(&self) -> usize {
        let mut total = 0;
        for bucket in &self.buckets {
            total += bucket.len().await;
        }
        total
    }

    /// Submit a message for delivery to every connection
    ///
    /// Waits while the ingest buffer is full; messages are never dropped to
    /// make room.
    pub async fn submit(&self, message: PushMessage) -> Result<(), RegistryError> {
        // Counted before the send so a dispatch worker never takes it below zero
        let mut pending = BufferedSlot::reserve(&self.stats);
        self.ingest_tx
            .send(message)
            .await
            .map_err(|_| RegistryError::PipelineClosed)?;
        pending.commit();
        Ok(())
    }

    /// Deliver a message to a single client, bypassing the pipeline
    pub async fn push_to(&self, client_id: u64, message: PushMessage) -> Result<(), RegistryError> {
        let connection = self
            .connection(client_id)
            .await
            .ok_or(RegistryError::ClientNotFound(client_id))?;

        match connection.write(message.payload().clone()).await {
            Ok(()) => {
                self.stats.delivered(1);
                Ok(())
            }
            Err(e) => {
                self.stats.send_failed(1);
                tracing::warn!(client_id = client_id, error = %e, "Direct push failed");
                Err(e.into())
            }
        }
    }

    /// Spawn the liveness probe for a registered connection
    ///
    /// Writes `heartbeat_payload` every `heartbeat_interval`. A write only
    /// fails once the connection is already closed (by its writer on a dead
    /// socket, or by its owner), so the first failure unregisters it and the
    /// connection keeps the reason it was closed with. The wait between probes
    /// ends early on close, so a torn-down connection leaves its bucket
    /// promptly.
    pub fn spawn_heartbeat(
        self: &Arc<Self>,
        connection: Arc<Connection>,
        config: &ConnectionConfig,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = config.heartbeat_interval;
        let payload = config.heartbeat_payload.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = connection.closed() => {}
                }

                if let Err(e) = connection.write(payload.clone()).await {
                    tracing::warn!(
                        client_id = connection.client_id(),
                        error = %e,
                        "Heartbeat failed"
                    );
                    registry.unregister_connection(&connection).await;
                    connection.close();
                    return;
                }
            }
        })
    }
}

/// Buffered-gauge increment that is rolled back unless the send lands
///
/// Covers both a closed pipeline and a `submit` future dropped while waiting
/// on a full ingest buffer.
struct BufferedSlot<'a> {
    stats: &'a Stats,
    committed: bool,
}

impl<'a> BufferedSlot<'a> {
    fn reserve(stats: &'a Stats) -> Self {
        stats.message_buffered();
        Self {
            stats,
            committed: false,
        }
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for BufferedSlot<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.stats.message_dispatched();
        }
    }
}

/// Copy each ingested message into every bucket's job queue
async fn dispatch_worker(
    worker: usize,
    ingest: Receiver<PushMessage>,
    job_queues: Arc<[Sender<PushMessage>]>,
    stats: Arc<Stats>,
) {
    while let Ok(message) = ingest.recv().await {
        stats.message_dispatched();

        for (bucket, queue) in job_queues.iter().enumerate() {
            if queue.send(message.clone()).await.is_err() {
                tracing::warn!(worker = worker, bucket = bucket, "Job queue closed");
            }
        }
    }

    tracing::debug!(worker = worker, "Dispatch worker stopped");
}

/// Broadcast every job for one bucket
async fn delivery_worker(
    worker: usize,
    bucket: Arc<Bucket>,
    jobs: Receiver<PushMessage>,
    stats: Arc<Stats>,
) {
    while let Ok(message) = jobs.recv().await {
        let report = bucket.broadcast(&message).await;
        stats.delivered(report.delivered as u64);
        stats.send_failed(report.failed as u64);
    }

    tracing::debug!(worker = worker, bucket = bucket.index(), "Delivery worker stopped");
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::Bytes;
    use futures::channel::mpsc;
    use futures::StreamExt;
    use tokio_test::assert_pending;

    use super::*;

    fn client(client_id: u64) -> (Arc<Connection>, mpsc::UnboundedReceiver<Bytes>) {
        let (out_tx, out_rx) = mpsc::unbounded::<Bytes>();
        let silent = futures::stream::pending::<Result<Bytes, io::Error>>();
        let connection =
            Connection::from_parts(client_id, out_tx, silent, &ConnectionConfig::default());
        (connection, out_rx)
    }

    fn small_config(buckets: usize) -> RegistryConfig {
        RegistryConfig::default()
            .bucket_count(buckets)
            .dispatch_workers(2)
            .delivery_workers_per_bucket(2)
            .ingest_capacity(16)
            .job_capacity(16)
    }

    async fn expect_one(out_rx: &mut mpsc::UnboundedReceiver<Bytes>, expected: &[u8]) {
        let first = tokio::time::timeout(Duration::from_secs(1), out_rx.next())
            .await
            .expect("message should arrive")
            .unwrap();
        assert_eq!(first.as_ref(), expected);

        let extra = tokio::time::timeout(Duration::from_millis(50), out_rx.next()).await;
        assert!(extra.is_err(), "message delivered more than once");
    }

    #[tokio::test]
    async fn test_assign_shard_is_modulo() {
        let registry = Registry::with_config(small_config(3), Arc::new(Stats::new()));

        assert_eq!(registry.assign_shard(4), 1);
        assert_eq!(registry.assign_shard(7), 1);
        assert_eq!(registry.assign_shard(1), 1);

        for a in 0..50u64 {
            for b in 0..50u64 {
                if a % 3 == b % 3 {
                    assert_eq!(registry.assign_shard(a), registry.assign_shard(b));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_register_then_submit_delivers_once() {
        let stats = Arc::new(Stats::new());
        let registry = Registry::with_config(small_config(4), Arc::clone(&stats));
        let (conn, mut out_rx) = client(42);

        registry.register_connection(Arc::clone(&conn)).await;
        assert_eq!(stats.connections_online(), 1);

        registry.submit(PushMessage::text("news")).await.unwrap();

        expect_one(&mut out_rx, b"news").await;
        assert_eq!(stats.messages_delivered(), 1);
    }

    #[tokio::test]
    async fn test_unregister_then_submit_delivers_nothing() {
        let stats = Arc::new(Stats::new());
        let registry = Registry::with_config(small_config(4), Arc::clone(&stats));
        let (conn, mut out_rx) = client(42);

        registry.register_connection(Arc::clone(&conn)).await;
        assert!(registry.unregister_connection(&conn).await);
        assert!(!registry.unregister_connection(&conn).await);
        assert_eq!(stats.connections_online(), 0);

        registry.submit(PushMessage::text("news")).await.unwrap();

        let next = tokio::time::timeout(Duration::from_millis(100), out_rx.next()).await;
        assert!(next.is_err());
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_fan_out_across_buckets() {
        let registry = Registry::with_config(small_config(3), Arc::new(Stats::new()));

        let mut peers = Vec::new();
        for id in 1..=10u64 {
            let (conn, out_rx) = client(id);
            registry.register_connection(conn).await;
            peers.push(out_rx);
        }
        assert_eq!(registry.connection_count().await, 10);
        assert_eq!(registry.bucket(1).unwrap().len().await, 4);

        registry.submit(PushMessage::text("all")).await.unwrap();

        for out_rx in &mut peers {
            expect_one(out_rx, b"all").await;
        }
    }

    #[tokio::test]
    async fn test_reregister_closes_superseded() {
        let stats = Arc::new(Stats::new());
        let registry = Registry::with_config(small_config(2), Arc::clone(&stats));
        let (old, _old_rx) = client(9);
        let (new, mut new_rx) = client(9);

        registry.register_connection(Arc::clone(&old)).await;
        registry.register_connection(Arc::clone(&new)).await;

        assert_eq!(old.close_reason(), Some(CloseReason::Superseded));
        assert!(!new.is_closed());
        assert_eq!(stats.connections_online(), 1);

        // Same handle again is a no-op
        registry.register_connection(Arc::clone(&new)).await;
        assert!(!new.is_closed());
        assert_eq!(stats.connections_online(), 1);

        registry.submit(PushMessage::text("latest")).await.unwrap();
        expect_one(&mut new_rx, b"latest").await;
    }

    #[tokio::test]
    async fn test_push_to_single_client() {
        let stats = Arc::new(Stats::new());
        let registry = Registry::with_config(small_config(2), Arc::clone(&stats));
        let (target, mut target_rx) = client(1);
        let (other, mut other_rx) = client(2);

        registry.register_connection(target).await;
        registry.register_connection(Arc::clone(&other)).await;

        registry
            .push_to(1, PushMessage::text("direct"))
            .await
            .unwrap();
        expect_one(&mut target_rx, b"direct").await;

        let next = tokio::time::timeout(Duration::from_millis(50), other_rx.next()).await;
        assert!(next.is_err());

        let missing = registry.push_to(3, PushMessage::text("nobody")).await;
        assert_eq!(missing, Err(RegistryError::ClientNotFound(3)));

        other.close();
        let closed = registry.push_to(2, PushMessage::text("gone")).await;
        assert!(matches!(closed, Err(RegistryError::Connection(_))));
        assert_eq!(stats.send_failures(), 1);
    }

    #[tokio::test]
    async fn test_closed_connection_counts_failure() {
        let stats = Arc::new(Stats::new());
        let registry = Registry::with_config(small_config(1), Arc::clone(&stats));
        let (dead, _dead_rx) = client(1);
        let (alive, mut alive_rx) = client(2);

        registry.register_connection(Arc::clone(&dead)).await;
        registry.register_connection(alive).await;
        dead.close();

        registry.submit(PushMessage::text("ping")).await.unwrap();
        expect_one(&mut alive_rx, b"ping").await;

        assert_eq!(stats.send_failures(), 1);
        assert_eq!(stats.messages_delivered(), 1);
    }

    #[tokio::test]
    async fn test_backpressure_blocks_without_loss() {
        let config = RegistryConfig::default()
            .bucket_count(1)
            .dispatch_workers(1)
            .delivery_workers_per_bucket(1)
            .ingest_capacity(1)
            .job_capacity(1);
        let registry = Arc::new(Registry::with_config(config, Arc::new(Stats::new())));

        // A socket that accepts one frame and then stalls until drained
        let (stalled_tx, mut stalled_rx) = mpsc::channel::<Bytes>(0);
        let silent = futures::stream::pending::<Result<Bytes, io::Error>>();
        let conn = Connection::from_parts(
            1,
            stalled_tx,
            silent,
            &ConnectionConfig::default().egress_capacity(1),
        );
        registry.register_connection(conn).await;

        const TOTAL: usize = 20;
        let submitted = Arc::new(AtomicUsize::new(0));
        let producer = {
            let registry = Arc::clone(&registry);
            let submitted = Arc::clone(&submitted);
            tokio::spawn(async move {
                for i in 0..TOTAL {
                    registry
                        .submit(PushMessage::text(i.to_string()))
                        .await
                        .unwrap();
                    submitted.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!producer.is_finished());
        assert!(submitted.load(Ordering::SeqCst) < TOTAL);

        let buffered = registry.stats().messages_buffered();
        assert!(buffered >= 1);

        let mut extra = tokio_test::task::spawn(registry.submit(PushMessage::text("extra")));
        assert_pending!(extra.poll());
        assert_eq!(registry.stats().messages_buffered(), buffered + 1);

        // Abandoning a blocked submit gives its slot back
        drop(extra);
        assert_eq!(registry.stats().messages_buffered(), buffered);

        for i in 0..TOTAL {
            let frame = tokio::time::timeout(Duration::from_secs(1), stalled_rx.next())
                .await
                .expect("queued message should arrive")
                .unwrap();
            assert_eq!(frame, Bytes::from(i.to_string()));
        }

        tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(submitted.load(Ordering::SeqCst), TOTAL);

        tokio::time::timeout(Duration::from_secs(1), async {
            while registry.stats().messages_buffered() != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("buffered gauge should drain to zero");
    }

    #[tokio::test]
    async fn test_buffered_gauge_never_negative() {
        let stats = Arc::new(Stats::new());
        let registry = Arc::new(Registry::with_config(small_config(2), Arc::clone(&stats)));
        let (conn, _out_rx) = client(1);
        registry.register_connection(conn).await;

        let watcher = {
            let stats = Arc::clone(&stats);
            tokio::spawn(async move {
                let mut lowest = 0;
                for _ in 0..500 {
                    lowest = lowest.min(stats.messages_buffered());
                    tokio::task::yield_now().await;
                }
                lowest
            })
        };

        for i in 0..200 {
            registry
                .submit(PushMessage::text(i.to_string()))
                .await
                .unwrap();
            assert!(stats.messages_buffered() >= 0);
        }

        assert_eq!(watcher.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_heartbeat_failure_unregisters_once() {
        let stats = Arc::new(Stats::new());
        let registry = Arc::new(Registry::with_config(small_config(2), Arc::clone(&stats)));
        let (conn, out_rx) = client(11);
        let config = ConnectionConfig::default().heartbeat_interval(Duration::from_millis(10));

        registry.register_connection(Arc::clone(&conn)).await;
        assert_eq!(stats.connections_online(), 1);

        // Peer goes away: the next probe hits a dead socket
        drop(out_rx);
        let heartbeat = registry.spawn_heartbeat(Arc::clone(&conn), &config);

        tokio::time::timeout(Duration::from_secs(1), heartbeat)
            .await
            .expect("heartbeat should stop")
            .unwrap();

        assert!(matches!(conn.close_reason(), Some(CloseReason::WriteError(_))));
        assert_eq!(stats.connections_online(), 0);
        assert!(registry.connection(11).await.is_none());
        assert!(!registry.unregister_connection(&conn).await);
        assert_eq!(stats.connections_online(), 0);
    }

    #[tokio::test]
    async fn test_heartbeat_reacts_to_close() {
        let stats = Arc::new(Stats::new());
        let registry = Arc::new(Registry::with_config(small_config(2), Arc::clone(&stats)));
        let (conn, mut out_rx) = client(12);
        let config = ConnectionConfig::default()
            .heartbeat_interval(Duration::from_millis(10))
            .heartbeat_payload("beat");

        registry.register_connection(Arc::clone(&conn)).await;
        let heartbeat = registry.spawn_heartbeat(Arc::clone(&conn), &config);

        let beat = tokio::time::timeout(Duration::from_secs(1), out_rx.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(beat, Bytes::from_static(b"beat"));

        conn.close();

        tokio::time::timeout(Duration::from_secs(1), heartbeat)
            .await
            .expect("heartbeat should stop")
            .unwrap();
        assert_eq!(conn.close_reason(), Some(CloseReason::Explicit));
        assert_eq!(stats.connections_online(), 0);
    }
}
