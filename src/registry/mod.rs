//! Sharded connection registry and broadcast pipeline
//!
//! Connections are partitioned into a fixed set of buckets by
//! `client_id % bucket_count`. A submitted message goes through two stages
//! of bounded queues before it reaches any socket.
//!
//! # Architecture
//!
//! ```text
//!                         Registry::submit()
//!                                 │
//!                                 ▼
//!                     ingest buffer (bounded, shared)
//!                                 │
//!                    [dispatch worker] × dispatch_workers
//!                  one copy per bucket │
//!         ┌───────────────────────┼───────────────────────┐
//!         ▼                       ▼                       ▼
//!   job queue 0             job queue 1             job queue N-1
//!         │                       │                       │
//!  [delivery workers]      [delivery workers]      [delivery workers]
//!         │                       │                       │
//!  Bucket::broadcast()     Bucket::broadcast()     Bucket::broadcast()
//!         │                       │                       │
//!   Connection::write()    Connection::write()     Connection::write()
//! ```
//!
//! # Backpressure
//!
//! Every queue is bounded and every stage waits when the next one is full,
//! so a saturated bucket eventually stalls the submitter instead of losing
//! messages. A stalled connection only holds up the workers of its own
//! bucket.
//!
//! # Zero-Copy Design
//!
//! [`PushMessage`] wraps `bytes::Bytes`, so the per-bucket copies and the
//! per-connection writes all share one allocation.

pub mod bucket;
pub mod config;
pub mod error;
pub mod message;
pub mod store;

pub use bucket::{Bucket, DeliveryReport};
pub use config::RegistryConfig;
pub use error::RegistryError;
pub use message::PushMessage;
pub use store::Registry;
