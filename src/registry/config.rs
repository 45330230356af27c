//! Registry configuration

/// Sizing of the shard set and the fan-out pipeline
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Number of buckets (shards); connections route by `client_id % bucket_count`
    pub bucket_count: usize,

    /// Workers copying ingested messages into every bucket's job queue
    pub dispatch_workers: usize,

    /// Workers per bucket draining its job queue
    ///
    /// With more than one, messages for the same bucket may be delivered out
    /// of submission order.
    pub delivery_workers_per_bucket: usize,

    /// Capacity of the shared ingest buffer
    pub ingest_capacity: usize,

    /// Capacity of each bucket's job queue
    pub job_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bucket_count: 10,
            dispatch_workers: 32,
            delivery_workers_per_bucket: 32,
            ingest_capacity: 1000,
            job_capacity: 1000,
        }
    }
}

impl RegistryConfig {
    /// Set the number of buckets (minimum 1)
    pub fn bucket_count(mut self, count: usize) -> Self {
        self.bucket_count = count.max(1);
        self
    }

    /// Set the number of dispatch workers (minimum 1)
    pub fn dispatch_workers(mut self, count: usize) -> Self {
        self.dispatch_workers = count.max(1);
        self
    }

    /// Set the number of delivery workers per bucket (minimum 1)
    pub fn delivery_workers_per_bucket(mut self, count: usize) -> Self {
        self.delivery_workers_per_bucket = count.max(1);
        self
    }

    /// Set the ingest buffer capacity (minimum 1)
    pub fn ingest_capacity(mut self, capacity: usize) -> Self {
        self.ingest_capacity = capacity.max(1);
        self
    }

    /// Set the per-bucket job queue capacity (minimum 1)
    pub fn job_capacity(mut self, capacity: usize) -> Self {
        self.job_capacity = capacity.max(1);
        self
    }
}
