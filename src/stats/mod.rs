//! Statistics for the push gateway

pub mod metrics;

pub use metrics::{Stats, StatsSnapshot};
