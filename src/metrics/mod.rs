//! Metrics collection and exposition.

mod collector;

pub use collector::{LATENCY_BUCKETS, MetricsCollector, RequestLabels};
