//! Metrics collector using prometheus-client.
//!
//! Provides request count and latency metrics for the API server.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Latency histogram buckets, in seconds.
pub const LATENCY_BUCKETS: [f64; 4] = [0.0001, 0.001, 0.01, 0.1];

/// Labels for request metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub path: String,
    pub code: String,
}

/// Collects and stores all metrics.
///
/// Cheap to clone; every clone records into the same registry.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Total requests counter.
    requests_total: Family<RequestLabels, Counter>,
    /// Request latency histogram (in seconds).
    request_latency_seconds: Histogram,
    /// The prometheus registry.
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_total = Family::<RequestLabels, Counter>::default();
        let request_latency_seconds = Histogram::new(LATENCY_BUCKETS.into_iter());

        registry.register(
            "http_requests",
            "the total number of requests received",
            requests_total.clone(),
        );
        registry.register(
            "http_request_latency_seconds",
            "request latency in seconds",
            request_latency_seconds.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                requests_total,
                request_latency_seconds,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record a completed request.
    pub fn record_request(&self, path: &str, status: u16, latency: Duration) {
        let labels = RequestLabels {
            path: path.to_string(),
            code: status.to_string(),
        };
        self.inner.requests_total.get_or_create(&labels).inc();
        self.inner
            .request_latency_seconds
            .observe(latency.as_secs_f64());
    }

    /// Number of requests recorded for a path and status code.
    pub fn request_count(&self, path: &str, status: u16) -> u64 {
        let labels = RequestLabels {
            path: path.to_string(),
            code: status.to_string(),
        };
        self.inner.requests_total.get_or_create(&labels).get()
    }

    /// Encode every registered metric in the OpenMetrics text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, self.registry())?;
        Ok(buffer)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request() {
        let collector = MetricsCollector::new();
        collector.record_request("/fizzbuzz", 200, Duration::from_millis(5));
        collector.record_request("/fizzbuzz", 200, Duration::from_micros(50));
        collector.record_request("/fizzbuzz", 401, Duration::from_micros(20));

        assert_eq!(collector.request_count("/fizzbuzz", 200), 2);
        assert_eq!(collector.request_count("/fizzbuzz", 401), 1);
        assert_eq!(collector.request_count("/other", 200), 0);
    }

    #[test]
    fn test_collectors_are_independent() {
        let first = MetricsCollector::new();
        let second = MetricsCollector::new();
        first.record_request("/fizzbuzz", 200, Duration::from_millis(1));

        assert_eq!(first.request_count("/fizzbuzz", 200), 1);
        assert_eq!(second.request_count("/fizzbuzz", 200), 0);
    }

    #[test]
    fn test_metrics_encoding() {
        let collector = MetricsCollector::new();
        collector.record_request("/fizzbuzz", 400, Duration::from_millis(10));

        let buffer = collector.encode().unwrap();

        assert!(buffer.contains("http_requests_total"));
        assert!(buffer.contains("code=\"400\""));
        assert!(buffer.contains("http_request_latency_seconds_bucket"));
        assert!(buffer.ends_with("# EOF\n"));
    }
}
