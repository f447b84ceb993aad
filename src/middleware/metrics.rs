//! Request count and latency collection.

use crate::metrics::MetricsCollector;
use crate::middleware::Middleware;
use crate::server::{Handler, HandlerFuture};
use bytes::Bytes;
use hyper::Request;
use std::sync::Arc;
use std::time::Instant;

/// Records every response in a [`MetricsCollector`], labelled by path and
/// status code.
#[derive(Clone)]
pub struct RequestMetrics {
    collector: MetricsCollector,
}

impl RequestMetrics {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }
}

impl Middleware for RequestMetrics {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(MetricsHandler {
            collector: self.collector.clone(),
            next,
        })
    }
}

struct MetricsHandler {
    collector: MetricsCollector,
    next: Arc<dyn Handler>,
}

impl Handler for MetricsHandler {
    fn call(&self, req: Request<Bytes>) -> HandlerFuture {
        let path = req.uri().path().to_string();
        let collector = self.collector.clone();
        let start = Instant::now();
        let response = self.next.call(req);

        Box::pin(async move {
            let response = response.await;
            collector.record_request(&path, response.status().as_u16(), start.elapsed());
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::text_response;
    use hyper::StatusCode;

    #[tokio::test]
    async fn test_records_status_per_path() {
        let collector = MetricsCollector::new();
        let handler = RequestMetrics::new(collector.clone()).wrap(Arc::new(
            |req: Request<Bytes>| async move {
                if req.uri().query().is_some() {
                    text_response(StatusCode::OK, "OK")
                } else {
                    text_response(StatusCode::BAD_REQUEST, "missing query")
                }
            },
        ));

        for uri in ["/fizzbuzz?limit=1", "/fizzbuzz?limit=2", "/fizzbuzz"] {
            let req = Request::builder().uri(uri).body(Bytes::new()).unwrap();
            handler.call(req).await;
        }

        assert_eq!(collector.request_count("/fizzbuzz", 200), 2);
        assert_eq!(collector.request_count("/fizzbuzz", 400), 1);
    }
}
