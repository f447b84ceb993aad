//! Admin endpoints: liveness and metrics export.
//!
//! Served on their own address, unauthenticated, so they stay reachable for
//! probes and scrapers but not for API consumers.

use crate::metrics::MetricsCollector;
use crate::server::{HttpResponse, Router, text_response};
use bytes::Bytes;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Request, StatusCode};
use tracing::error;

/// Content type of the metrics exposition.
pub const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Routes served on the admin address, before middleware.
pub fn admin_router(collector: MetricsCollector) -> Router {
    Router::new()
        .get("/health", |_req: Request<Bytes>| async {
            text_response(StatusCode::OK, "OK")
        })
        .get("/metrics", move |_req: Request<Bytes>| {
            let response = metrics_response(&collector);
            async move { response }
        })
}

fn metrics_response(collector: &MetricsCollector) -> HttpResponse {
    match collector.encode() {
        Ok(body) => {
            let mut response = text_response(StatusCode::OK, body);
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static(OPENMETRICS_CONTENT_TYPE),
            );
            response
        }
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Handler;
    use http_body_util::BodyExt;
    use std::time::Duration;

    async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
        let req = Request::builder().uri(uri).body(Bytes::new()).unwrap();
        let response = router.call(req).await;
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let router = admin_router(MetricsCollector::new());
        assert_eq!(get(&router, "/health").await, (StatusCode::OK, "OK".to_string()));
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let collector = MetricsCollector::new();
        collector.record_request("/fizzbuzz", 200, Duration::from_micros(250));
        let router = admin_router(collector);

        let req = Request::builder().uri("/metrics").body(Bytes::new()).unwrap();
        let response = router.call(req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], OPENMETRICS_CONTENT_TYPE);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("http_requests_total{path=\"/fizzbuzz\",code=\"200\"} 1"));
        assert!(body.contains("http_request_latency_seconds_bucket"));
        assert!(body.ends_with("# EOF\n"));
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let router = admin_router(MetricsCollector::new());
        let (status, _) = get(&router, "/fizzbuzz").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
