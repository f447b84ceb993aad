//! One structured log line per request.

use crate::middleware::Middleware;
use crate::server::{Handler, HandlerFuture};
use crate::util::RequestId;
use bytes::Bytes;
use hyper::Request;
use hyper::header::{HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Header carrying the request ID in both directions.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Logs method, path, status and latency of every request and tags the
/// response with its request ID.
#[derive(Clone)]
pub struct RequestLogging {
    server: Arc<str>,
}

impl RequestLogging {
    /// `server` names the server in every log line.
    pub fn new(server: &str) -> Self {
        Self {
            server: Arc::from(server),
        }
    }
}

impl Middleware for RequestLogging {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(LoggingHandler {
            server: Arc::clone(&self.server),
            next,
        })
    }
}

struct LoggingHandler {
    server: Arc<str>,
    next: Arc<dyn Handler>,
}

impl Handler for LoggingHandler {
    fn call(&self, req: Request<Bytes>) -> HandlerFuture {
        let request_id = RequestId::from_header(req.headers().get(&REQUEST_ID_HEADER));
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let server = Arc::clone(&self.server);
        let start = Instant::now();
        let response = self.next.call(req);

        Box::pin(async move {
            let mut response = response.await;
            let status = response.status();
            let duration = start.elapsed();

            if status.is_server_error() {
                warn!(
                    server = %server,
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    duration_us = duration.as_micros() as u64,
                    "request failed"
                );
            } else {
                info!(
                    server = %server,
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    duration_us = duration.as_micros() as u64,
                    "request completed"
                );
            }

            if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            response
        })
    }
}
