//! Shared-secret authentication.

use crate::middleware::Middleware;
use crate::server::{Handler, HandlerFuture, text_response};
use bytes::Bytes;
use hyper::header::AUTHORIZATION;
use hyper::{Request, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// Rejects requests whose `Authorization` header does not equal the
/// configured key. An empty key lets everything through.
#[derive(Clone)]
pub struct ApiKeyAuth {
    key: Arc<str>,
}

impl ApiKeyAuth {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Arc::from(key.into()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.key.is_empty()
    }
}

impl Middleware for ApiKeyAuth {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(ApiKeyHandler {
            auth: self.clone(),
            next,
        })
    }
}

struct ApiKeyHandler {
    auth: ApiKeyAuth,
    next: Arc<dyn Handler>,
}

impl Handler for ApiKeyHandler {
    fn call(&self, req: Request<Bytes>) -> HandlerFuture {
        if self.auth.is_enabled() {
            let presented = req.headers().get(AUTHORIZATION).map(|v| v.as_bytes());
            if presented != Some(self.auth.key.as_bytes()) {
                debug!(path = %req.uri().path(), "rejecting request without a valid API key");
                let response = text_response(StatusCode::UNAUTHORIZED, "Not Authenticated");
                return Box::pin(async move { response });
            }
        }

        self.next.call(req)
    }
}
