//! Request middleware and the ordered stack that applies it.
//!
//! The first layer added to a [`MiddlewareStack`] sees the request first and
//! the response last. The API server stacks logging, then metrics, then
//! authentication, so rejected requests are still logged and counted.

mod auth;
mod logging;
mod metrics;

pub use auth::ApiKeyAuth;
pub use logging::{REQUEST_ID_HEADER, RequestLogging};
pub use metrics::RequestMetrics;

use crate::server::Handler;
use std::sync::Arc;

/// Wraps a handler in another handler.
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler>;
}

/// Ordered list of middleware, outermost first.
#[derive(Default)]
pub struct MiddlewareStack {
    layers: Vec<Box<dyn Middleware>>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer inside every layer added so far.
    pub fn layer(mut self, middleware: impl Middleware + 'static) -> Self {
        self.layers.push(Box::new(middleware));
        self
    }

    /// Apply every layer around `handler`.
    pub fn wrap(&self, handler: Arc<dyn Handler>) -> Arc<dyn Handler> {
        self.layers
            .iter()
            .rev()
            .fold(handler, |next, layer| layer.wrap(next))
    }
}
