//! Shared application state and server assembly.

use crate::admin::admin_router;
use crate::api::api_router;
use crate::config::Settings;
use crate::lifecycle::{Coordinator, LifecycleSignal, TerminationCounter};
use crate::metrics::MetricsCollector;
use crate::middleware::{ApiKeyAuth, MiddlewareStack, RequestLogging, RequestMetrics};
use crate::server::ServerHandle;
use std::sync::Arc;

/// Name of the public API server in logs.
pub const API_SERVER: &str = "api";

/// Name of the admin server in logs.
pub const ADMIN_SERVER: &str = "admin";

/// Everything the servers share for the lifetime of the process.
#[derive(Clone)]
pub struct AppState {
    /// Settings loaded at startup.
    settings: Arc<Settings>,

    /// Process-wide shutdown signal.
    signal: LifecycleSignal,

    /// Termination requests received so far.
    terminations: Arc<TerminationCounter>,

    /// Request metrics, exported by the admin server.
    metrics: MetricsCollector,
}

impl AppState {
    /// Create new application state.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            signal: LifecycleSignal::new(),
            terminations: Arc::new(TerminationCounter::new()),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn signal(&self) -> &LifecycleSignal {
        &self.signal
    }

    pub fn terminations(&self) -> &Arc<TerminationCounter> {
        &self.terminations
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// The public FizzBuzz server: logging, then metrics, then auth.
    pub fn api_server(&self) -> ServerHandle {
        let handler = MiddlewareStack::new()
            .layer(RequestLogging::new(API_SERVER))
            .layer(RequestMetrics::new(self.metrics.clone()))
            .layer(ApiKeyAuth::new(self.settings.api_key.clone()))
            .wrap(Arc::new(api_router()));

        ServerHandle::new(
            API_SERVER,
            self.settings.api_address.clone(),
            handler,
            self.settings.timeouts,
        )
    }

    /// The admin server: health and metrics, logged but never authenticated.
    pub fn admin_server(&self) -> ServerHandle {
        let handler = MiddlewareStack::new()
            .layer(RequestLogging::new(ADMIN_SERVER))
            .wrap(Arc::new(admin_router(self.metrics.clone())));

        ServerHandle::new(
            ADMIN_SERVER,
            self.settings.admin_address.clone(),
            handler,
            self.settings.timeouts,
        )
    }

    /// A coordinator for both servers. The admin server stops first so
    /// probes fail before the API goes away.
    pub fn coordinator(&self, admin: ServerHandle, api: ServerHandle) -> Coordinator {
        Coordinator::new(self.signal.clone(), self.settings.shutdown_timeout)
            .with_server(admin)
            .with_server(api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BindAddress, ServerTimeouts};
    use bytes::Bytes;
    use hyper::{Request, StatusCode};
    use std::time::Duration;

    fn settings(api_key: &str) -> Settings {
        Settings {
            api_address: BindAddress::new("127.0.0.1", 0),
            admin_address: BindAddress::new("127.0.0.1", 0),
            timeouts: ServerTimeouts::default(),
            shutdown_timeout: Duration::from_secs(3),
            api_key: api_key.to_string(),
        }
    }

    #[test]
    fn test_server_names() {
        let state = AppState::new(settings(""));
        assert_eq!(state.api_server().name(), API_SERVER);
        assert_eq!(state.admin_server().name(), ADMIN_SERVER);
        assert_eq!(state.terminations().get(), 0);
        assert!(!state.signal().is_cancelled());
    }

    #[tokio::test]
    async fn test_rejected_requests_are_counted() {
        let state = AppState::new(settings("secret"));
        let handler = MiddlewareStack::new()
            .layer(RequestMetrics::new(state.metrics().clone()))
            .layer(ApiKeyAuth::new(state.settings().api_key.clone()))
            .wrap(Arc::new(api_router()));

        let req = Request::builder()
            .uri("/fizzbuzz?string1=f&string2=b&int1=3&int2=5&limit=3")
            .body(Bytes::new())
            .unwrap();
        let response = handler.call(req).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.metrics().request_count("/fizzbuzz", 401), 1);
    }
}
