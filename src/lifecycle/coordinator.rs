//! Concurrent startup and coordinated shutdown of every server.

use crate::lifecycle::{CancelReason, LifecycleSignal};
use crate::server::ServerHandle;
use futures::future::join_all;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// A server whose task ended for a reason other than shutdown.
#[derive(Debug)]
pub struct ServerFailure {
    pub server: String,
    pub reason: String,
}

impl fmt::Display for ServerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.server, self.reason)
    }
}

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{} server task(s) failed: {}", .0.len(), join_failures(.0))]
    ServerFailures(Vec<ServerFailure>),
}

fn join_failures(failures: &[ServerFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Runs a set of servers as one unit.
///
/// Every server runs in its own task. Whichever happens first, a server
/// task ending or someone else cancelling the signal, shuts all of them down.
pub struct Coordinator {
    signal: LifecycleSignal,
    servers: Vec<ServerHandle>,
    shutdown_timeout: Duration,
}

impl Coordinator {
    pub fn new(signal: LifecycleSignal, shutdown_timeout: Duration) -> Self {
        Self {
            signal,
            servers: Vec::new(),
            shutdown_timeout,
        }
    }

    /// Add a server. Shutdown is issued in the order servers were added.
    pub fn with_server(mut self, server: ServerHandle) -> Self {
        self.servers.push(server);
        self
    }

    pub fn signal(&self) -> &LifecycleSignal {
        &self.signal
    }

    /// Start every server, wait for the signal, shut everything down and
    /// report whether any server failed.
    pub async fn run(self) -> Result<(), LifecycleError> {
        let mut tasks = JoinSet::new();

        for server in &self.servers {
            let server = server.clone();
            let signal = self.signal.clone();

            tasks.spawn(async move {
                info!(server = server.name(), address = %server.address(), "starting server");
                let result = server.run().await;

                match &result {
                    Ok(()) => info!(server = server.name(), "server stopped"),
                    Err(e) => error!(server = server.name(), error = %e, "server failed"),
                }

                signal.cancel(CancelReason::ServerExited {
                    server: server.name().to_string(),
                });
                (server.name().to_string(), result)
            });
        }

        self.signal.cancelled().await;
        info!(reason = ?self.signal.reason(), "shutting down servers");

        let timeout = self.shutdown_timeout;
        let shutdowns = self.servers.iter().map(|server| async move {
            match server.shutdown(timeout).await {
                Ok(()) => {}
                Err(e) => warn!(server = server.name(), error = %e, "graceful shutdown incomplete"),
            }
        });
        join_all(shutdowns).await;

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((server, Err(e))) => failures.push(ServerFailure {
                    server,
                    reason: e.to_string(),
                }),
                Err(e) => failures.push(ServerFailure {
                    server: "unknown".to_string(),
                    reason: format!("task failed: {}", e),
                }),
            }
        }

        if failures.is_empty() {
            info!(servers = self.servers.len(), "all servers shut down");
            Ok(())
        } else {
            error!(failed = failures.len(), "servers shut down with failures");
            Err(LifecycleError::ServerFailures(failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BindAddress, ServerTimeouts};
    use crate::server::text_response;
    use bytes::Bytes;
    use hyper::{Request, StatusCode};
    use std::sync::Arc;

    fn server(name: &str, port: u16) -> ServerHandle {
        let handler =
            Arc::new(|_req: Request<Bytes>| async { text_response(StatusCode::OK, "OK") });
        ServerHandle::new(
            name,
            BindAddress::new("127.0.0.1", port),
            handler,
            ServerTimeouts::default(),
        )
    }

    #[tokio::test]
    async fn test_requested_shutdown_is_clean() {
        let signal = LifecycleSignal::new();
        let admin = server("admin", 0);
        let api = server("api", 0);

        let coordinator = Coordinator::new(signal.clone(), Duration::from_secs(3))
            .with_server(admin.clone())
            .with_server(api.clone());
        let task = tokio::spawn(coordinator.run());

        admin.wait_bound().await.unwrap();
        api.wait_bound().await.unwrap();
        signal.cancel(CancelReason::Requested);

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(admin.is_finished());
        assert!(api.is_finished());
    }

    #[tokio::test]
    async fn test_bind_failure_shuts_down_the_other_server() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let signal = LifecycleSignal::new();
        let admin = server("admin", 0);
        let api = server("api", port);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            Coordinator::new(signal.clone(), Duration::from_secs(3))
                .with_server(admin.clone())
                .with_server(api)
                .run(),
        )
        .await
        .unwrap();

        assert!(admin.is_shutting_down());
        assert!(admin.is_finished());
        assert_eq!(
            signal.reason(),
            Some(CancelReason::ServerExited { server: "api".into() })
        );

        let Err(LifecycleError::ServerFailures(failures)) = result else {
            panic!("expected a failure");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].server, "api");
        assert!(failures[0].reason.starts_with("failed to bind"));
    }
}
