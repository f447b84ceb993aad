//! A bound listener with a graceful drain.

use crate::config::{BindAddress, ServerTimeouts};
use crate::server::connection::serve_connection;
use crate::server::handler::Handler;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Pending connection queue length for every listener.
const LISTEN_BACKLOG: i32 = 1024;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Server handle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("server '{0}' was already started")]
    AlreadyStarted(String),

    #[error("server '{server}' did not drain within {deadline:?}")]
    DrainTimeout { server: String, deadline: Duration },
}

/// One network endpoint serving a handler tree.
///
/// Clones share the same listener state, so one clone can `run()` in its
/// own task while another issues `shutdown()`.
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    address: BindAddress,
    handler: Arc<dyn Handler>,
    timeouts: ServerTimeouts,
    started: AtomicBool,
    /// Stop accepting and drain.
    stop: CancellationToken,
    /// Abort whatever is still connected.
    force: CancellationToken,
    /// Cancelled when `run()` returns.
    done: CancellationToken,
    local_addr: watch::Sender<Option<SocketAddr>>,
}

impl ServerHandle {
    /// Create a handle. Nothing is bound until [`ServerHandle::run`].
    pub fn new(
        name: impl Into<String>,
        address: BindAddress,
        handler: Arc<dyn Handler>,
        timeouts: ServerTimeouts,
    ) -> Self {
        let (local_addr, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                address,
                handler,
                timeouts,
                started: AtomicBool::new(false),
                stop: CancellationToken::new(),
                force: CancellationToken::new(),
                done: CancellationToken::new(),
                local_addr,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn address(&self) -> &BindAddress {
        &self.inner.address
    }

    /// The bound socket address, once the listener is up.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.borrow()
    }

    /// Wait until the listener is bound. Returns `None` if `run()` finished
    /// without binding.
    pub async fn wait_bound(&self) -> Option<SocketAddr> {
        let mut rx = self.inner.local_addr.subscribe();
        tokio::select! {
            bound = rx.wait_for(Option::is_some) => bound.ok().and_then(|addr| *addr),
            _ = self.inner.done.cancelled() => self.local_addr(),
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.stop.is_cancelled()
    }

    /// Whether `run()` has returned.
    pub fn is_finished(&self) -> bool {
        self.inner.done.is_cancelled()
    }

    /// Bind and serve until shut down.
    ///
    /// Returns `Ok(())` once the server has been closed by
    /// [`ServerHandle::shutdown`], including when shutdown was requested
    /// before the server started. Any other exit is an error.
    #[instrument(skip_all, fields(server = %self.inner.name))]
    pub async fn run(&self) -> Result<(), ServerError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyStarted(self.inner.name.clone()));
        }

        let result = self.serve().await;
        self.inner.done.cancel();
        result
    }

    async fn serve(&self) -> Result<(), ServerError> {
        let inner = &self.inner;
        if inner.stop.is_cancelled() {
            debug!("shutdown requested before start");
            return Ok(());
        }

        let listener = bind_listener(&inner.address)
            .await
            .map_err(|source| ServerError::Bind {
                address: inner.address.to_string(),
                source,
            })?;

        if let Ok(addr) = listener.local_addr() {
            inner.local_addr.send_replace(Some(addr));
            info!(address = %addr, "listener bound");
        }

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = inner.stop.cancelled() => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            Arc::clone(&inner.handler),
                            inner.timeouts,
                            inner.stop.clone(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        warn!(error = %e, "connection task failed");
                    }
                }
            }
        }

        drop(listener);
        info!(connections = connections.len(), "stopped accepting, draining");

        loop {
            tokio::select! {
                biased;

                _ = inner.force.cancelled() => {
                    warn!(connections = connections.len(), "closing remaining connections");
                    connections.shutdown().await;
                    break;
                }

                finished = connections.join_next() => match finished {
                    Some(Err(e)) => warn!(error = %e, "connection task failed"),
                    Some(Ok(())) => {}
                    None => break,
                },
            }
        }

        info!("server closed");
        Ok(())
    }

    /// Stop accepting, wait up to `deadline` for open connections to finish,
    /// then close whatever is left.
    ///
    /// Never waits past `deadline`. Returns [`ServerError::DrainTimeout`] when
    /// connections had to be closed forcibly.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ServerError> {
        let inner = &self.inner;
        inner.stop.cancel();

        if !inner.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        match tokio::time::timeout(deadline, inner.done.cancelled()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                inner.force.cancel();
                Err(ServerError::DrainTimeout {
                    server: inner.name.clone(),
                    deadline,
                })
            }
        }
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("name", &self.inner.name)
            .field("address", &self.inner.address)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

/// Resolve and bind a listening socket.
async fn bind_listener(address: &BindAddress) -> io::Result<TcpListener> {
    let addr = tokio::net::lookup_host((address.resolvable_host(), address.port))
        .await?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address found for '{}'", address),
            )
        })?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    TcpListener::from_std(socket.into())
}
