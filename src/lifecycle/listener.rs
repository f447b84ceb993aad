//! OS termination requests and the force-quit escalation.
//!
//! The first request cancels the lifecycle signal so servers drain. Once the
//! request count reaches the threshold the process exits on the spot,
//! whatever the drain is doing.

use crate::lifecycle::{CancelReason, LifecycleSignal};
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Termination requests needed to force an immediate exit.
pub const FORCE_QUIT_THRESHOLD: u32 = 2;

/// Exit status used for a forced quit.
pub const FORCE_QUIT_EXIT_CODE: i32 = 1;

/// Kind of termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationKind {
    Interrupt,
    Terminate,
}

impl fmt::Display for TerminationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationKind::Interrupt => f.write_str("SIGINT"),
            TerminationKind::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Number of termination requests received by the process.
#[derive(Debug, Default)]
pub struct TerminationCounter(AtomicU32);

impl TerminationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request and return the new total.
    pub fn record(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A stream of termination requests.
pub trait TerminationSource: Send {
    /// Wait for the next request. `None` means no more can arrive.
    fn next_request(&mut self) -> impl Future<Output = Option<TerminationKind>> + Send;
}

/// SIGINT and SIGTERM on unix, Ctrl-C elsewhere.
pub struct OsSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl OsSignals {
    /// Register the signal handlers. Must be called inside a tokio runtime.
    pub fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }
}

impl TerminationSource for OsSignals {
    async fn next_request(&mut self) -> Option<TerminationKind> {
        #[cfg(unix)]
        {
            tokio::select! {
                received = self.interrupt.recv() => received.map(|()| TerminationKind::Interrupt),
                received = self.terminate.recv() => received.map(|()| TerminationKind::Terminate),
            }
        }

        #[cfg(not(unix))]
        {
            match tokio::signal::ctrl_c().await {
                Ok(()) => Some(TerminationKind::Interrupt),
                Err(e) => {
                    error!(error = %e, "failed to listen for Ctrl-C");
                    None
                }
            }
        }
    }
}

impl TerminationSource for mpsc::Receiver<TerminationKind> {
    async fn next_request(&mut self) -> Option<TerminationKind> {
        self.recv().await
    }
}

/// Called with the exit status when the force-quit threshold is reached.
pub type ExitHook = Box<dyn Fn(i32) + Send + Sync>;

/// Bridges termination requests into the lifecycle signal.
pub struct SignalListener<S> {
    signal: LifecycleSignal,
    counter: Arc<TerminationCounter>,
    source: S,
    threshold: u32,
    exit: ExitHook,
}

impl<S: TerminationSource> SignalListener<S> {
    pub fn new(signal: LifecycleSignal, counter: Arc<TerminationCounter>, source: S) -> Self {
        Self {
            signal,
            counter,
            source,
            threshold: FORCE_QUIT_THRESHOLD,
            exit: Box::new(|code| std::process::exit(code)),
        }
    }

    /// Requests needed before forcing an exit.
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    /// Replace `std::process::exit` as the force-quit action.
    pub fn with_exit_hook(mut self, exit: impl Fn(i32) + Send + Sync + 'static) -> Self {
        self.exit = Box::new(exit);
        self
    }

    /// Watch for termination requests until the process exits.
    ///
    /// Returns only when the source is exhausted or the exit hook returns.
    pub async fn run(self) {
        let SignalListener {
            signal,
            counter,
            mut source,
            threshold,
            exit,
        } = self;

        // Cancellation from elsewhere is reported once, then only OS requests matter.
        let mut seen_cancel = signal.is_cancelled();

        loop {
            tokio::select! {
                request = source.next_request() => {
                    let Some(kind) = request else {
                        debug!("termination source closed");
                        return;
                    };

                    let count = counter.record();
                    info!(signal = %kind, count, "caught termination signal");
                    signal.cancel(CancelReason::Termination(kind));
                    seen_cancel = true;

                    if count >= threshold {
                        error!(count, "force quit!");
                        exit(FORCE_QUIT_EXIT_CODE);
                        return;
                    }
                }

                _ = signal.cancelled(), if !seen_cancel => {
                    seen_cancel = true;
                    info!(
                        reason = ?signal.reason(),
                        "lifecycle cancelled before termination signal"
                    );
                }
            }
        }
    }
}
