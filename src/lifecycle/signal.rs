//! The process-wide cancellation signal.

use crate::lifecycle::TerminationKind;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Why the lifecycle signal was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// The operating environment asked the process to terminate.
    Termination(TerminationKind),
    /// A server's run loop returned, cleanly or not.
    ServerExited { server: String },
    /// Shutdown was requested programmatically.
    Requested,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Termination(kind) => write!(f, "caught {}", kind),
            CancelReason::ServerExited { server } => write!(f, "{} server exited", server),
            CancelReason::Requested => f.write_str("shutdown requested"),
        }
    }
}

/// Observable state of a [`LifecycleSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    Active,
    Cancelled,
}

/// Shared cancellation token coordinating shutdown across tasks.
///
/// Moves from `Active` to `Cancelled` exactly once. Only the first
/// [`LifecycleSignal::cancel`] call has any effect; its reason is kept.
#[derive(Clone, Default)]
pub struct LifecycleSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl LifecycleSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the signal. Returns `true` for the call that performed the
    /// transition and `false` for every later one.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        if self.reason.set(reason).is_err() {
            return false;
        }

        if let Some(reason) = self.reason.get() {
            info!(reason = %reason, "lifecycle signal cancelled");
        }
        self.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn state(&self) -> SignalState {
        if self.is_cancelled() {
            SignalState::Cancelled
        } else {
            SignalState::Active
        }
    }

    /// The reason given by the call that cancelled the signal.
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.get().cloned()
    }

    /// Resolves once the signal is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

impl fmt::Debug for LifecycleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleSignal")
            .field("state", &self.state())
            .field("reason", &self.reason.get())
            .finish()
    }
}
