//! Process lifecycle: startup, failure propagation and graceful shutdown.
//!
//! # Data Flow
//! ```text
//! SignalListener ──┐
//!                  ├─▶ LifecycleSignal (cancelled once) ─▶ Coordinator
//! server tasks ────┘                                        │
//!                                                           ▼
//!                              shutdown(deadline) on every ServerHandle
//!                                                           │
//!                                                           ▼
//!                                    join all server tasks ─▶ exit status
//! ```
//!
//! A second termination request makes the listener exit the process
//! immediately, bypassing the drain.

mod coordinator;
mod listener;
mod signal;

pub use coordinator::{Coordinator, LifecycleError, ServerFailure};
pub use listener::{
    ExitHook, FORCE_QUIT_EXIT_CODE, FORCE_QUIT_THRESHOLD, OsSignals, SignalListener,
    TerminationCounter, TerminationKind, TerminationSource,
};
pub use signal::{CancelReason, LifecycleSignal, SignalState};
