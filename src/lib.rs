//! fizzgate - a FizzBuzz HTTP API with a supervised process lifecycle
//!
//! This crate provides:
//! - A public FizzBuzz endpoint behind logging, metrics and API-key middleware
//! - An admin server exposing health and Prometheus metrics
//! - Graceful shutdown of both servers on SIGINT/SIGTERM, with a forced
//!   exit on the second signal

pub mod admin;
pub mod api;
pub mod config;
pub mod lifecycle;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod state;
pub mod util;

pub use config::Settings;
pub use state::AppState;
