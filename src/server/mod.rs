//! Server handles and the request handling they run.
//!
//! A [`ServerHandle`] owns one listening address and a handler tree. Both the
//! public API and the admin endpoints are served through the same type.

mod connection;
mod handle;
mod handler;

pub use handle::{ServerError, ServerHandle};
pub use handler::{Handler, HandlerFuture, HttpResponse, Router, json_response, text_response};
