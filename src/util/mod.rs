//! Utility functions and helpers.

mod logging;
mod request_id;

pub use logging::init_logging;
pub use request_id::{RequestId, generate_request_id};
