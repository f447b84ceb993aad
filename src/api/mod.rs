//! Public FizzBuzz API.

mod fizzbuzz;
mod handlers;

pub use fizzbuzz::{FizzBuzzError, FizzBuzzParams, MAX_VALUE, MIN_VALUE, compute_range};
pub use handlers::{
    ERR_INTERNAL_ERROR, ERR_INVALID_ARGUMENT, ErrorResponse, FizzBuzzResponse, QueryError,
    fizzbuzz, parse_query,
};

use crate::server::Router;

/// Routes served on the API address, before middleware.
pub fn api_router() -> Router {
    Router::new().get("/fizzbuzz", fizzbuzz)
}
