//! Request ID generation for request tracing.
//!
//! Generates unique identifiers for each request so that a request can be
//! followed through logs.

use hyper::header::HeaderValue;
use uuid::Uuid;

/// Longest caller-supplied ID that is kept as-is.
const MAX_FORWARDED_LEN: usize = 128;

/// Generate a new UUID-based request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Request ID wrapper that can be included in tracing spans.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Create a new random request ID.
    pub fn new() -> Self {
        Self(generate_request_id())
    }

    /// Reuse the caller's ID when it is short printable ASCII, otherwise
    /// generate a fresh one.
    pub fn from_header(value: Option<&HeaderValue>) -> Self {
        value
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty() && s.len() <= MAX_FORWARDED_LEN)
            .map(|s| Self(s.to_string()))
            .unwrap_or_default()
    }

    /// Get the request ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
