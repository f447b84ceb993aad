//! HTTP handlers of the public API.

use crate::api::fizzbuzz::{FizzBuzzParams, compute_range};
use crate::server::{HttpResponse, json_response};
use bytes::Bytes;
use hyper::{Request, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Error code for requests carrying invalid data.
pub const ERR_INVALID_ARGUMENT: &str = "InvalidArgument";

/// Error code for failures on our side.
pub const ERR_INTERNAL_ERROR: &str = "InternalError";

/// Successful FizzBuzz payload.
#[derive(Debug, Serialize)]
pub struct FizzBuzzResponse {
    pub data: Vec<String>,
}

/// Error payload.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_code: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: &str, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.to_string(),
            message: message.into(),
        }
    }
}

/// Query strings that cannot be decoded.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid URL escape {0:?}")]
    InvalidEscape(String),

    #[error(transparent)]
    Decode(#[from] serde_urlencoded::de::Error),
}

/// Decode a query string into its key/value pairs, in order.
///
/// Every `%` must start a two-digit hex escape.
pub fn parse_query(query: &str) -> Result<Vec<(String, String)>, QueryError> {
    let bytes = query.as_bytes();
    for (i, _) in query.match_indices('%') {
        let escape = bytes.get(i + 1..i + 3).unwrap_or(&bytes[i + 1..]);
        if escape.len() != 2 || !escape.iter().all(u8::is_ascii_hexdigit) {
            let end = i + 1 + escape.len();
            return Err(QueryError::InvalidEscape(
                String::from_utf8_lossy(&bytes[i..end]).into_owned(),
            ));
        }
    }

    Ok(serde_urlencoded::from_str(query)?)
}

/// `GET /fizzbuzz?string1=..&string2=..&int1=..&int2=..&limit=..`
pub async fn fizzbuzz(req: Request<Bytes>) -> HttpResponse {
    let query = req.uri().query().unwrap_or_default();

    let pairs = match parse_query(query) {
        Ok(pairs) => pairs,
        Err(e) => {
            error!(error = %e, path = req.uri().path(), "failed to parse query string");
            return json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ErrorResponse::new(ERR_INTERNAL_ERROR, "something went wrong"),
            );
        }
    };

    let params = match params_from_query(&pairs) {
        Ok(params) => params,
        Err(message) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &ErrorResponse::new(ERR_INVALID_ARGUMENT, message),
            );
        }
    };

    match compute_range(&params) {
        Ok(data) => json_response(StatusCode::OK, &FizzBuzzResponse { data }),
        Err(e) => json_response(
            StatusCode::BAD_REQUEST,
            &ErrorResponse::new(ERR_INVALID_ARGUMENT, e.to_string()),
        ),
    }
}

/// First value of `key`, or the empty string.
fn first<'a>(pairs: &'a [(String, String)], key: &str) -> &'a str {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or_default()
}

fn integer(pairs: &[(String, String)], key: &str) -> Result<i64, String> {
    first(pairs, key)
        .parse()
        .map_err(|_| format!("query parameter {} must be an integer", key))
}

fn params_from_query(pairs: &[(String, String)]) -> Result<FizzBuzzParams, String> {
    Ok(FizzBuzzParams {
        int1: integer(pairs, "int1")?,
        int2: integer(pairs, "int2")?,
        limit: integer(pairs, "limit")?,
        string1: first(pairs, "string1").to_string(),
        string2: first(pairs, "string2").to_string(),
    })
}
