//! HTTP routes for docvault
//!
//! Handlers take the request id explicitly and return fully built
//! responses; [`crate::server`] only dispatches and stamps `X-Request-Id`.

pub mod auth;
pub mod docs;
pub mod health;
pub mod upload;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{header, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{error, warn};

pub use auth::{handle_login, handle_logout, handle_register};
pub use docs::{
    handle_create, handle_delete, handle_fetch, handle_grant, handle_list, handle_revoke,
    handle_touch,
};
pub use health::{health_check, readiness_check};

use crate::types::DocError;

/// Response body type; file bodies stream, so the body is not `Sync`
pub type BoxBody = http_body_util::combinators::UnsyncBoxBody<Bytes, std::io::Error>;

/// Maximum size of a JSON command body
const MAX_JSON_BODY: usize = 10240;

pub fn full(bytes: Bytes) -> BoxBody {
    Full::new(bytes)
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn empty_body() -> BoxBody {
    full(Bytes::new())
}

/// 200 with an already serialized envelope
pub fn json_response(status: StatusCode, body: Bytes) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len())
        .body(full(body))
        .unwrap()
}

/// Error envelope; detail is logged, never sent
pub fn error_response(err: DocError, request_id: &str) -> Response<BoxBody> {
    match &err {
        DocError::Unexpected(detail) => error!(request_id, error = %detail, "Request failed"),
        other => warn!(request_id, error = %other, "Request rejected"),
    }
    let (status, body) = err.into_status_code_and_body();
    json_response(status, Bytes::from(body))
}

/// Collect a small JSON body
pub async fn parse_json_body<B, T>(body: B) -> Result<T, DocError>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
    T: DeserializeOwned,
{
    let bytes = body
        .collect()
        .await
        .map_err(|e| DocError::BadInput(format!("Failed to read body: {}", e)))?
        .to_bytes();

    if bytes.len() > MAX_JSON_BODY {
        return Err(DocError::BadInput("Request body too large".into()));
    }

    serde_json::from_slice(&bytes).map_err(|e| DocError::BadInput(format!("Invalid JSON: {}", e)))
}
