//! Health check endpoints
//!
//! - `/v1/healthz` - liveness, 200 whenever the process serves requests
//! - `/v1/readyz` - readiness, 200 only when the database, cache and blob
//!   backend all answer

use hyper::{Response, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::{error_response, json_response, BoxBody};
use crate::cache::Cache;
use crate::db::UserRepo;
use crate::server::AppState;
use crate::types::{DocError, Envelope};

pub fn health_check() -> Response<BoxBody> {
    match Envelope::data(json!("ok")).to_bytes() {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => error_response(e.into(), "healthz"),
    }
}

pub async fn readiness_check(state: Arc<AppState>, request_id: &str) -> Response<BoxBody> {
    let result = async {
        state
            .db
            .ping()
            .await
            .map_err(|e| DocError::Unexpected(format!("database: {}", e)))?;
        state
            .cache
            .ping()
            .await
            .map_err(|e| DocError::Unexpected(format!("cache: {}", e)))?;
        state
            .store
            .ping()
            .await
            .map_err(|e| DocError::Unexpected(format!("storage: {}", e)))?;
        Ok::<_, DocError>(Envelope::data(json!("ready")).to_bytes()?)
    }
    .await;

    match result {
        Ok(body) => {
            debug!(request_id, "Ready");
            json_response(StatusCode::OK, body)
        }
        Err(e) => error_response(e, request_id),
    }
}
