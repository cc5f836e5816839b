//! Account routes: register, login, logout

use hyper::{HeaderMap, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::{error_response, json_response, parse_json_body, BoxBody};
use crate::auth::token_from_request;
use crate::server::AppState;
use crate::types::{DocError, Envelope};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Admin token
    pub token: String,
    pub login: String,
    pub pswd: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub pswd: String,
}

/// POST /api/register
pub async fn handle_register<B>(state: Arc<AppState>, body: B, request_id: &str) -> Response<BoxBody>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    let result = async {
        let req: RegisterRequest = parse_json_body(body).await?;
        let user = state.auth.register(&req.token, &req.login, &req.pswd).await?;
        info!(request_id, user_id = %user.id, "Registration complete");
        Ok::<_, DocError>(Envelope::response(json!({ "login": user.login })).to_bytes()?)
    }
    .await;

    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => error_response(e, request_id),
    }
}

/// POST /api/auth
pub async fn handle_login<B>(state: Arc<AppState>, body: B, request_id: &str) -> Response<BoxBody>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    let result = async {
        let req: LoginRequest = parse_json_body(body).await?;
        let token = state.auth.login(&req.login, &req.pswd).await?;
        info!(request_id, login = %req.login, "Login");
        Ok::<_, DocError>(Envelope::response(json!({ "token": token })).to_bytes()?)
    }
    .await;

    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => error_response(e, request_id),
    }
}

/// DELETE /api/auth/{token}; the path segment wins over header and query
pub async fn handle_logout(
    state: Arc<AppState>,
    path_token: &str,
    headers: &HeaderMap,
    query: Option<&str>,
    request_id: &str,
) -> Response<BoxBody> {
    let token = match urlencoding::decode(path_token) {
        Ok(t) if !t.is_empty() => Some(t.into_owned()),
        _ => token_from_request(headers, query),
    };

    let result = async {
        let token = token.ok_or_else(|| DocError::Unauthorized("missing token".into()))?;
        let jti = state.auth.logout(&token).await?;
        Ok::<_, DocError>(Envelope::response(json!({ "revoked": jti })).to_bytes()?)
    }
    .await;

    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => error_response(e, request_id),
    }
}
