//! Authentication for docvault
//!
//! Resolves a caller [`Identity`] from a bearer token and owns the account
//! commands (register, login, logout):
//! - JWT tokens (HS256) with a per-token `jti`
//! - argon2id password hashes
//! - revocation markers kept in the cache until the token would expire

pub mod jwt;
pub mod password;
pub mod revocation;

use std::sync::Arc;

use hyper::header::AUTHORIZATION;
use hyper::HeaderMap;
use tracing::{debug, info, warn};

pub use jwt::{extract_token_from_header, Claims, TokenManager};
pub use revocation::RevocationList;

use crate::db::{DbError, UserRepo};
use crate::model::{Identity, User};
use crate::types::DocError;

/// Error type for authentication
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token revoked")]
    Revoked,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Auth error: {0}")]
    Internal(String),
}

impl From<AuthError> for DocError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::InvalidToken(_) | AuthError::Revoked => {
                DocError::Unauthorized(err.to_string())
            }
            AuthError::InvalidCredentials(msg) => DocError::BadInput(msg),
            AuthError::Config(msg) | AuthError::Internal(msg) => DocError::Unexpected(msg),
        }
    }
}

/// Find the token in `Authorization: Bearer` or the `token` query parameter
pub fn token_from_request(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if let Some(token) = extract_token_from_header(header) {
        return Some(token.to_string());
    }

    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query?).ok()?;
    pairs
        .into_iter()
        .find(|(k, v)| k == "token" && !v.is_empty())
        .map(|(_, v)| v)
}

/// Identity resolution and account commands
pub struct Authenticator {
    tokens: TokenManager,
    revocations: RevocationList,
    users: Arc<dyn UserRepo>,
    admin_token: Option<String>,
}

impl Authenticator {
    pub fn new(
        tokens: TokenManager,
        revocations: RevocationList,
        users: Arc<dyn UserRepo>,
        admin_token: Option<String>,
    ) -> Self {
        Self {
            tokens,
            revocations,
            users,
            admin_token: admin_token.filter(|t| !t.is_empty()),
        }
    }

    /// Resolve the caller of a request
    pub async fn resolve(&self, headers: &HeaderMap, query: Option<&str>) -> Result<Identity, DocError> {
        let token = token_from_request(headers, query).ok_or(AuthError::MissingToken)?;
        let claims = self.verify(&token).await?;
        Ok(identity_from_claims(&claims)?)
    }

    /// Validate a token and check it has not been revoked
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.tokens.parse(token)?;
        if self.revocations.is_revoked(&claims.jti).await {
            return Err(AuthError::Revoked);
        }
        Ok(claims)
    }

    /// Create an account; requires the configured admin token
    pub async fn register(&self, admin_token: &str, login: &str, password: &str) -> Result<User, DocError> {
        let expected = self.admin_token.as_deref().ok_or(DocError::Forbidden)?;
        if admin_token != expected {
            warn!(login, "Registration with wrong admin token");
            return Err(DocError::Unauthorized("admin token mismatch".into()));
        }

        password::validate_login(login)?;
        password::validate_password(password)?;
        let hash = password::hash_password(password)?;

        let user = self.users.create_user(login, &hash).await.map_err(|e| match e {
            DbError::Conflict(msg) => DocError::BadInput(msg),
            other => DocError::Unexpected(other.to_string()),
        })?;

        info!(user_id = %user.id, login = %user.login, "Registered user");
        Ok(user)
    }

    /// Exchange login and password for a token
    pub async fn login(&self, login: &str, password: &str) -> Result<String, DocError> {
        let user = match self.users.user_by_login(login).await {
            Ok(user) => user,
            Err(DbError::NotFound) => {
                return Err(DocError::Unauthorized("unknown login".into()));
            }
            Err(e) => return Err(DocError::Unexpected(e.to_string())),
        };

        if !password::verify_password(password, &user.pass_hash)? {
            debug!(login, "Password mismatch");
            return Err(DocError::Unauthorized("wrong password".into()));
        }

        let (token, claims) = self.tokens.issue(&user.id, &user.login)?;
        info!(user_id = %user.id, jti = %claims.jti, "Issued token");
        Ok(token)
    }

    /// Revoke a token, returning its `jti`
    pub async fn logout(&self, token: &str) -> Result<String, DocError> {
        let claims = self.verify(token).await?;
        self.revocations
            .revoke(&claims.jti, claims.exp)
            .await
            .map_err(|e| DocError::Unexpected(e.to_string()))?;
        info!(jti = %claims.jti, login = %claims.login, "Token revoked");
        Ok(claims.jti)
    }
}

fn identity_from_claims(claims: &Claims) -> Result<Identity, AuthError> {
    Ok(Identity {
        user_id: claims.user_id()?,
        login: claims.login.clone(),
        jti: claims.jti.clone(),
    })
}
