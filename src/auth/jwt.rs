//! JWT token handling
//!
//! Tokens are HS256-signed and carry the user id, login and a unique `jti`
//! so an individual token can be revoked before it expires.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use super::AuthError;

/// Minimum accepted secret length outside dev mode
pub const MIN_SECRET_LEN: usize = 32;

/// Payload stored in a token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub login: String,
    /// Token id, the revocation handle
    pub jti: String,
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidToken("Invalid subject".into()))
    }
}

/// Token issuer and validator
#[derive(Clone)]
pub struct TokenManager {
    secret: String,
    issuer: String,
    expiry_seconds: u64,
}

impl TokenManager {
    /// Create a token manager
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, issuer: String, expiry_seconds: u64) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::Config("JWT_SECRET is required in production mode".into()));
        }

        if secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::Config(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }

        Ok(Self {
            secret,
            issuer,
            expiry_seconds,
        })
    }

    /// Token manager for dev mode (fixed secret)
    pub fn new_dev(issuer: String, expiry_seconds: u64) -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            issuer,
            expiry_seconds,
        }
    }

    /// Issue a token for an authenticated user
    pub fn issue(&self, user_id: &Uuid, login: &str) -> Result<(String, Claims), AuthError> {
        let now = now_secs()?;

        let claims = Claims {
            sub: user_id.to_string(),
            login: login.to_string(),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.expiry_seconds,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(format!("Failed to generate token: {}", e)))?;

        Ok((token, claims))
    }

    /// Verify signature, expiry and issuer, and decode the claims
    pub fn parse(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[self.issuer.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            let msg = match err.kind() {
                ErrorKind::ExpiredSignature => "Token expired",
                ErrorKind::InvalidToken => "Invalid token",
                ErrorKind::InvalidSignature => "Invalid signature",
                ErrorKind::InvalidIssuer => "Invalid issuer",
                _ => "Token validation failed",
            };
            AuthError::InvalidToken(msg.into())
        })
    }
}

pub(crate) fn now_secs() -> Result<u64, AuthError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AuthError::Internal(format!("System time error: {}", e)))
}

/// Extract the token from an Authorization header value
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    auth_header.and_then(|h| h.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TokenManager {
        TokenManager::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            "docvault".into(),
            3600,
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_parse() {
        let tokens = manager();
        let user = Uuid::new_v4();
        let (token, issued) = tokens.issue(&user, "aliceuser").unwrap();

        let claims = tokens.parse(&token).unwrap();
        assert_eq!(claims, issued);
        assert_eq!(claims.user_id().unwrap(), user);
        assert_eq!(claims.login, "aliceuser");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_each_token_has_own_jti() {
        let tokens = manager();
        let user = Uuid::new_v4();
        let (_, a) = tokens.issue(&user, "aliceuser").unwrap();
        let (_, b) = tokens.issue(&user, "aliceuser").unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_reject_foreign_secret_and_issuer() {
        let tokens = manager();
        let (token, _) = TokenManager::new_dev("docvault".into(), 60)
            .issue(&Uuid::new_v4(), "aliceuser")
            .unwrap();
        assert!(matches!(tokens.parse(&token), Err(AuthError::InvalidToken(_))));

        let other_issuer = TokenManager::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            "someone-else".into(),
            3600,
        )
        .unwrap();
        let (token, _) = other_issuer.issue(&Uuid::new_v4(), "aliceuser").unwrap();
        assert!(tokens.parse(&token).is_err());
        assert!(tokens.parse("garbage").is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(TokenManager::new(String::new(), "docvault".into(), 60).is_err());
        assert!(TokenManager::new("short".into(), "docvault".into(), 60).is_err());
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token_from_header(Some("Bearer abc.def")), Some("abc.def"));
        assert_eq!(extract_token_from_header(Some("Basic abc")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(None), None);
    }
}
