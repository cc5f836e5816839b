//! Error taxonomy surfaced to HTTP callers
//!
//! Lower layers (storage, cache, db, auth) keep their own error enums; the
//! delivery layer decides which of these a backend failure becomes. The
//! client only ever sees the fixed `text` of the envelope, never the detail.

use hyper::StatusCode;

use super::envelope::Envelope;

/// Main error type for docvault operations
#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    /// Covers both true absence and documents hidden by ACL
    #[error("Not found")]
    NotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl DocError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing text for the error envelope
    pub fn public_text(&self) -> &'static str {
        match self {
            Self::BadInput(_) => "bad params",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not found",
            Self::MethodNotAllowed => "method not allowed",
            Self::Unexpected(_) => "unexpected",
        }
    }

    /// Convert to status code and serialized envelope body
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let envelope: Envelope<()> = Envelope::fail(status.as_u16(), self.public_text());
        let body = serde_json::to_string(&envelope)
            .unwrap_or_else(|_| r#"{"error":{"code":500,"text":"unexpected"}}"#.to_string());
        (status, body)
    }
}

impl From<std::io::Error> for DocError {
    fn from(err: std::io::Error) -> Self {
        Self::Unexpected(err.to_string())
    }
}

impl From<serde_json::Error> for DocError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unexpected(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for DocError {
    fn from(err: hyper::Error) -> Self {
        Self::Unexpected(format!("HTTP error: {}", err))
    }
}

/// Result type alias for docvault operations
pub type Result<T> = std::result::Result<T, DocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(DocError::BadInput("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(DocError::Unauthorized("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(DocError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(DocError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(DocError::MethodNotAllowed.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            DocError::Unexpected("disk".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_body_hides_detail() {
        let (status, body) = DocError::Unexpected("sqlite: disk I/O error".into())
            .into_status_code_and_body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, r#"{"error":{"code":500,"text":"unexpected"}}"#);
        assert!(!body.contains("sqlite"));
    }
}
