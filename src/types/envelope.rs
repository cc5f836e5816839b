//! JSON response envelope
//!
//! Every JSON body is one of:
//! - `{"error": {"code": 404, "text": "not found"}}`
//! - `{"response": ...}` for command results
//! - `{"data": ...}` for fetched content

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvelopeError {
    pub code: u16,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn response(value: T) -> Self {
        Self {
            error: None,
            response: Some(value),
            data: None,
        }
    }

    pub fn data(value: T) -> Self {
        Self {
            error: None,
            response: None,
            data: Some(value),
        }
    }

    pub fn fail(code: u16, text: impl Into<String>) -> Self {
        Self {
            error: Some(EnvelopeError {
                code,
                text: text.into(),
            }),
            response: None,
            data: None,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serialize to the exact bytes written to the wire (and cached)
    pub fn to_bytes(&self) -> Result<bytes::Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(bytes::Bytes::from)
    }
}
