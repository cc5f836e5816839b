//! Shared error and response envelope types

pub mod envelope;
pub mod error;

pub use envelope::{Envelope, EnvelopeError};
pub use error::{DocError, Result};
