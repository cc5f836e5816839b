//! HTTP server and request dispatch

pub mod http;

pub use http::{handle_request, run, AppState, REQUEST_ID_HEADER};
