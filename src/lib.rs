//! docvault - document store with cache-aware HTTP delivery
//!
//! Stores user-owned documents (binary content and/or a JSON body) with
//! owner / public / per-user read grant access control, and serves them over
//! HTTP with ETag, conditional GET and byte-range semantics.
//!
//! ## Components
//!
//! - **Storage**: content-addressed blob store (`sha256/<hex>` keys) over a
//!   pluggable object backend (filesystem or in-memory)
//! - **Cache**: KV + counters with TTL, used cache-aside for metadata, JSON
//!   bodies and list pages
//! - **Db**: SQLite metadata repository with ACL-filtered lookups and listing
//! - **Delivery**: orchestration of fetch / list / create / delete
//! - **Auth**: JWT identity resolution, password hashing, token revocation

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod delivery;
pub mod model;
pub mod routes;
pub mod server;
pub mod storage;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{DocError, Result};
