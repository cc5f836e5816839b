//! Configuration for docvault
//!
//! CLI arguments with environment variable fallbacks using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::auth::jwt::MIN_SECRET_LEN;

/// Blob backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// Directory tree under `<data_dir>/blobs`
    Fs,
    /// Process memory; contents are lost on restart
    Memory,
}

/// docvault - document store with cache-aware HTTP delivery
#[derive(Parser, Debug, Clone)]
#[command(name = "docvault")]
#[command(about = "Document store with content-addressed blobs and ACL-aware delivery")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Directory for the SQLite database and filesystem blobs
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Blob backend
    #[arg(long, env = "STORAGE", value_enum, default_value = "fs")]
    pub storage: StorageKind,

    /// JWT signing secret (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Token lifetime in seconds
    #[arg(long, env = "TOKEN_TTL_SECS", default_value = "86400")]
    pub token_ttl_secs: u64,

    /// Issuer claim written into and required from tokens
    #[arg(long, env = "JWT_ISSUER", default_value = "docvault")]
    pub issuer: String,

    /// Token that authorizes `POST /api/register`; registration is closed without it
    #[arg(long, env = "ADMIN_TOKEN")]
    pub admin_token: Option<String>,

    /// TTL for cached document metadata and JSON bodies
    #[arg(long, env = "DOC_TTL_SECS", default_value = "300")]
    pub doc_ttl_secs: u64,

    /// TTL for cached list pages
    #[arg(long, env = "LIST_TTL_SECS", default_value = "60")]
    pub list_ttl_secs: u64,

    /// Maximum number of cache entries
    #[arg(long, env = "CACHE_MAX_ENTRIES", default_value = "10000")]
    pub cache_max_entries: usize,

    /// Maximum multipart upload size in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "1073741824")]
    pub max_upload_bytes: u64,

    /// Enable development mode (fixed JWT secret allowed)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match self.jwt_secret.as_deref() {
                None | Some("") => {
                    return Err("JWT_SECRET is required in production mode".to_string());
                }
                Some(secret) if secret.len() < MIN_SECRET_LEN => {
                    return Err(format!(
                        "JWT_SECRET must be at least {} characters",
                        MIN_SECRET_LEN
                    ));
                }
                _ => {}
            }
        }

        if self.token_ttl_secs == 0 {
            return Err("TOKEN_TTL_SECS must be greater than 0".to_string());
        }

        if self.max_upload_bytes == 0 {
            return Err("MAX_UPLOAD_BYTES must be greater than 0".to_string());
        }

        if self.cache_max_entries == 0 {
            return Err("CACHE_MAX_ENTRIES must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["docvault"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--dev-mode"]);
        assert_eq!(args.listen, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(args.storage, StorageKind::Fs);
        assert_eq!(args.max_upload_bytes, 1024 * 1024 * 1024);
        assert_eq!(args.blob_dir(), PathBuf::from("./data/blobs"));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_production_requires_strong_secret() {
        let mut args = parse(&["--storage", "memory"]);
        args.dev_mode = false;
        args.jwt_secret = None;
        assert!(args.validate().is_err());

        args.jwt_secret = Some("short".into());
        assert!(args.validate().is_err());

        args.jwt_secret = Some("x".repeat(MIN_SECRET_LEN));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut args = parse(&["--dev-mode"]);
        args.max_upload_bytes = 0;
        assert!(args.validate().is_err());
    }
}
