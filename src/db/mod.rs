//! SQLite metadata repository
//!
//! Document records, JSON bodies, share grants and users live in SQLite.
//! Binary payloads live in the blob store and are referenced by
//! `documents.storage_key`.
//!
//! ## Tables
//!
//! - `users` - login and argon2 password hash
//! - `documents` - metadata incl. `version`, `storage_key`, `content_sha256`, `size_bytes`
//! - `doc_json` - optional JSON body, 1:1 with a document
//! - `doc_shares` - read grants keyed by `(doc_id, user_id)`
//!
//! Callers use the [`DocRepo`] and [`UserRepo`] capabilities so the store can
//! be swapped behind the same contract.

pub mod docs;
pub mod schema;
pub mod shares;
pub mod users;

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::{Document, ListFilter, NewDocument, User};

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Missing row, or a row the caller may not see
    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Internal(String),
}

impl DbError {
    pub(crate) fn internal(what: &str, err: impl std::fmt::Display) -> Self {
        Self::Internal(format!("{}: {}", what, err))
    }
}

/// Document metadata capability
#[async_trait]
pub trait DocRepo: Send + Sync {
    /// Insert a document (version 1) and its optional JSON body
    async fn create_doc(&self, doc: NewDocument, json: Option<&Value>) -> Result<Document, DbError>;

    /// Fetch a document; with `caller` set, invisible rows read as `NotFound`
    async fn doc_by_id(
        &self,
        id: &Uuid,
        caller: Option<&Uuid>,
    ) -> Result<(Document, Option<Value>), DbError>;

    /// Delete when `owner_id` owns the row; `NotFound` covers "not owner"
    async fn delete_doc(&self, id: &Uuid, owner_id: &Uuid) -> Result<(), DbError>;

    /// Documents visible to `caller`, filtered, sorted and paginated
    async fn list_docs(&self, caller: &Uuid, filter: &ListFilter) -> Result<Vec<Document>, DbError>;

    /// Bump `version` and `updated_at`, returning the new version
    async fn touch(&self, id: &Uuid) -> Result<i64, DbError>;

    /// Insert or update a grant; unknown logins affect zero rows
    async fn upsert_grant(&self, doc_id: &Uuid, login: &str, can_read: bool) -> Result<usize, DbError>;

    async fn remove_grant(&self, doc_id: &Uuid, login: &str) -> Result<usize, DbError>;

    /// Logins holding a read grant, sorted ascending
    async fn granted_logins(&self, doc_id: &Uuid) -> Result<Vec<String>, DbError>;

    /// User ids holding any grant on the document
    async fn grantee_ids(&self, doc_id: &Uuid) -> Result<Vec<Uuid>, DbError>;

    /// Number of documents referencing a storage key
    async fn storage_key_refs(&self, storage_key: &str) -> Result<i64, DbError>;
}

/// User account capability
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, login: &str, pass_hash: &str) -> Result<User, DbError>;
    async fn user_by_login(&self, login: &str) -> Result<User, DbError>;
    async fn user_by_id(&self, id: &Uuid) -> Result<User, DbError>;
    async fn ping(&self) -> Result<(), DbError>;
}

/// SQLite-backed repository
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database under `data_dir`
    pub fn open(data_dir: &Path) -> Result<Self, DbError> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| DbError::internal("Failed to create data dir", e))?;
        let db_path = data_dir.join("docvault.db");
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(&db_path)
            .map_err(|e| DbError::internal("Failed to open SQLite", e))?;

        // WAL for concurrent readers
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| DbError::internal("Failed to set PRAGMA", e))?;

        Self::init(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, DbError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| DbError::internal("Failed to open in-memory SQLite", e))?;

        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| DbError::internal("Failed to enable foreign keys", e))?;
        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DbError::internal("Lock poisoned", e))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DbError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| DbError::internal("Lock poisoned", e))?;
        f(&mut conn)
    }
}

#[async_trait]
impl DocRepo for Database {
    async fn create_doc(&self, doc: NewDocument, json: Option<&Value>) -> Result<Document, DbError> {
        self.with_conn_mut(|conn| docs::create_doc(conn, doc, json))
    }

    async fn doc_by_id(
        &self,
        id: &Uuid,
        caller: Option<&Uuid>,
    ) -> Result<(Document, Option<Value>), DbError> {
        self.with_conn(|conn| docs::doc_by_id(conn, id, caller))
    }

    async fn delete_doc(&self, id: &Uuid, owner_id: &Uuid) -> Result<(), DbError> {
        self.with_conn(|conn| docs::delete_doc(conn, id, owner_id))
    }

    async fn list_docs(&self, caller: &Uuid, filter: &ListFilter) -> Result<Vec<Document>, DbError> {
        self.with_conn(|conn| docs::list_docs(conn, caller, filter))
    }

    async fn touch(&self, id: &Uuid) -> Result<i64, DbError> {
        self.with_conn(|conn| docs::touch(conn, id))
    }

    async fn upsert_grant(&self, doc_id: &Uuid, login: &str, can_read: bool) -> Result<usize, DbError> {
        self.with_conn(|conn| shares::upsert_grant(conn, doc_id, login, can_read))
    }

    async fn remove_grant(&self, doc_id: &Uuid, login: &str) -> Result<usize, DbError> {
        self.with_conn(|conn| shares::remove_grant(conn, doc_id, login))
    }

    async fn granted_logins(&self, doc_id: &Uuid) -> Result<Vec<String>, DbError> {
        self.with_conn(|conn| shares::granted_logins(conn, doc_id))
    }

    async fn grantee_ids(&self, doc_id: &Uuid) -> Result<Vec<Uuid>, DbError> {
        self.with_conn(|conn| shares::grantee_ids(conn, doc_id))
    }

    async fn storage_key_refs(&self, storage_key: &str) -> Result<i64, DbError> {
        self.with_conn(|conn| docs::storage_key_refs(conn, storage_key))
    }
}

#[async_trait]
impl UserRepo for Database {
    async fn create_user(&self, login: &str, pass_hash: &str) -> Result<User, DbError> {
        self.with_conn(|conn| users::create_user(conn, login, pass_hash))
    }

    async fn user_by_login(&self, login: &str) -> Result<User, DbError> {
        self.with_conn(|conn| users::user_by_login(conn, login))
    }

    async fn user_by_id(&self, id: &Uuid) -> Result<User, DbError> {
        self.with_conn(|conn| users::user_by_id(conn, id))
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| DbError::internal("Ping failed", e))?;
            Ok(())
        })
    }
}

/// Column decoding helpers shared by the table modules
pub(crate) mod columns {
    use chrono::{DateTime, Utc};
    use rusqlite::types::Type;
    use rusqlite::Row;
    use uuid::Uuid;

    use crate::model::parse_timestamp;

    pub fn uuid(row: &Row, name: &str) -> rusqlite::Result<Uuid> {
        let raw: String = row.get(name)?;
        Uuid::parse_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
    }

    pub fn timestamp(row: &Row, name: &str) -> rusqlite::Result<DateTime<Utc>> {
        let raw: String = row.get(name)?;
        parse_timestamp(&raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                Type::Text,
                format!("bad timestamp in {}: {}", name, raw).into(),
            )
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_on_disk_and_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let db = Database::open(temp.path()).unwrap();
            db.create_user("aliceuser", "hash").await.unwrap();
        }
        let db = Database::open(temp.path()).unwrap();
        let user = db.user_by_login("aliceuser").await.unwrap();
        assert_eq!(user.login, "aliceuser");
        db.ping().await.unwrap();
    }
}
