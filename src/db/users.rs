//! User account rows

use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use super::{columns, DbError};
use crate::model::{format_timestamp, User};

fn user_from_row(row: &Row) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: columns::uuid(row, "id")?,
        login: row.get("login")?,
        pass_hash: row.get("pass_hash")?,
        created_at: columns::timestamp(row, "created_at")?,
    })
}

/// Create a user; a taken login is a `Conflict`
pub fn create_user(conn: &Connection, login: &str, pass_hash: &str) -> Result<User, DbError> {
    let user = User {
        id: Uuid::new_v4(),
        login: login.to_string(),
        pass_hash: pass_hash.to_string(),
        created_at: Utc::now(),
    };

    conn.execute(
        "INSERT INTO users (id, login, pass_hash, created_at) VALUES (?, ?, ?, ?)",
        params![
            user.id.to_string(),
            user.login,
            user.pass_hash,
            format_timestamp(&user.created_at),
        ],
    )
    .map_err(|e| match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => DbError::Conflict(format!("login {} taken", login)),
        _ => DbError::internal("Insert user failed", e),
    })?;

    debug!(user_id = %user.id, login = %user.login, "Created user");
    Ok(user)
}

fn user_where(conn: &Connection, clause: &str, value: &str) -> Result<User, DbError> {
    let sql = format!(
        "SELECT id, login, pass_hash, created_at FROM users WHERE {} = ?",
        clause
    );
    conn.query_row(&sql, params![value], user_from_row)
        .optional()
        .map_err(|e| DbError::internal("User query failed", e))?
        .ok_or(DbError::NotFound)
}

pub fn user_by_login(conn: &Connection, login: &str) -> Result<User, DbError> {
    user_where(conn, "login", login)
}

pub fn user_by_id(conn: &Connection, id: &Uuid) -> Result<User, DbError> {
    user_where(conn, "id", &id.to_string())
}
