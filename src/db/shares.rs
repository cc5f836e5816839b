//! Per-user read grants

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::debug;
use uuid::Uuid;

use super::{columns, DbError};
use crate::model::format_timestamp;

/// Grant or update access for `login`; returns 0 when the login is unknown
pub fn upsert_grant(conn: &Connection, doc_id: &Uuid, login: &str, can_read: bool) -> Result<usize, DbError> {
    let changes = conn
        .execute(
            r#"
            INSERT INTO doc_shares (doc_id, user_id, can_read, created_at)
            SELECT ?, u.id, ?, ? FROM users u WHERE u.login = ?
            ON CONFLICT (doc_id, user_id) DO UPDATE SET can_read = excluded.can_read
            "#,
            params![
                doc_id.to_string(),
                can_read,
                format_timestamp(&Utc::now()),
                login
            ],
        )
        .map_err(|e| DbError::internal("Upsert grant failed", e))?;

    debug!(doc_id = %doc_id, login, can_read, changes, "Upserted grant");
    Ok(changes)
}

pub fn remove_grant(conn: &Connection, doc_id: &Uuid, login: &str) -> Result<usize, DbError> {
    conn.execute(
        "DELETE FROM doc_shares WHERE doc_id = ? AND user_id IN (SELECT id FROM users WHERE login = ?)",
        params![doc_id.to_string(), login],
    )
    .map_err(|e| DbError::internal("Remove grant failed", e))
}

/// Logins with `can_read`, ascending
pub fn granted_logins(conn: &Connection, doc_id: &Uuid) -> Result<Vec<String>, DbError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT u.login FROM doc_shares s
            INNER JOIN users u ON u.id = s.user_id
            WHERE s.doc_id = ? AND s.can_read = 1
            ORDER BY u.login ASC
            "#,
        )
        .map_err(|e| DbError::internal("Prepare failed", e))?;

    let logins = stmt
        .query_map(params![doc_id.to_string()], |row| row.get(0))
        .map_err(|e| DbError::internal("Query failed", e))?
        .collect::<Result<Vec<String>, _>>()
        .map_err(|e| DbError::internal("Row parse failed", e))?;
    Ok(logins)
}

/// Every user holding a grant row, readable or not
pub fn grantee_ids(conn: &Connection, doc_id: &Uuid) -> Result<Vec<Uuid>, DbError> {
    let mut stmt = conn
        .prepare("SELECT user_id FROM doc_shares WHERE doc_id = ?")
        .map_err(|e| DbError::internal("Prepare failed", e))?;

    let ids = stmt
        .query_map(params![doc_id.to_string()], |row| columns::uuid(row, "user_id"))
        .map_err(|e| DbError::internal("Query failed", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DbError::internal("Row parse failed", e))?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::docs::create_doc;
    use crate::db::test_support::db_with_users;
    use crate::model::NewDocument;

    #[test]
    fn test_grant_lifecycle() {
        let (db, users) = db_with_users(&["owner0001", "zedreader", "amyreader"]);
        let doc = db
            .with_conn_mut(|conn| {
                create_doc(
                    conn,
                    NewDocument {
                        owner_id: users[0].id,
                        name: "shared".into(),
                        mime: "text/plain".into(),
                        ..Default::default()
                    },
                    None,
                )
            })
            .unwrap();

        db.with_conn(|conn| upsert_grant(conn, &doc.id, "zedreader", true)).unwrap();
        db.with_conn(|conn| upsert_grant(conn, &doc.id, "amyreader", true)).unwrap();
        assert_eq!(
            db.with_conn(|conn| granted_logins(conn, &doc.id)).unwrap(),
            vec!["amyreader", "zedreader"]
        );

        // Re-grant updates in place
        db.with_conn(|conn| upsert_grant(conn, &doc.id, "zedreader", false)).unwrap();
        assert_eq!(
            db.with_conn(|conn| granted_logins(conn, &doc.id)).unwrap(),
            vec!["amyreader"]
        );
        assert_eq!(db.with_conn(|conn| grantee_ids(conn, &doc.id)).unwrap().len(), 2);

        assert_eq!(db.with_conn(|conn| remove_grant(conn, &doc.id, "amyreader")).unwrap(), 1);
        assert!(db.with_conn(|conn| granted_logins(conn, &doc.id)).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_login_is_noop() {
        let (db, users) = db_with_users(&["owner0001"]);
        let doc = db
            .with_conn_mut(|conn| {
                create_doc(
                    conn,
                    NewDocument {
                        owner_id: users[0].id,
                        name: "x".into(),
                        mime: "text/plain".into(),
                        ..Default::default()
                    },
                    None,
                )
            })
            .unwrap();

        assert_eq!(db.with_conn(|conn| upsert_grant(conn, &doc.id, "ghostuser", true)).unwrap(), 0);
        assert_eq!(db.with_conn(|conn| remove_grant(conn, &doc.id, "ghostuser")).unwrap(), 0);
    }
}
