//! Document CRUD operations

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{columns, DbError};
use crate::model::{format_timestamp, Document, ListFilter, NewDocument};

const DOC_COLUMNS: &str = "d.id, d.owner_id, d.name, d.mime, d.file, d.public, d.created_at, \
     d.updated_at, d.size_bytes, d.content_sha256, d.version, d.storage_key";

/// Visibility predicate; binds the caller id twice
const VISIBLE_TO_CALLER: &str = "(d.owner_id = ? OR d.public = 1 OR EXISTS (\
     SELECT 1 FROM doc_shares s WHERE s.doc_id = d.id AND s.user_id = ? AND s.can_read = 1))";

fn doc_from_row(row: &Row) -> Result<Document, rusqlite::Error> {
    Ok(Document {
        id: columns::uuid(row, "id")?,
        owner_id: columns::uuid(row, "owner_id")?,
        name: row.get("name")?,
        mime: row.get("mime")?,
        file: row.get("file")?,
        public: row.get("public")?,
        created_at: columns::timestamp(row, "created_at")?,
        updated_at: columns::timestamp(row, "updated_at")?,
        size_bytes: row.get("size_bytes")?,
        sha256: row.get("content_sha256")?,
        version: row.get("version")?,
        storage_key: row.get("storage_key")?,
    })
}

/// Insert a document row and its optional JSON body in one transaction
pub fn create_doc(conn: &mut Connection, input: NewDocument, json: Option<&Value>) -> Result<Document, DbError> {
    let now = Utc::now();
    let doc = Document {
        id: Uuid::new_v4(),
        owner_id: input.owner_id,
        file: input.has_file(),
        name: input.name,
        mime: input.mime,
        public: input.public,
        created_at: now,
        updated_at: now,
        size_bytes: input.size_bytes,
        sha256: input.sha256,
        version: 1,
        storage_key: input.storage_key,
    };

    let tx = conn
        .transaction()
        .map_err(|e| DbError::internal("Transaction failed", e))?;

    tx.execute(
        r#"
        INSERT INTO documents (
            id, owner_id, name, mime, file, public, created_at, updated_at,
            size_bytes, content_sha256, version, storage_key
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            doc.id.to_string(),
            doc.owner_id.to_string(),
            doc.name,
            doc.mime,
            doc.file,
            doc.public,
            format_timestamp(&doc.created_at),
            format_timestamp(&doc.updated_at),
            doc.size_bytes,
            doc.sha256,
            doc.version,
            doc.storage_key,
        ],
    )
    .map_err(|e| DbError::internal("Insert document failed", e))?;

    if let Some(body) = json {
        tx.execute(
            "INSERT INTO doc_json (doc_id, body) VALUES (?, ?)",
            params![doc.id.to_string(), body],
        )
        .map_err(|e| DbError::internal("Insert JSON body failed", e))?;
    }

    tx.commit()
        .map_err(|e| DbError::internal("Commit failed", e))?;

    debug!(doc_id = %doc.id, owner_id = %doc.owner_id, file = doc.file, "Created document");
    Ok(doc)
}

/// Fetch a document and its JSON body, applying ACL when `caller` is set
pub fn doc_by_id(
    conn: &Connection,
    id: &Uuid,
    caller: Option<&Uuid>,
) -> Result<(Document, Option<Value>), DbError> {
    let id_str = id.to_string();
    let doc = match caller {
        Some(caller) => {
            let caller = caller.to_string();
            let sql = format!(
                "SELECT {} FROM documents d WHERE d.id = ? AND {}",
                DOC_COLUMNS, VISIBLE_TO_CALLER
            );
            conn.query_row(&sql, params![id_str, caller, caller], doc_from_row)
        }
        None => {
            let sql = format!("SELECT {} FROM documents d WHERE d.id = ?", DOC_COLUMNS);
            conn.query_row(&sql, params![id_str], doc_from_row)
        }
    }
    .optional()
    .map_err(|e| DbError::internal("Document query failed", e))?
    .ok_or(DbError::NotFound)?;

    // JSON body is best-effort
    let json: Option<Value> = conn
        .query_row(
            "SELECT body FROM doc_json WHERE doc_id = ?",
            params![id_str],
            |row| row.get(0),
        )
        .optional()
        .unwrap_or_else(|e| {
            debug!(doc_id = %id, error = %e, "JSON body unreadable");
            None
        });

    Ok((doc, json))
}

/// Delete by id and owner; zero rows means missing or not owned
pub fn delete_doc(conn: &Connection, id: &Uuid, owner_id: &Uuid) -> Result<(), DbError> {
    let changes = conn
        .execute(
            "DELETE FROM documents WHERE id = ? AND owner_id = ?",
            params![id.to_string(), owner_id.to_string()],
        )
        .map_err(|e| DbError::internal("Delete failed", e))?;

    if changes == 0 {
        return Err(DbError::NotFound);
    }
    debug!(doc_id = %id, "Deleted document");
    Ok(())
}

/// List documents visible to `caller`
pub fn list_docs(conn: &Connection, caller: &Uuid, filter: &ListFilter) -> Result<Vec<Document>, DbError> {
    let caller = caller.to_string();
    let mut sql = format!("SELECT {} FROM documents d", DOC_COLUMNS);
    let mut params: Vec<Box<dyn ToSql>> = vec![];
    let mut conditions = vec![VISIBLE_TO_CALLER.to_string()];
    params.push(Box::new(caller.clone()));
    params.push(Box::new(caller));

    if let Some(ref login) = filter.login {
        sql.push_str(" INNER JOIN users o ON o.id = d.owner_id");
        conditions.push("o.login = ?".to_string());
        params.push(Box::new(login.clone()));
    }

    if let Some((column, value)) = filter.column_filter() {
        conditions.push(format!("{} = ?", column));
        params.push(Box::new(value.to_string()));
    }

    if let (Some(cursor), Some(predicate)) = (&filter.cursor, filter.sort.cursor_predicate()) {
        let created = format_timestamp(&cursor.created_at);
        conditions.push(predicate.to_string());
        params.push(Box::new(created.clone()));
        params.push(Box::new(created));
        params.push(Box::new(cursor.id.to_string()));
    }

    sql.push_str(" WHERE ");
    sql.push_str(&conditions.join(" AND "));
    sql.push_str(" ORDER BY ");
    sql.push_str(filter.sort.order_by());
    sql.push_str(" LIMIT ?");
    params.push(Box::new(filter.effective_limit()));

    debug!("Executing query: {}", sql);

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| DbError::internal("Prepare failed", e))?;

    let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let docs = stmt
        .query_map(param_refs.as_slice(), doc_from_row)
        .map_err(|e| DbError::internal("Query failed", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DbError::internal("Row parse failed", e))?;

    Ok(docs)
}

/// Bump version and refresh `updated_at`
pub fn touch(conn: &Connection, id: &Uuid) -> Result<i64, DbError> {
    conn.query_row(
        "UPDATE documents SET version = version + 1, updated_at = ? WHERE id = ? RETURNING version",
        params![format_timestamp(&Utc::now()), id.to_string()],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| DbError::internal("Touch failed", e))?
    .ok_or(DbError::NotFound)
}

pub fn storage_key_refs(conn: &Connection, storage_key: &str) -> Result<i64, DbError> {
    conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE storage_key = ?",
        params![storage_key],
        |row| row.get(0),
    )
    .map_err(|e| DbError::internal("Count failed", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::shares::{remove_grant, upsert_grant};
    use crate::db::test_support::db_with_users;
    use crate::db::Database;
    use crate::model::{ListCursor, ListSort};
    use serde_json::json;

    fn new_doc(owner: Uuid, name: &str) -> NewDocument {
        NewDocument {
            owner_id: owner,
            name: name.to_string(),
            mime: "text/plain".to_string(),
            ..Default::default()
        }
    }

    fn insert(db: &Database, doc: NewDocument) -> Document {
        db.with_conn_mut(|conn| create_doc(conn, doc, None)).unwrap()
    }

    fn list(db: &Database, caller: &Uuid, filter: &ListFilter) -> Vec<Document> {
        db.with_conn(|conn| list_docs(conn, caller, filter)).unwrap()
    }

    #[test]
    fn test_create_and_fetch_with_json() {
        let (db, users) = db_with_users(&["owner0001"]);
        let owner = users[0].id;
        let body = json!({"title": "hello", "n": 1});

        let doc = db
            .with_conn_mut(|conn| create_doc(conn, new_doc(owner, "a.txt"), Some(&body)))
            .unwrap();
        assert_eq!(doc.version, 1);
        assert!(!doc.file);
        assert!(doc.storage_key.is_empty());

        let (fetched, json) = db.with_conn(|conn| doc_by_id(conn, &doc.id, Some(&owner))).unwrap();
        assert_eq!(fetched, doc);
        assert_eq!(json, Some(body));
    }

    #[test]
    fn test_fetch_without_json_body() {
        let (db, users) = db_with_users(&["owner0001"]);
        let doc = insert(&db, new_doc(users[0].id, "plain"));
        let (_, json) = db.with_conn(|conn| doc_by_id(conn, &doc.id, None)).unwrap();
        assert!(json.is_none());
    }

    #[test]
    fn test_acl_visibility() {
        let (db, users) = db_with_users(&["owner0001", "reader001"]);
        let (owner, reader) = (users[0].id, users[1].id);
        let doc = insert(&db, new_doc(owner, "secret"));

        let fetch = |caller: &Uuid| db.with_conn(|conn| doc_by_id(conn, &doc.id, Some(caller)));
        assert!(fetch(&owner).is_ok());
        assert!(matches!(fetch(&reader), Err(DbError::NotFound)));

        db.with_conn(|conn| upsert_grant(conn, &doc.id, "reader001", true)).unwrap();
        assert!(fetch(&reader).is_ok());

        db.with_conn(|conn| upsert_grant(conn, &doc.id, "reader001", false)).unwrap();
        assert!(matches!(fetch(&reader), Err(DbError::NotFound)));

        db.with_conn(|conn| upsert_grant(conn, &doc.id, "reader001", true)).unwrap();
        db.with_conn(|conn| remove_grant(conn, &doc.id, "reader001")).unwrap();
        assert!(matches!(fetch(&reader), Err(DbError::NotFound)));
    }

    #[test]
    fn test_public_visible_to_all() {
        let (db, users) = db_with_users(&["owner0001", "stranger1"]);
        let mut input = new_doc(users[0].id, "notice");
        input.public = true;
        let doc = insert(&db, input);

        assert!(db
            .with_conn(|conn| doc_by_id(conn, &doc.id, Some(&users[1].id)))
            .is_ok());
    }

    #[test]
    fn test_delete_requires_owner() {
        let (db, users) = db_with_users(&["owner0001", "other0001"]);
        let doc = insert(&db, new_doc(users[0].id, "mine"));

        assert!(matches!(
            db.with_conn(|conn| delete_doc(conn, &doc.id, &users[1].id)),
            Err(DbError::NotFound)
        ));
        db.with_conn(|conn| delete_doc(conn, &doc.id, &users[0].id)).unwrap();
        assert!(matches!(
            db.with_conn(|conn| doc_by_id(conn, &doc.id, None)),
            Err(DbError::NotFound)
        ));
        assert!(matches!(
            db.with_conn(|conn| delete_doc(conn, &doc.id, &users[0].id)),
            Err(DbError::NotFound)
        ));
    }

    #[test]
    fn test_touch_increments_version() {
        let (db, users) = db_with_users(&["owner0001"]);
        let doc = insert(&db, new_doc(users[0].id, "t"));

        assert_eq!(db.with_conn(|conn| touch(conn, &doc.id)).unwrap(), 2);
        assert_eq!(db.with_conn(|conn| touch(conn, &doc.id)).unwrap(), 3);
        let (fetched, _) = db.with_conn(|conn| doc_by_id(conn, &doc.id, None)).unwrap();
        assert_eq!(fetched.version, 3);
        assert!(fetched.updated_at >= doc.updated_at);

        assert!(matches!(
            db.with_conn(|conn| touch(conn, &Uuid::new_v4())),
            Err(DbError::NotFound)
        ));
    }

    #[test]
    fn test_list_visibility_and_filters() {
        let (db, users) = db_with_users(&["owner0001", "other0001"]);
        let (owner, other) = (users[0].id, users[1].id);

        insert(&db, new_doc(owner, "b-own"));
        let mut png = new_doc(owner, "a-own");
        png.mime = "image/png".into();
        insert(&db, png);
        insert(&db, new_doc(other, "hidden"));
        let mut shared_public = new_doc(other, "c-public");
        shared_public.public = true;
        insert(&db, shared_public);

        let all = list(&db, &owner, &ListFilter::default());
        let names: Vec<_> = all.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(all.len(), 3);
        assert!(!names.contains(&"hidden"));

        let by_login = list(
            &db,
            &owner,
            &ListFilter {
                login: Some("other0001".into()),
                ..Default::default()
            },
        );
        assert_eq!(by_login.len(), 1);
        assert_eq!(by_login[0].name, "c-public");

        let by_mime = list(
            &db,
            &owner,
            &ListFilter {
                key: Some("mime".into()),
                value: Some("image/png".into()),
                ..Default::default()
            },
        );
        assert_eq!(by_mime.len(), 1);
        assert_eq!(by_mime[0].name, "a-own");

        // Unknown filter keys are ignored
        let ignored = list(
            &db,
            &owner,
            &ListFilter {
                key: Some("owner_id".into()),
                value: Some("x".into()),
                ..Default::default()
            },
        );
        assert_eq!(ignored.len(), 3);

        let sorted = list(
            &db,
            &owner,
            &ListFilter {
                sort: ListSort::NameAsc,
                ..Default::default()
            },
        );
        let names: Vec<_> = sorted.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a-own", "b-own", "c-public"]);

        let sorted = list(
            &db,
            &owner,
            &ListFilter {
                sort: ListSort::NameDesc,
                limit: 2,
                ..Default::default()
            },
        );
        let names: Vec<_> = sorted.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["c-public", "b-own"]);
    }

    #[test]
    fn test_list_cursor_pagination() {
        let (db, users) = db_with_users(&["owner0001"]);
        let owner = users[0].id;
        for i in 0..5 {
            insert(&db, new_doc(owner, &format!("doc{}", i)));
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let page_filter = |cursor: Option<ListCursor>| ListFilter {
            limit: 2,
            cursor,
            ..Default::default()
        };

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = list(&db, &owner, &page_filter(cursor.clone()));
            if page.is_empty() {
                break;
            }
            let last = page.last().unwrap();
            cursor = Some(ListCursor {
                created_at: last.created_at,
                id: last.id,
            });
            seen.extend(page.into_iter().map(|d| d.id));
        }

        assert_eq!(seen.len(), 5);
        let mut dedup = seen.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), 5);
    }

    #[test]
    fn test_list_cursor_pagination_ascending() {
        let (db, users) = db_with_users(&["owner0001"]);
        let owner = users[0].id;
        let mut created = Vec::new();
        for i in 0..3 {
            created.push(insert(&db, new_doc(owner, &format!("doc{}", i))).id);
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let page_filter = |cursor: Option<ListCursor>| ListFilter {
            sort: ListSort::CreatedAsc,
            limit: 2,
            cursor,
            ..Default::default()
        };
        let first = list(&db, &owner, &page_filter(None));
        assert_eq!(first.iter().map(|d| d.id).collect::<Vec<_>>(), created[..2].to_vec());

        let last = first.last().unwrap();
        let second = list(
            &db,
            &owner,
            &page_filter(Some(ListCursor {
                created_at: last.created_at,
                id: last.id,
            })),
        );
        assert_eq!(second.iter().map(|d| d.id).collect::<Vec<_>>(), vec![created[2]]);
    }

    #[test]
    fn test_storage_key_refs() {
        let (db, users) = db_with_users(&["owner0001"]);
        let mut with_file = new_doc(users[0].id, "f");
        with_file.storage_key = "sha256/abc".into();
        with_file.sha256 = "abc".into();
        with_file.size_bytes = 3;
        insert(&db, with_file.clone());
        insert(&db, with_file);

        assert_eq!(db.with_conn(|conn| storage_key_refs(conn, "sha256/abc")).unwrap(), 2);
        assert_eq!(db.with_conn(|conn| storage_key_refs(conn, "sha256/zzz")).unwrap(), 0);
    }
}
