//! End-to-end document lifecycle over the filesystem backend
//!
//! Exercises the delivery layer against an on-disk SQLite database and a
//! filesystem blob store, the way the server wires them in production.

use std::sync::Arc;

use docvault::cache::MemoryCache;
use docvault::db::{Database, UserRepo};
use docvault::delivery::{
    CreateInput, CreateMeta, DeliveryConfig, DocService, FetchBody, FetchRequest, ListQuery,
    UploadedFile,
};
use docvault::model::Identity;
use docvault::storage::{ContentStore, FsBackend};
use docvault::DocError;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

struct Harness {
    service: DocService,
    store: Arc<ContentStore>,
    alice: Identity,
    bob: Identity,
    _dir: TempDir,
}

async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(Database::open(dir.path()).unwrap());
    let backend = Arc::new(FsBackend::new(dir.path().join("blobs")).await.unwrap());
    let store = Arc::new(ContentStore::new(backend));
    let cache = Arc::new(MemoryCache::with_defaults());

    let alice = db.create_user("aliceuser", "$argon2id$test").await.unwrap();
    let bob = db.create_user("bobbyuser", "$argon2id$test").await.unwrap();

    let service = DocService::new(
        db.clone(),
        db,
        store.clone(),
        cache,
        DeliveryConfig::default(),
    );

    Harness {
        service,
        store,
        alice: Identity::new(alice.id, alice.login),
        bob: Identity::new(bob.id, bob.login),
        _dir: dir,
    }
}

fn plain() -> FetchRequest {
    FetchRequest::default()
}

async fn list_json(h: &Harness, who: &Identity) -> Value {
    let body = h.service.list(who, ListQuery::default()).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_file_document_lifecycle() {
    let h = harness().await;

    let put = h.store.put(&b"hello"[..], "hello.txt", "text/plain").await.unwrap();
    assert_eq!(
        put.sha256,
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );

    let outcome = h
        .service
        .create(
            &h.alice,
            CreateInput {
                meta: CreateMeta {
                    file: true,
                    ..Default::default()
                },
                json: None,
                file: Some(UploadedFile {
                    put,
                    filename: Some("hello.txt".into()),
                    content_type: Some("text/plain".into()),
                }),
            },
        )
        .await
        .unwrap();
    let id = outcome.document.id;
    assert_eq!(outcome.document.name, "hello.txt");

    // Full read
    let resp = h.service.fetch(&h.alice, &id, plain()).await.unwrap();
    let etag = resp.headers.etag.clone();
    assert_eq!(etag, "W/\"1-2cf24dba\"");
    match resp.body {
        FetchBody::File(mut read) => {
            let mut buf = Vec::new();
            read.reader.read_to_end(&mut buf).await.unwrap();
            assert_eq!(buf, b"hello");
            assert!(read.content_range.is_none());
        }
        other => panic!("expected file body, got {:?}", other),
    }

    // Conditional read
    let resp = h
        .service
        .fetch(
            &h.alice,
            &id,
            FetchRequest {
                if_none_match: Some(etag.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(matches!(resp.body, FetchBody::NotModified));

    // Touch invalidates the validator
    h.service.touch(&h.alice, &id).await.unwrap();
    let resp = h
        .service
        .fetch(
            &h.alice,
            &id,
            FetchRequest {
                if_none_match: Some(etag.clone()),
                range: Some("bytes=1-3".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(resp.headers.etag, "W/\"2-2cf24dba\"");
    match resp.body {
        FetchBody::File(mut read) => {
            let mut buf = Vec::new();
            read.reader.read_to_end(&mut buf).await.unwrap();
            assert_eq!(buf, b"ell");
            assert_eq!(read.content_range.as_deref(), Some("bytes 1-3/5"));
        }
        other => panic!("expected ranged body, got {:?}", other),
    }

    // Bob cannot see it, and cannot tell it exists
    let err = h.service.fetch(&h.bob, &id, plain()).await.unwrap_err();
    assert!(matches!(err, DocError::NotFound));

    // Deleting removes the blob with the last reference
    h.service.delete(&h.alice, &id).await.unwrap();
    let err = h.service.fetch(&h.alice, &id, plain()).await.unwrap_err();
    assert!(matches!(err, DocError::NotFound));
    assert!(!h
        .store
        .exists("sha256/2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_sharing_and_listing() {
    let h = harness().await;

    let doc = h
        .service
        .create(
            &h.alice,
            CreateInput {
                meta: CreateMeta {
                    name: Some("notes".into()),
                    ..Default::default()
                },
                json: Some(json!({"k": "v"})),
                file: None,
            },
        )
        .await
        .unwrap()
        .document;

    // Identical query, identical bytes
    let first = h.service.list(&h.alice, ListQuery::default()).await.unwrap();
    let second = h.service.list(&h.alice, ListQuery::default()).await.unwrap();
    assert_eq!(first, second);

    assert_eq!(list_json(&h, &h.bob).await["data"]["docs"], json!([]));

    // Grant reaches bob's listing despite his cached page
    h.service.grant(&h.alice, &doc.id, "bobbyuser", true).await.unwrap();
    let listed = list_json(&h, &h.bob).await;
    assert_eq!(listed["data"]["docs"][0]["id"], json!(doc.id.to_string()));
    assert_eq!(listed["data"]["docs"][0]["grant"], json!(["bobbyuser"]));

    let resp = h.service.fetch(&h.bob, &doc.id, plain()).await.unwrap();
    match resp.body {
        FetchBody::Json(body) => {
            let value: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(value, json!({"data": {"k": "v"}}));
        }
        other => panic!("expected json body, got {:?}", other),
    }

    // Bob is not the owner
    let err = h.service.delete(&h.bob, &doc.id).await.unwrap_err();
    assert!(matches!(err, DocError::Forbidden));

    // Revocation hides it again
    h.service.revoke(&h.alice, &doc.id, "bobbyuser").await.unwrap();
    assert_eq!(list_json(&h, &h.bob).await["data"]["docs"], json!([]));
    let err = h.service.fetch(&h.bob, &doc.id, plain()).await.unwrap_err();
    assert!(matches!(err, DocError::NotFound));
}

#[tokio::test]
async fn test_public_document_visible_to_all() {
    let h = harness().await;

    // Bob lists first so he holds a cached empty page
    assert_eq!(list_json(&h, &h.bob).await["data"]["docs"], json!([]));

    let doc = h
        .service
        .create(
            &h.alice,
            CreateInput {
                meta: CreateMeta {
                    name: Some("board".into()),
                    public: true,
                    ..Default::default()
                },
                json: Some(json!({"posted": true})),
                file: None,
            },
        )
        .await
        .unwrap()
        .document;

    let listed = list_json(&h, &h.bob).await;
    assert_eq!(listed["data"]["docs"][0]["name"], json!("board"));
    assert_eq!(listed["data"]["docs"][0]["public"], json!(true));
    assert!(h.service.fetch(&h.bob, &doc.id, plain()).await.is_ok());
}
