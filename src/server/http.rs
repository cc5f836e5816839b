//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo; one task per accepted connection.

use bytes::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{Authenticator, RevocationList, TokenManager};
use crate::cache::{spawn_cleanup_task, CacheConfig, MemoryCache};
use crate::config::{Args, StorageKind};
use crate::db::Database;
use crate::delivery::{DeliveryConfig, DocService};
use crate::routes::{self, BoxBody};
use crate::storage::{ContentStore, FsBackend, MemoryBackend, ObjectBackend};
use crate::types::DocError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub db: Arc<Database>,
    pub cache: Arc<MemoryCache>,
    pub store: Arc<ContentStore>,
    /// Document operations
    pub docs: DocService,
    /// Identity resolution and account commands
    pub auth: Authenticator,
}

impl AppState {
    /// Open the configured database and blob backend
    pub async fn new(args: Args) -> Result<Self, DocError> {
        let db = Arc::new(
            Database::open(&args.data_dir).map_err(|e| DocError::Unexpected(e.to_string()))?,
        );

        let backend: Arc<dyn ObjectBackend> = match args.storage {
            StorageKind::Fs => Arc::new(
                FsBackend::new(args.blob_dir())
                    .await
                    .map_err(|e| DocError::Unexpected(e.to_string()))?,
            ),
            StorageKind::Memory => {
                warn!("In-memory blob storage: content is lost on restart");
                Arc::new(MemoryBackend::new())
            }
        };
        let cache = Arc::new(MemoryCache::new(CacheConfig::with_max_entries(
            args.cache_max_entries,
        )));

        Self::from_parts(args, db, cache, Arc::new(ContentStore::new(backend)))
    }

    /// Assemble state around already opened components
    pub fn from_parts(
        args: Args,
        db: Arc<Database>,
        cache: Arc<MemoryCache>,
        store: Arc<ContentStore>,
    ) -> Result<Self, DocError> {
        let tokens = match args.jwt_secret.clone().filter(|s| !s.is_empty()) {
            Some(secret) => TokenManager::new(secret, args.issuer.clone(), args.token_ttl_secs)?,
            None if args.dev_mode => {
                warn!("No JWT_SECRET set, using the development secret");
                TokenManager::new_dev(args.issuer.clone(), args.token_ttl_secs)
            }
            None => {
                return Err(DocError::Unexpected("JWT_SECRET is required in production mode".into()));
            }
        };

        let auth = Authenticator::new(
            tokens,
            RevocationList::new(cache.clone()),
            db.clone(),
            args.admin_token.clone(),
        );

        let docs = DocService::new(
            db.clone(),
            db.clone(),
            store.clone(),
            cache.clone(),
            DeliveryConfig {
                doc_ttl_secs: args.doc_ttl_secs,
                list_ttl_secs: args.list_ttl_secs,
            },
        );

        Ok(Self {
            args,
            db,
            cache,
            store,
            docs,
            auth,
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), DocError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("docvault listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled");
    }

    spawn_cleanup_task(Arc::clone(&state.cache));
    info!("Cache enabled (max {} entries)", state.cache.config().max_entries);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route an HTTP request and stamp its request id
pub async fn handle_request<B>(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<B>,
) -> Result<Response<BoxBody>, hyper::Error>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + std::fmt::Display + Send + 'static,
{
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!(request_id = %request_id, "[{}] {} {}", addr, method, path);

    let mut response = route(state, req, &method, &path, &request_id).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    debug!(request_id = %request_id, status = %response.status(), "Response");
    Ok(response)
}

fn is_known_path(segments: &[&str]) -> bool {
    matches!(
        segments,
        ["v1", "healthz"]
            | ["v1", "readyz"]
            | ["api", "register"]
            | ["api", "auth"]
            | ["api", "auth", _]
            | ["api", "docs"]
            | ["api", "docs", _]
            | ["api", "docs", _, "touch"]
            | ["api", "docs", _, "grants", _]
    )
}

fn needs_identity(segments: &[&str]) -> bool {
    matches!(segments, ["api", "docs", ..])
}

async fn route<B>(
    state: Arc<AppState>,
    req: Request<B>,
    method: &Method,
    path: &str,
    request_id: &str,
) -> Response<BoxBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + std::fmt::Display + Send + 'static,
{
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let segments = segments.as_slice();

    if !is_known_path(segments) {
        return routes::error_response(DocError::NotFound, request_id);
    }

    let (parts, body) = req.into_parts();
    let query = parts.uri.query();
    let head = *method == Method::HEAD;

    let identity = if needs_identity(segments) {
        match state.auth.resolve(&parts.headers, query).await {
            Ok(identity) => Some(identity),
            Err(e) => return routes::error_response(e, request_id),
        }
    } else {
        None
    };

    match (method, segments, identity) {
        (&Method::GET, ["v1", "healthz"], _) | (&Method::HEAD, ["v1", "healthz"], _) => {
            routes::health_check()
        }
        (&Method::GET, ["v1", "readyz"], _) | (&Method::HEAD, ["v1", "readyz"], _) => {
            routes::readiness_check(Arc::clone(&state), request_id).await
        }

        (&Method::POST, ["api", "register"], _) => {
            routes::handle_register(state, body, request_id).await
        }
        (&Method::POST, ["api", "auth"], _) => routes::handle_login(state, body, request_id).await,
        (&Method::DELETE, ["api", "auth", token], _) => {
            routes::handle_logout(state, token, &parts.headers, query, request_id).await
        }

        (&Method::GET | &Method::HEAD, ["api", "docs"], Some(identity)) => {
            routes::handle_list(state, &identity, query, head, request_id).await
        }
        (&Method::POST, ["api", "docs"], Some(identity)) => {
            let is_multipart = parts
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|ct| ct.starts_with("multipart/"))
                .unwrap_or(false);
            if !is_multipart {
                return routes::error_response(
                    DocError::BadInput("expected multipart/form-data".into()),
                    request_id,
                );
            }
            routes::handle_create(state, &identity, &parts.headers, body, request_id).await
        }
        (&Method::GET | &Method::HEAD, ["api", "docs", id], Some(identity)) => {
            routes::handle_fetch(state, &identity, id, &parts.headers, head, request_id).await
        }
        (&Method::DELETE, ["api", "docs", id], Some(identity)) => {
            routes::handle_delete(state, &identity, id, request_id).await
        }
        (&Method::POST, ["api", "docs", id, "touch"], Some(identity)) => {
            routes::handle_touch(state, &identity, id, request_id).await
        }
        (&Method::PUT, ["api", "docs", id, "grants", login], Some(identity)) => {
            routes::handle_grant(state, &identity, id, login, query, request_id).await
        }
        (&Method::DELETE, ["api", "docs", id, "grants", login], Some(identity)) => {
            routes::handle_revoke(state, &identity, id, login, request_id).await
        }

        _ => routes::error_response(DocError::MethodNotAllowed, request_id),
    }
}
