//! Document routes under `/api/docs`

use bytes::Bytes;
use futures::stream;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::{header, HeaderMap, Response, StatusCode};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use uuid::Uuid;

use super::upload::{multipart_from_body, read_create_form};
use super::{empty_body, error_response, json_response, BoxBody};
use crate::delivery::{etag::CacheHeaders, FetchBody, FetchRequest, FetchResponse, ListQuery};
use crate::model::Identity;
use crate::server::AppState;
use crate::storage::ObjectReader;
use crate::types::DocError;

/// Chunk size for streamed file bodies
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

fn parse_doc_id(raw: &str) -> Result<Uuid, DocError> {
    Uuid::parse_str(raw).map_err(|_| DocError::BadInput(format!("bad document id {:?}", raw)))
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Stream an object reader as response frames
fn reader_body(reader: ObjectReader) -> BoxBody {
    let frames = stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Frame::data(Bytes::from(buf))), Some(reader)))
            }
            // Stop after the first error
            Err(e) => Some((Err(e), None)),
        }
    });
    StreamBody::new(frames).boxed_unsync()
}

fn with_validators(builder: hyper::http::response::Builder, headers: &CacheHeaders) -> hyper::http::response::Builder {
    builder
        .header(header::ETAG, &headers.etag)
        .header(header::LAST_MODIFIED, &headers.last_modified)
        .header(header::CACHE_CONTROL, headers.cache_control)
}

fn fetch_response(resp: FetchResponse, head: bool) -> Response<BoxBody> {
    let builder = with_validators(Response::builder(), &resp.headers);

    match resp.body {
        FetchBody::NotModified => builder
            .status(StatusCode::NOT_MODIFIED)
            .body(empty_body())
            .unwrap(),
        FetchBody::FileHead { content_type } => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::ACCEPT_RANGES, "bytes")
            .body(empty_body())
            .unwrap(),
        FetchBody::File(read) => {
            let status = if read.content_range.is_some() {
                StatusCode::PARTIAL_CONTENT
            } else {
                StatusCode::OK
            };
            let mut builder = builder
                .status(status)
                .header(header::CONTENT_TYPE, read.content_type)
                .header(header::CONTENT_LENGTH, read.content_length)
                .header(header::ACCEPT_RANGES, "bytes");
            if let Some(range) = read.content_range {
                builder = builder.header(header::CONTENT_RANGE, range);
            }
            builder.body(reader_body(read.reader)).unwrap()
        }
        FetchBody::Json(body) => {
            let builder = builder
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::CONTENT_LENGTH, body.len());
            let body = if head { empty_body() } else { super::full(body) };
            builder.body(body).unwrap()
        }
    }
}

/// GET|HEAD /api/docs
pub async fn handle_list(
    state: Arc<AppState>,
    identity: &Identity,
    query: Option<&str>,
    head: bool,
    request_id: &str,
) -> Response<BoxBody> {
    let result = async {
        let query: ListQuery = serde_urlencoded::from_str(query.unwrap_or(""))
            .map_err(|e| DocError::BadInput(format!("query: {}", e)))?;
        state.docs.list(identity, query).await
    }
    .await;

    match result {
        Ok(body) if head => {
            let mut resp = json_response(StatusCode::OK, body);
            *resp.body_mut() = empty_body();
            resp
        }
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => error_response(e, request_id),
    }
}

/// GET|HEAD /api/docs/{id}
pub async fn handle_fetch(
    state: Arc<AppState>,
    identity: &Identity,
    raw_id: &str,
    headers: &HeaderMap,
    head: bool,
    request_id: &str,
) -> Response<BoxBody> {
    let result = async {
        let id = parse_doc_id(raw_id)?;
        let req = FetchRequest {
            head,
            if_none_match: header_str(headers, header::IF_NONE_MATCH).map(str::to_string),
            range: header_str(headers, header::RANGE).map(str::to_string),
        };
        state.docs.fetch(identity, &id, req).await
    }
    .await;

    match result {
        Ok(resp) => {
            debug!(request_id, doc_id = raw_id, etag = %resp.headers.etag, "Fetched document");
            fetch_response(resp, head)
        }
        Err(e) => error_response(e, request_id),
    }
}

/// POST /api/docs (multipart)
pub async fn handle_create<B>(
    state: Arc<AppState>,
    identity: &Identity,
    headers: &HeaderMap,
    body: B,
    request_id: &str,
) -> Response<BoxBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
{
    let result = async {
        let multipart = multipart_from_body(
            header_str(headers, header::CONTENT_TYPE),
            body,
            state.args.max_upload_bytes,
        )?;
        let input = read_create_form(&state.docs, multipart).await?;
        state.docs.create(identity, input).await
    }
    .await;

    match result {
        Ok(outcome) => {
            info!(request_id, doc_id = %outcome.document.id, "Document created");
            json_response(StatusCode::OK, outcome.body)
        }
        Err(e) => error_response(e, request_id),
    }
}

/// DELETE /api/docs/{id}
pub async fn handle_delete(
    state: Arc<AppState>,
    identity: &Identity,
    raw_id: &str,
    request_id: &str,
) -> Response<BoxBody> {
    let result = async {
        let id = parse_doc_id(raw_id)?;
        state.docs.delete(identity, &id).await
    }
    .await;

    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => error_response(e, request_id),
    }
}

/// POST /api/docs/{id}/touch
pub async fn handle_touch(
    state: Arc<AppState>,
    identity: &Identity,
    raw_id: &str,
    request_id: &str,
) -> Response<BoxBody> {
    let result = async {
        let id = parse_doc_id(raw_id)?;
        state.docs.touch(identity, &id).await
    }
    .await;

    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => error_response(e, request_id),
    }
}

/// `read` query flag; anything but `false`/`0` grants read access
fn read_flag(query: Option<&str>) -> bool {
    let pairs: Vec<(String, String)> = query
        .and_then(|q| serde_urlencoded::from_str(q).ok())
        .unwrap_or_default();
    !pairs
        .iter()
        .any(|(k, v)| k == "read" && (v.eq_ignore_ascii_case("false") || v == "0"))
}

/// PUT /api/docs/{id}/grants/{login}
pub async fn handle_grant(
    state: Arc<AppState>,
    identity: &Identity,
    raw_id: &str,
    raw_login: &str,
    query: Option<&str>,
    request_id: &str,
) -> Response<BoxBody> {
    let result = async {
        let id = parse_doc_id(raw_id)?;
        let login = urlencoding::decode(raw_login)
            .map_err(|_| DocError::BadInput("bad login".into()))?;
        state.docs.grant(identity, &id, &login, read_flag(query)).await
    }
    .await;

    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => error_response(e, request_id),
    }
}

/// DELETE /api/docs/{id}/grants/{login}
pub async fn handle_revoke(
    state: Arc<AppState>,
    identity: &Identity,
    raw_id: &str,
    raw_login: &str,
    request_id: &str,
) -> Response<BoxBody> {
    let result = async {
        let id = parse_doc_id(raw_id)?;
        let login = urlencoding::decode(raw_login)
            .map_err(|_| DocError::BadInput("bad login".into()))?;
        state.docs.revoke(identity, &id, &login).await
    }
    .await;

    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => error_response(e, request_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_flag() {
        assert!(read_flag(None));
        assert!(read_flag(Some("read=true")));
        assert!(!read_flag(Some("read=false")));
        assert!(!read_flag(Some("x=1&read=0")));
    }

    #[test]
    fn test_doc_id_parsing() {
        assert!(parse_doc_id("not-a-uuid").is_err());
        assert!(parse_doc_id(&Uuid::nil().to_string()).is_ok());
    }
}
