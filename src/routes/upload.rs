//! multipart/form-data parsing for document creation
//!
//! Parts:
//! - `meta` - JSON [`CreateMeta`]
//! - `json` - JSON body stored with the document
//! - `file` - binary payload, streamed straight into the blob store
//!
//! The `file` part is never buffered: its chunks are pumped into one end of
//! a duplex pipe while [`ContentStore::put`] consumes the other end.

use bytes::Bytes;
use futures::StreamExt;
use http_body_util::BodyStream;
use multer::{Constraints, Multipart, SizeLimit};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::delivery::{CreateInput, CreateMeta, DocService, UploadedFile};
use crate::types::DocError;

const PIPE_BUF_SIZE: usize = 64 * 1024;

/// Build a multipart reader over a request body, bounded by `max_bytes`
pub fn multipart_from_body<B>(content_type: Option<&str>, body: B, max_bytes: u64) -> Result<Multipart<'static>, DocError>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
{
    let content_type =
        content_type.ok_or_else(|| DocError::BadInput("missing Content-Type".into()))?;
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| DocError::BadInput(format!("not multipart: {}", e)))?;

    let stream = BodyStream::new(body).filter_map(|frame| async move {
        match frame {
            Ok(frame) => frame.into_data().ok().map(Ok),
            Err(e) => Some(Err(e)),
        }
    });

    let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(max_bytes));
    Ok(Multipart::with_constraints(stream, boundary, constraints))
}

fn multipart_err(err: multer::Error) -> DocError {
    DocError::BadInput(format!("multipart: {}", err))
}

/// Read all parts; the file part (if any) is already stored on return
pub async fn read_create_form(service: &DocService, mut multipart: Multipart<'static>) -> Result<CreateInput, DocError> {
    let mut input = CreateInput::default();

    let result: Result<(), DocError> = async {
        while let Some(mut field) = multipart.next_field().await.map_err(multipart_err)? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("meta") => {
                    let text = field.text().await.map_err(multipart_err)?;
                    input.meta = serde_json::from_str::<CreateMeta>(&text)
                        .map_err(|e| DocError::BadInput(format!("meta: {}", e)))?;
                }
                Some("json") => {
                    let text = field.text().await.map_err(multipart_err)?;
                    input.json = Some(
                        serde_json::from_str::<Value>(&text)
                            .map_err(|e| DocError::BadInput(format!("json: {}", e)))?,
                    );
                }
                Some("file") => {
                    if input.file.is_some() {
                        return Err(DocError::BadInput("more than one file part".into()));
                    }
                    let filename = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(|m| m.to_string());
                    let mime = content_type.as_deref().unwrap_or("application/octet-stream");
                    let hint = filename.as_deref().unwrap_or("file");

                    let (mut pipe_tx, pipe_rx) = tokio::io::duplex(PIPE_BUF_SIZE);
                    // On error pipe_tx is dropped, which ends the upload
                    let pump = async move {
                        while let Some(chunk) = field.chunk().await.map_err(multipart_err)? {
                            pipe_tx.write_all(&chunk).await?;
                        }
                        pipe_tx.shutdown().await?;
                        Ok::<_, DocError>(())
                    };
                    let (pumped, stored) =
                        tokio::join!(pump, service.store().put(pipe_rx, hint, mime));

                    if let Err(e) = pumped {
                        // A truncated payload may have reached the store
                        if let Ok(ref put) = stored {
                            service.discard_upload(put).await;
                        }
                        return Err(e);
                    }
                    let put = stored.map_err(|e| DocError::Unexpected(format!("blob store: {}", e)))?;
                    debug!(storage_key = %put.storage_key, size = put.size, "File part stored");

                    input.file = Some(UploadedFile {
                        put,
                        filename,
                        content_type,
                    });
                }
                other => {
                    debug!(field = ?other, "Skipping unknown form field");
                }
            }
        }
        Ok(())
    }
    .await;

    if let Err(e) = result {
        if let Some(ref file) = input.file {
            warn!(storage_key = %file.put.storage_key, "Discarding upload of rejected form");
            service.discard_upload(&file.put).await;
        }
        return Err(e);
    }

    Ok(input)
}
