//! In-memory object backend for tests and dev mode

use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{validate_key, ObjectBackend, ObjectMeta, ObjectReader, StorageError};

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    etag: String,
}

/// Object backend holding everything in a DashMap
#[derive(Default)]
pub struct MemoryBackend {
    objects: DashMap<String, StoredObject>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects, temporary ones included
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn put(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        content_type: &str,
    ) -> Result<u64, StorageError> {
        validate_key(key)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;

        let size = data.len() as u64;
        let etag = format!("\"{}\"", hex::encode(Sha256::digest(&data)));
        self.objects.insert(
            key.to_string(),
            StoredObject {
                data: Bytes::from(data),
                content_type: content_type.to_string(),
                etag,
            },
        );
        Ok(size)
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        validate_key(key)?;
        Ok(self.objects.get(key).map(|obj| ObjectMeta {
            size: obj.data.len() as u64,
            content_type: obj.content_type.clone(),
            etag: obj.etag.clone(),
        }))
    }

    async fn get(&self, key: &str, offset: u64, len: u64) -> Result<ObjectReader, StorageError> {
        validate_key(key)?;
        let data = self
            .objects
            .get(key)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        let start = (offset as usize).min(data.len());
        let end = start.saturating_add(len as usize).min(data.len());
        Ok(Box::pin(Cursor::new(data.slice(start..end))))
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        validate_key(src)?;
        validate_key(dst)?;
        let obj = self
            .objects
            .get(src)
            .map(|obj| obj.clone())
            .ok_or_else(|| StorageError::NotFound(src.to_string()))?;
        self.objects.insert(dst.to_string(), obj);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.objects.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ranged_get() {
        let backend = MemoryBackend::new();
        let mut src: &[u8] = b"0123456789";
        backend.put("sha256/k", &mut src, "text/plain").await.unwrap();

        let mut out = Vec::new();
        backend
            .get("sha256/k", 3, 4)
            .await
            .unwrap()
            .read_to_end(&mut out)
            .await
            .unwrap();
        assert_eq!(out, b"3456");
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let backend = MemoryBackend::new();
        assert!(backend.delete("sha256/none").await.is_ok());
        assert!(backend.is_empty());
    }
}
