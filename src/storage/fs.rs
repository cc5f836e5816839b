//! Filesystem object backend
//!
//! Each key maps to a file under the root directory (`sha256/<hex>` becomes
//! `<root>/sha256/<hex>`). Content type and entity tag live in a JSON sidecar
//! next to the object. Writes go to a `.part` file and are renamed into place
//! so a reader never observes a half-written object.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info};

use super::{validate_key, ObjectBackend, ObjectMeta, ObjectReader, StorageError};

const COPY_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    etag: String,
}

/// Object backend rooted at a local directory
pub struct FsBackend {
    root_dir: PathBuf,
}

impl FsBackend {
    /// Create a backend at the given directory, creating it if needed
    pub async fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self, StorageError> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir).await?;

        info!(path = %root_dir.display(), "Initialized filesystem object backend");

        Ok(Self { root_dir })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root_dir.join(key))
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".meta");
        PathBuf::from(name)
    }

    fn part_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".part-{}", uuid::Uuid::new_v4()));
        PathBuf::from(name)
    }

    async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn read_sidecar(path: &Path) -> Result<Option<Sidecar>, StorageError> {
        match fs::read(Self::sidecar_path(path)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_sidecar(path: &Path, sidecar: &Sidecar) -> Result<(), StorageError> {
        fs::write(Self::sidecar_path(path), serde_json::to_vec(sidecar)?).await?;
        Ok(())
    }

    async fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectBackend for FsBackend {
    async fn put(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        content_type: &str,
    ) -> Result<u64, StorageError> {
        let path = self.object_path(key)?;
        Self::ensure_parent(&path).await?;

        let part = Self::part_path(&path);
        let mut file = fs::File::create(&part).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut written = 0u64;

        let copied: Result<(), std::io::Error> = async {
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                file.write_all(&buf[..n]).await?;
                written += n as u64;
            }
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = copied {
            drop(file);
            fs::remove_file(&part).await.ok();
            return Err(e.into());
        }
        drop(file);

        fs::rename(&part, &path).await?;
        let sidecar = Sidecar {
            content_type: content_type.to_string(),
            etag: format!("\"{}\"", hex::encode(hasher.finalize())),
        };
        Self::write_sidecar(&path, &sidecar).await?;

        debug!(key = %key, size = written, "Stored object");
        Ok(written)
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        let path = self.object_path(key)?;
        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let sidecar = Self::read_sidecar(&path).await?;
        let (content_type, etag) = match sidecar {
            Some(s) => (s.content_type, s.etag),
            None => (String::new(), String::new()),
        };

        Ok(Some(ObjectMeta {
            size: meta.len(),
            content_type,
            etag,
        }))
    }

    async fn get(&self, key: &str, offset: u64, len: u64) -> Result<ObjectReader, StorageError> {
        let path = self.object_path(key)?;
        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(Box::pin(file.take(len)))
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        let src_path = self.object_path(src)?;
        let dst_path = self.object_path(dst)?;
        Self::ensure_parent(&dst_path).await?;

        let part = Self::part_path(&dst_path);
        if let Err(e) = fs::copy(&src_path, &part).await {
            fs::remove_file(&part).await.ok();
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(StorageError::NotFound(src.to_string()));
            }
            return Err(e.into());
        }
        fs::rename(&part, &dst_path).await?;

        if let Some(sidecar) = Self::read_sidecar(&src_path).await? {
            Self::write_sidecar(&dst_path, &sidecar).await?;
        }

        debug!(src = %src, dst = %dst, "Copied object");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        Self::remove_if_exists(&path).await?;
        Self::remove_if_exists(&Self::sidecar_path(&path)).await?;
        debug!(key = %key, "Deleted object");
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let meta = fs::metadata(&self.root_dir).await?;
        if !meta.is_dir() {
            return Err(StorageError::Internal(format!(
                "{} is not a directory",
                self.root_dir.display()
            )));
        }
        Ok(())
    }
}
