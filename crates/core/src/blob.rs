//! Blob handoff for large intermediate payloads.
//!
//! Stages may run in separate processes, so extracted text and HTML above the
//! inline limit are written here and referenced from the record by id.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{DocifyError, Result};

/// Identifier of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for BlobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Write-once byte storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bytes: Vec<u8>) -> Result<BlobId>;

    async fn get(&self, id: &BlobId) -> Result<Vec<u8>>;

    /// Removes a blob. Deleting a blob that does not exist is not an error.
    async fn delete(&self, id: &BlobId) -> Result<()>;
}

/// In-process [`BlobStore`].
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<BlobId, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<BlobId> {
        let id = BlobId::new();
        self.blobs.write().await.insert(id.clone(), bytes);
        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DocifyError::Blob(format!("blob {} not found", id)))
    }

    async fn delete(&self, id: &BlobId) -> Result<()> {
        self.blobs.write().await.remove(id);
        Ok(())
    }
}

/// [`BlobStore`] writing one file per blob under a directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Uses `root` as the blob directory; it is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Blob directory under the user's cache directory (`~/.cache/docify/blobs` on Linux).
    pub fn default_root() -> Result<PathBuf> {
        dirs::cache_dir()
            .map(|dir| dir.join("docify").join("blobs"))
            .ok_or_else(|| DocifyError::ConfigError("no cache directory available for blob storage".into()))
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn path_for(&self, id: &BlobId) -> Result<PathBuf> {
        if id.as_str().is_empty() || !id.as_str().chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(DocifyError::Blob(format!("invalid blob id: {}", id)));
        }
        Ok(self.root.join(format!("{}.blob", id)))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<BlobId> {
        let id = BlobId::new();
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(&id)?, bytes).await?;
        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> Result<Vec<u8>> {
        let path = self.path_for(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DocifyError::Blob(format!("blob {} not found", id)))
            }
            Err(e) => Err(DocifyError::Io(e)),
        }
    }

    async fn delete(&self, id: &BlobId) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(id)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DocifyError::Io(e)),
        }
    }
}
