//! Local filesystem blob store
//!
//! Objects live under a root directory and are served back through the
//! `/files` route.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::types::{ObjectMetadata, StorageObject, StoredBlob};
use super::BlobStore;
use crate::error::{AppError, Result, StorageError};

/// Blob store backed by a directory on disk
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    /// Create the store, making sure the root directory exists
    pub async fn new(root: impl AsRef<Path>, public_base_url: &str) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;

        tracing::info!("Local blob store at {}", root.display());

        Ok(Self {
            root,
            base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Public URL for a key
    pub fn url_for(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/files/{}", self.base_url, encoded.join("/"))
    }

    /// Resolve a key to a path inside the root, rejecting traversal
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !safe {
            return Err(StorageError::InvalidKey(key.to_string()).into());
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<StoredBlob> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let size = data.len();
        tokio::fs::write(&path, data).await?;

        tracing::debug!(key, size, content_type, "Stored blob");

        Ok(StoredBlob {
            key: key.to_string(),
            url: self.url_for(key),
        })
    }

    async fn get(&self, key: &str) -> Result<StorageObject> {
        let path = self.path_for(key)?;

        let data = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => AppError::Storage(StorageError::ObjectNotFound(key.to_string())),
            _ => AppError::Io(e),
        })?;

        let content_type = mime_guess::from_path(&path)
            .first()
            .map(|mime| mime.essence_str().to_string());

        Ok(StorageObject {
            metadata: ObjectMetadata {
                key: key.to_string(),
                size: data.len() as i64,
                content_type,
            },
            data,
        })
    }
}
