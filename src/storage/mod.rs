//! Blob storage for block attachments and page covers
//!
//! Supports a local directory and S3-compatible backends (MinIO,
//! Cloudflare R2, Backblaze B2, AWS S3).

mod local;
mod s3_client;
mod types;

pub use local::LocalBlobStore;
pub use s3_client::S3BlobStore;
pub use types::*;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, StorageProvider};
use crate::error::Result;

/// Byte storage addressed by key
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store an object and return its key and retrievable URL
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<StoredBlob>;

    /// Fetch an object's bytes and metadata
    async fn get(&self, key: &str) -> Result<StorageObject>;
}

/// Build the blob store selected by configuration
pub async fn from_config(config: &Config) -> Result<Arc<dyn BlobStore>> {
    match config.storage.provider {
        StorageProvider::Local => {
            let store = LocalBlobStore::new(&config.storage.root, &config.server.public_base_url).await?;
            Ok(Arc::new(store))
        }
        _ => Ok(Arc::new(S3BlobStore::new(&config.storage).await?)),
    }
}
