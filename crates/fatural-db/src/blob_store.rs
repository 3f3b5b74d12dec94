//! Blob stores for uploaded bill documents.
//!
//! The pipeline only ever reads: the upload path writes the object and
//! publishes its key. Missing objects and denied access both surface as
//! [`Error::BlobNotFound`].

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::fs;
use tracing::{debug, warn};

use fatural_core::defaults;
use fatural_core::{Error, Result};

/// Read side of object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the object stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

// =============================================================================
// FILESYSTEM
// =============================================================================

/// Filesystem blob store.
///
/// Keys are relative paths under `base_path`; absolute keys and `..`
/// components are rejected.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
}

impl FilesystemBlobStore {
    /// Create a new filesystem store with the given base directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Store rooted at `BLOB_ROOT`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("BLOB_ROOT").unwrap_or_else(|_| defaults::BLOB_ROOT.to_string()))
    }

    fn full_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if key.is_empty() || !safe {
            return Err(Error::BlobNotFound(key.to_string()));
        }
        Ok(self.base_path.join(relative))
    }

    /// Write an object. Used by local upload tooling and tests.
    pub async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(key)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = full_path.with_extension("tmp");
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &full_path).await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(key)?;
        debug!(storage_path = %key, full_path = %full_path.display(), "blob_store: read");

        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ) =>
            {
                Err(Error::BlobNotFound(key.to_string()))
            }
            Err(e) => {
                warn!(storage_path = %key, error = %e, "blob_store: read failed");
                Err(Error::Storage(format!("read {}: {}", key, e)))
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

// =============================================================================
// GOOGLE CLOUD STORAGE
// =============================================================================

/// Google Cloud Storage blob store over the JSON API.
pub struct GcsBlobStore {
    client: Client,
    base_url: String,
    bucket: String,
    access_token: Option<String>,
}

impl GcsBlobStore {
    pub fn new(
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            access_token,
        })
    }

    /// Store from `GCS_BASE_URL`, `GCS_BUCKET_NAME`, `GCS_ACCESS_TOKEN`.
    pub fn from_env(timeout: Duration) -> Result<Self> {
        let base_url =
            std::env::var("GCS_BASE_URL").unwrap_or_else(|_| defaults::GCS_URL.to_string());
        let bucket =
            std::env::var("GCS_BUCKET_NAME").unwrap_or_else(|_| defaults::GCS_BUCKET.to_string());
        let token = std::env::var("GCS_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        Self::new(base_url, bucket, token, timeout)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}?alt=media",
            self.base_url,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(key)
        )
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let mut request = self.client.get(self.object_url(key));
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        match status {
            s if s.is_success() => {
                let bytes = response.bytes().await?;
                debug!(
                    storage_path = %key,
                    size_bytes = bytes.len(),
                    "blob_store: gcs object fetched"
                );
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                Err(Error::BlobNotFound(key.to_string()))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Storage(format!(
                    "GCS returned {}: {}",
                    status, body
                )))
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "gcs"
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

/// In-memory blob store. Cloning shares the same objects.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Error::Internal("blob store lock poisoned".to_string()))?
            .insert(key.into(), data.into());
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Error::Internal("blob store lock poisoned".to_string()))?
            .remove(key);
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .map_err(|_| Error::Internal("blob store lock poisoned".to_string()))?
            .get(key)
            .cloned()
            .ok_or_else(|| Error::BlobNotFound(key.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
