use crate::keys::validate_path;
use crate::traits::{
    ObjectEntry, ProbeResponse, Storage, StorageError, StorageResult, StoredObject,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use vitrine_core::Credential;

const SIDECAR_SUFFIX: &str = ".meta.json";

/// Metadata recorded next to each stored file.
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    size: u64,
}

/// Local filesystem storage implementation
///
/// Objects are stored at `{base_path}/{bucket}/{path}` with the content type
/// kept in a `.meta.json` sidecar. Public URLs are `{base_url}/{bucket}/{path}`
/// and are probed by mapping them back onto the filesystem.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/vitrine")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:8080/files")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Convert bucket and path to a filesystem path with traversal checks
    fn object_to_path(&self, bucket: &str, path: &str) -> StorageResult<PathBuf> {
        validate_path(bucket)?;
        if bucket.contains('/') {
            return Err(StorageError::InvalidKey(
                "Bucket name must not contain '/'".to_string(),
            ));
        }
        validate_path(path)?;
        Ok(self.base_path.join(bucket).join(path))
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(SIDECAR_SUFFIX);
        PathBuf::from(name)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn read_sidecar(path: &Path) -> Option<Sidecar> {
        let raw = fs::read(Self::sidecar_path(path)).await.ok()?;
        serde_json::from_slice(&raw).ok()
    }

    /// Map a URL served from `base_url` back to (bucket, path).
    fn url_to_object<'a>(&self, url: &'a str) -> Option<(&'a str, &'a str)> {
        let rest = url.strip_prefix(self.base_url.as_str())?.strip_prefix('/')?;
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        rest.split_once('/')
    }

    async fn write_file(path: &Path, data: &[u8]) -> StorageResult<()> {
        let mut file = fs::File::create(path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
        _credential: &Credential,
    ) -> StorageResult<StoredObject> {
        let file_path = self.object_to_path(bucket, path)?;
        let size = data.len() as u64;

        self.ensure_parent_dir(&file_path).await?;

        let start = std::time::Instant::now();

        Self::write_file(&file_path, &data).await?;

        let sidecar = serde_json::to_vec(&Sidecar {
            content_type: content_type.to_string(),
            size,
        })
        .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        Self::write_file(&Self::sidecar_path(&file_path), &sidecar).await?;

        tracing::info!(
            path = %file_path.display(),
            bucket = %bucket,
            key = %path,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(StoredObject {
            path: path.to_string(),
        })
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        search: Option<&str>,
    ) -> StorageResult<Vec<ObjectEntry>> {
        let prefix = prefix.trim_matches('/');
        let dir = if prefix.is_empty() {
            validate_path(bucket)?;
            self.base_path.join(bucket)
        } else {
            self.object_to_path(bucket, prefix)?
        };

        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(SIDECAR_SUFFIX) {
                continue;
            }
            if let Some(search) = search {
                if !name.contains(search) {
                    continue;
                }
            }

            let sidecar = Self::read_sidecar(&entry.path()).await;
            let size = match &sidecar {
                Some(sidecar) => Some(sidecar.size),
                None => entry.metadata().await.ok().map(|m| m.len()),
            };
            entries.push(ObjectEntry {
                name,
                content_type: sidecar.map(|s| s.content_type),
                size,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn probe(&self, url: &str) -> StorageResult<ProbeResponse> {
        let not_found = ProbeResponse {
            status: 404,
            content_type: None,
        };

        let Some((bucket, path)) = self.url_to_object(url) else {
            return Ok(not_found);
        };
        let Ok(file_path) = self.object_to_path(bucket, path) else {
            return Ok(not_found);
        };
        if !fs::try_exists(&file_path).await.unwrap_or(false) {
            return Ok(not_found);
        }

        Ok(ProbeResponse {
            status: 200,
            content_type: Self::read_sidecar(&file_path).await.map(|s| s.content_type),
        })
    }

    /// Local files have no access control; the signed URL is the public URL
    /// tagged with its expiry.
    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.object_to_path(bucket, path)?;
        let expires_at = chrono::Utc::now().timestamp() + expires_in.as_secs() as i64;
        Ok(format!("{}?expires={}", self.public_url(bucket, path), expires_at))
    }

    async fn delete(&self, bucket: &str, path: &str) -> StorageResult<()> {
        let file_path = self.object_to_path(bucket, path)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&file_path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&file_path).await.map_err(|e| {
            StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                file_path.display(),
                e
            ))
        })?;
        let _ = fs::remove_file(Self::sidecar_path(&file_path)).await;

        tracing::info!(
            path = %file_path.display(),
            bucket = %bucket,
            key = %path,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, bucket, path)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
