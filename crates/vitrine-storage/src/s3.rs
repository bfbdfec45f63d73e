use crate::keys::{split_path, validate_path};
use crate::probe::probe_url;
use crate::traits::{
    ObjectEntry, ProbeResponse, Storage, StorageError, StorageResult, StoredObject,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, AttributeValue, Attributes, GetOptions, ObjectStore, ObjectStoreExt, PutOptions,
    PutPayload, Result as ObjectResult,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vitrine_core::Credential;

/// S3 storage implementation
///
/// One `AmazonS3` client is built lazily per bucket. AWS credentials come from
/// the environment, so the per-call bearer credential is not used here.
#[derive(Clone)]
pub struct S3Storage {
    stores: Arc<Mutex<HashMap<String, AmazonS3>>>,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
    probe_client: reqwest::Client,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub fn new(region: String, endpoint_url: Option<String>) -> StorageResult<Self> {
        let probe_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            stores: Arc::new(Mutex::new(HashMap::new())),
            region,
            endpoint_url,
            probe_client,
        })
    }

    fn store(&self, bucket: &str) -> StorageResult<AmazonS3> {
        let mut stores = self
            .stores
            .lock()
            .map_err(|_| StorageError::BackendError("S3 client cache poisoned".to_string()))?;
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }

        let mut builder = AmazonS3Builder::from_env()
            .with_region(self.region.clone())
            .with_bucket_name(bucket.to_string());

        if let Some(ref endpoint) = self.endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    /// Generate public URL for S3 object
    ///
    /// For AWS S3, uses the standard format: https://{bucket}.s3.{region}.amazonaws.com/{key}
    /// For S3-compatible providers, uses path-style: {endpoint}/{bucket}/{key}
    fn generate_url(&self, bucket: &str, key: &str) -> String {
        if let Some(ref endpoint) = self.endpoint_url {
            let base_url = endpoint.trim_end_matches('/');
            format!("{}/{}/{}", base_url, bucket, key)
        } else {
            format!("https://{}.s3.{}.amazonaws.com/{}", bucket, self.region, key)
        }
    }

    fn map_put_error(e: ObjectStoreError) -> StorageError {
        match e {
            ObjectStoreError::PermissionDenied { source, .. } => StorageError::Rejected {
                status: 403,
                message: source.to_string(),
            },
            ObjectStoreError::Unauthenticated { source, .. } => StorageError::Rejected {
                status: 401,
                message: source.to_string(),
            },
            ObjectStoreError::NotFound { path, .. } => StorageError::NotFound(path),
            other => StorageError::Network(other.to_string()),
        }
    }
}

/// Direct children of `prefix` whose name contains `search`.
///
/// Delimited listing keeps nested keys out of the response, so the cost tracks
/// the prefix's own entries rather than everything below it.
async fn list_children<S: ObjectStore>(
    store: &S,
    prefix: &str,
    search: Option<&str>,
) -> StorageResult<Vec<ObjectEntry>> {
    let prefix = prefix.trim_matches('/');
    let prefix_path = (!prefix.is_empty()).then(|| Path::from(prefix.to_string()));

    let listing = store
        .list_with_delimiter(prefix_path.as_ref())
        .await
        .map_err(|e| StorageError::Network(e.to_string()))?;

    let mut entries = Vec::new();
    for meta in listing.objects {
        let full = meta.location.to_string();
        let (_, name) = split_path(&full);
        if let Some(search) = search {
            if !name.contains(search) {
                continue;
            }
        }
        let content_type = recorded_content_type(store, &meta.location).await;
        entries.push(ObjectEntry {
            name: name.to_string(),
            content_type,
            size: Some(meta.size),
        });
    }

    Ok(entries)
}

/// Content type recorded on the object, via a metadata-only GET.
async fn recorded_content_type<S: ObjectStore>(store: &S, location: &Path) -> Option<String> {
    let options = GetOptions {
        head: true,
        ..Default::default()
    };
    let result: ObjectResult<_> = store.get_opts(location, options).await;
    result.ok().and_then(|r| {
        r.attributes.get(&Attribute::ContentType).map(|v| {
            let value: &str = v.as_ref();
            value.to_string()
        })
    })
}

#[async_trait]
impl Storage for S3Storage {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
        _credential: &Credential,
    ) -> StorageResult<StoredObject> {
        validate_path(path)?;
        let store = self.store(bucket)?;
        let size = data.len() as u64;
        let location = Path::from(path.to_string());

        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        let start = std::time::Instant::now();

        let result: ObjectResult<_> = store
            .put_opts(&location, PutPayload::from(data), options)
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %bucket,
                key = %path,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            Self::map_put_error(e)
        })?;

        tracing::info!(
            bucket = %bucket,
            key = %path,
            size_bytes = size,
            content_type = %content_type,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
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
        let store = self.store(bucket)?;
        list_children(&store, prefix, search).await
    }

    async fn probe(&self, url: &str) -> StorageResult<ProbeResponse> {
        probe_url(&self.probe_client, url).await
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let store = self.store(bucket)?;
        let location = Path::from(path.to_string());
        let url_result: ObjectResult<_> = store
            .signed_url(Method::GET, &location, expires_in)
            .await;

        let url = url_result
            .map_err(|e| StorageError::BackendError(e.to_string()))?
            .to_string();

        Ok(url)
    }

    async fn delete(&self, bucket: &str, path: &str) -> StorageResult<()> {
        let store = self.store(bucket)?;
        let start = std::time::Instant::now();
        let location = Path::from(path.to_string());

        let result: ObjectResult<_> = store.delete(&location).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %bucket,
                key = %path,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 delete failed"
            );
            StorageError::DeleteFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %bucket,
            key = %path,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.generate_url(bucket, path)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
