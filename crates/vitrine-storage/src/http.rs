//! HTTP object-storage backend
//!
//! Talks to a REST object API laid out as:
//!
//! - `POST   {base}/object/{bucket}/{path}` write (bearer credential of the caller)
//! - `POST   {base}/object/list/{bucket}` list a prefix
//! - `POST   {base}/object/sign/{bucket}/{path}` signed read URL
//! - `DELETE {base}/object/{bucket}` remove paths
//! - `GET    {base}/object/public/{bucket}/{path}` public read
//!
//! Listing, signing and deleting use the configured service key when one is set.

use crate::keys::{encode_path, validate_path};
use crate::probe::{map_reqwest_error, probe_url};
use crate::traits::{
    ObjectEntry, ProbeResponse, Storage, StorageError, StorageResult, StoredObject,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vitrine_core::Credential;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);
const LIST_LIMIT: u32 = 100;

#[derive(Serialize)]
struct ListBody<'a> {
    prefix: &'a str,
    limit: u32,
    offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a str>,
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
    #[serde(default)]
    metadata: Option<ListedMetadata>,
}

#[derive(Deserialize)]
struct ListedMetadata {
    #[serde(default)]
    mimetype: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignBody {
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

#[derive(Serialize)]
struct DeleteBody<'a> {
    prefixes: Vec<&'a str>,
}

/// HTTP object storage implementation
#[derive(Clone)]
pub struct HttpObjectStorage {
    client: Client,
    base_url: String,
    service_key: Option<String>,
}

impl HttpObjectStorage {
    /// Create a new HttpObjectStorage instance
    ///
    /// # Arguments
    /// * `base_url` - Root of the object API (e.g., "https://project.example.co/storage/v1")
    /// * `service_key` - Key used for listing, signing and deleting
    pub fn new(base_url: impl Into<String>, service_key: Option<String>) -> StorageResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(StorageError::ConfigError(format!(
                "Storage URL must be http(s): {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpObjectStorage {
            client,
            base_url,
            service_key: service_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/object/{}/{}",
            self.base_url,
            urlencoding::encode(bucket),
            encode_path(path)
        )
    }

    fn with_service_key(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.service_key {
            Some(key) => request
                .header(AUTHORIZATION, format!("Bearer {}", key))
                .header("apikey", key),
            None => request,
        }
    }

    /// Absolute URL for a signed path returned by the API (it answers with a relative one).
    fn absolute_url(&self, signed: &str) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            signed.to_string()
        } else if signed.starts_with('/') {
            format!("{}{}", self.base_url, signed)
        } else {
            format!("{}/{}", self.base_url, signed)
        }
    }
}

/// Turn a non-success response into `StorageError::Rejected`.
///
/// Error bodies look like `{"statusCode":"403","error":"Unauthorized","message":"..."}`;
/// the HTTP status wins over the body's own status field.
async fn rejection(response: Response) -> StorageError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|json| {
            let message = json.get("message").and_then(|m| m.as_str());
            let error = json.get("error").and_then(|e| e.as_str());
            match (error, message) {
                (Some(error), Some(message)) if error != message => {
                    Some(format!("{}: {}", error, message))
                }
                (_, Some(message)) => Some(message.to_string()),
                (Some(error), None) => Some(error.to_string()),
                (None, None) => None,
            }
        })
        .unwrap_or(body);

    StorageError::Rejected { status, message }
}

#[async_trait]
impl Storage for HttpObjectStorage {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
        credential: &Credential,
    ) -> StorageResult<StoredObject> {
        validate_path(path)?;
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(self.object_url(bucket, path))
            .header(AUTHORIZATION, credential.authorization_header())
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(data)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %bucket,
                    key = %path,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "HTTP upload failed"
                );
                map_reqwest_error(e)
            })?;

        if !response.status().is_success() {
            let err = rejection(response).await;
            tracing::warn!(
                error = %err,
                bucket = %bucket,
                key = %path,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "HTTP upload rejected"
            );
            return Err(err);
        }

        tracing::info!(
            bucket = %bucket,
            key = %path,
            size_bytes = size,
            content_type = %content_type,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "HTTP upload successful"
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
        let start = std::time::Instant::now();
        let body = ListBody {
            prefix: prefix.trim_matches('/'),
            limit: LIST_LIMIT,
            offset: 0,
            search,
        };

        let request = self.client.post(format!(
            "{}/object/list/{}",
            self.base_url,
            urlencoding::encode(bucket)
        ));
        let response = self
            .with_service_key(request)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let listed: Vec<ListedObject> = response
            .json()
            .await
            .map_err(|e| StorageError::BackendError(format!("Invalid list response: {}", e)))?;

        tracing::debug!(
            bucket = %bucket,
            prefix = %prefix,
            entries = listed.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "HTTP list completed"
        );

        Ok(listed
            .into_iter()
            .map(|object| {
                let (content_type, size) = match object.metadata {
                    Some(metadata) => (metadata.mimetype, metadata.size),
                    None => (None, None),
                };
                ObjectEntry {
                    name: object.name,
                    content_type,
                    size,
                }
            })
            .collect())
    }

    async fn probe(&self, url: &str) -> StorageResult<ProbeResponse> {
        probe_url(&self.client, url).await
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        validate_path(path)?;
        let request = self.client.post(format!(
            "{}/object/sign/{}/{}",
            self.base_url,
            urlencoding::encode(bucket),
            encode_path(path)
        ));
        let response = self
            .with_service_key(request)
            .json(&SignBody {
                expires_in: expires_in.as_secs(),
            })
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let signed: SignedUrlResponse = response
            .json()
            .await
            .map_err(|e| StorageError::BackendError(format!("Invalid sign response: {}", e)))?;

        Ok(self.absolute_url(&signed.signed_url))
    }

    async fn delete(&self, bucket: &str, path: &str) -> StorageResult<()> {
        validate_path(path)?;
        let start = std::time::Instant::now();

        let request = self.client.delete(format!(
            "{}/object/{}",
            self.base_url,
            urlencoding::encode(bucket)
        ));
        let response = self
            .with_service_key(request)
            .json(&DeleteBody {
                prefixes: vec![path],
            })
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

        if !response.status().is_success() {
            let err = rejection(response).await;
            tracing::error!(
                error = %err,
                bucket = %bucket,
                key = %path,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "HTTP delete failed"
            );
            return Err(StorageError::DeleteFailed(err.to_string()));
        }

        tracing::info!(
            bucket = %bucket,
            key = %path,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "HTTP delete successful"
        );

        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.base_url,
            urlencoding::encode(bucket),
            encode_path(path)
        )
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Http
    }
}
