//! Lightweight URL probing shared by the HTTP and S3 backends.

use reqwest::header::{CONTENT_TYPE, RANGE};
use reqwest::{Client, Response, StatusCode};

use crate::traits::{ProbeResponse, StorageError, StorageResult};

/// Media type of a response without parameters, lowercased.
pub fn response_content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(normalize_content_type)
        .filter(|ct| !ct.is_empty())
}

/// `"Image/PNG; charset=binary"` -> `"image/png"`
pub fn normalize_content_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

pub fn map_reqwest_error(err: reqwest::Error) -> StorageError {
    if err.is_timeout() {
        StorageError::Timeout(err.to_string())
    } else {
        StorageError::Network(err.to_string())
    }
}

/// HEAD the URL; servers that refuse HEAD get a single-byte ranged GET instead.
pub async fn probe_url(client: &Client, url: &str) -> StorageResult<ProbeResponse> {
    let start = std::time::Instant::now();

    let mut response = client.head(url).send().await.map_err(map_reqwest_error)?;
    if response.status() == StatusCode::METHOD_NOT_ALLOWED {
        response = client
            .get(url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await
            .map_err(map_reqwest_error)?;
    }

    let probe = ProbeResponse {
        status: response.status().as_u16(),
        content_type: response_content_type(&response),
    };

    tracing::debug!(
        url = %url,
        status = probe.status,
        content_type = ?probe.content_type,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "URL probe completed"
    );

    Ok(probe)
}
