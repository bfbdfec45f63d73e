//! Shared object naming for storage backends.
//!
//! Path format: `{prefix}/{unix_millis}-{random}.{ext}`. The random suffix keeps
//! concurrent uploads into the same prefix from colliding.

use rand::distr::Alphanumeric;
use rand::Rng;

use crate::traits::{StorageError, StorageResult};

const RANDOM_SUFFIX_LEN: usize = 8;
const MAX_EXTENSION_LEN: usize = 10;

/// Make a user-supplied filename safe to embed in a path.
pub fn sanitize_filename(filename: &str) -> String {
    const MAX: usize = 255;
    let path = std::path::Path::new(filename);
    let base = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    if base.contains("..") {
        return "invalid_filename".to_string();
    }
    let s: String = base
        .chars()
        .take(MAX)
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if s.trim().is_empty() || s.len() < 3 {
        "file".to_string()
    } else {
        s
    }
}

/// Lowercased, alphanumeric-only extension of `filename`, if it has a usable one.
fn clean_extension(filename: &str) -> Option<String> {
    let sanitized = sanitize_filename(filename);
    let (_, ext) = sanitized.rsplit_once('.')?;
    let ext: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXTENSION_LEN)
        .collect::<String>()
        .to_lowercase();
    (!ext.is_empty()).then_some(ext)
}

/// Unique object name derived from the original filename's extension.
pub fn generate_object_name(original_filename: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    let millis = chrono::Utc::now().timestamp_millis();

    match clean_extension(original_filename) {
        Some(ext) => format!("{}-{}.{}", millis, suffix, ext),
        None => format!("{}-{}", millis, suffix),
    }
}

/// Join a prefix and an object name into a bucket-relative path.
pub fn object_path(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Split a path into (prefix, name) at the last `/`.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((prefix, name)) => (prefix, name),
        None => ("", path),
    }
}

/// Reject paths that could escape the bucket or address its root.
pub fn validate_path(path: &str) -> StorageResult<()> {
    if path.is_empty() {
        return Err(StorageError::InvalidKey("Object path is empty".to_string()));
    }
    if path.contains("..") || path.starts_with('/') || path.contains('\\') {
        return Err(StorageError::InvalidKey(
            "Object path contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Percent-encode each path segment, keeping the separators.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
