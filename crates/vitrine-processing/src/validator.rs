use std::path::Path;

use vitrine_core::{ClassifiedError, ErrorKind, UploadConstraints, UploadRequest};

use crate::mime::{
    content_types_for_extension, corrected_content_type, has_signature, sniff_content_type,
};

/// Common validation errors for candidate files
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Invalid file extension: {extension} (allowed: {allowed:?})")]
    InvalidExtension {
        extension: String,
        allowed: Vec<String>,
    },

    #[error("Invalid content type: {content_type} (allowed: {allowed:?})")]
    InvalidContentType {
        content_type: String,
        allowed: Vec<String>,
    },

    /// Payload bytes say one thing, the filename another
    #[error("Content does not match extension: .{extension} file contains {sniffed}")]
    ContentTypeMismatch { extension: String, sniffed: String },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Empty file")]
    EmptyFile,
}

impl ValidationError {
    /// Terminal pipeline error for this rejection.
    pub fn classify(&self, file_name: &str) -> ClassifiedError {
        ClassifiedError::new(ErrorKind::Validation, file_name, self.to_string())
    }
}

/// Upload validator
///
/// Pure checks over the payload and filename; never touches the network.
pub struct UploadValidator {
    max_file_size: usize,
    allowed_extensions: Vec<String>,
    allowed_mime_prefixes: Vec<String>,
}

impl UploadValidator {
    pub fn new(
        max_file_size: usize,
        allowed_extensions: Vec<String>,
        allowed_mime_prefixes: Vec<String>,
    ) -> Self {
        Self {
            max_file_size,
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            allowed_mime_prefixes: allowed_mime_prefixes
                .into_iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    pub fn from_constraints(constraints: &UploadConstraints) -> Self {
        Self::new(
            constraints.max_size_bytes,
            constraints.allowed_extensions.clone(),
            constraints.allowed_mime_prefixes.clone(),
        )
    }

    /// Validate file size
    pub fn validate_file_size(&self, size: usize) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        Ok(())
    }

    /// Validate file extension
    pub fn validate_extension(&self, filename: &str) -> Result<String, ValidationError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .ok_or_else(|| ValidationError::InvalidFilename(filename.to_string()))?;

        if !self.allowed_extensions.contains(&extension) {
            return Err(ValidationError::InvalidExtension {
                extension,
                allowed: self.allowed_extensions.clone(),
            });
        }

        Ok(extension)
    }

    /// Validate content type against the allowed MIME prefixes
    pub fn validate_content_type(&self, content_type: &str) -> Result<(), ValidationError> {
        let normalized = content_type.to_lowercase();

        if !self
            .allowed_mime_prefixes
            .iter()
            .any(|prefix| normalized.starts_with(prefix.as_str()))
        {
            return Err(ValidationError::InvalidContentType {
                content_type: content_type.to_string(),
                allowed: self.allowed_mime_prefixes.clone(),
            });
        }

        Ok(())
    }

    /// Reject payloads whose magic bytes contradict the extension.
    ///
    /// Extensions whose formats always carry a signature must match it;
    /// text-like and unknown extensions are only checked when the bytes
    /// are recognized.
    pub fn validate_extension_content_match(
        &self,
        extension: &str,
        data: &[u8],
    ) -> Result<(), ValidationError> {
        let Some(sniffed) = sniff_content_type(data) else {
            if has_signature(extension) {
                return Err(ValidationError::ContentTypeMismatch {
                    extension: extension.to_string(),
                    sniffed: "unrecognized content".to_string(),
                });
            }
            return Ok(());
        };
        let expected = content_types_for_extension(extension);
        if expected.is_empty() {
            tracing::debug!(
                extension = %extension,
                sniffed = %sniffed,
                "Unknown extension, skipping content/extension cross-validation"
            );
            return Ok(());
        }

        if !expected.contains(&sniffed) {
            return Err(ValidationError::ContentTypeMismatch {
                extension: extension.to_string(),
                sniffed: sniffed.to_string(),
            });
        }

        Ok(())
    }

    /// Validate all aspects of a file. Returns the corrected content type.
    pub fn validate_all(
        &self,
        filename: &str,
        declared_content_type: Option<&str>,
        data: &[u8],
    ) -> Result<String, ValidationError> {
        self.validate_file_size(data.len())?;
        let extension = self.validate_extension(filename)?;
        self.validate_extension_content_match(&extension, data)?;
        let content_type = corrected_content_type(filename, declared_content_type, data);
        self.validate_content_type(&content_type)?;
        Ok(content_type)
    }
}

/// Validate an upload request against its own constraints.
pub fn validate(request: &UploadRequest) -> Result<String, ValidationError> {
    UploadValidator::from_constraints(&request.constraints).validate_all(
        &request.file_name,
        request.declared_content_type.as_deref(),
        &request.data,
    )
}
