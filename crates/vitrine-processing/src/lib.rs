//! Vitrine Processing Library
//!
//! Pre-upload stages of the pipeline: file validation, MIME sniffing and
//! content-type correction, and best-effort image compression.

pub mod compression;
pub mod mime;
pub mod validator;

pub use compression::{compress, compress_blocking, CompressionError};
pub use mime::{
    content_type_for_extension, content_types_for_extension, corrected_content_type, is_image,
    sniff_content_type,
};
pub use validator::{validate, UploadValidator, ValidationError};
