//! Vitrine Storage Library
//!
//! Object-storage abstraction used by the upload pipeline, with backends for an
//! HTTP object API (bearer-token authenticated), S3 and the local filesystem.
//!
//! # Object path format
//!
//! Objects live at `{prefix}/{name}` inside a bucket, where `name` is
//! `{unix_millis}-{random}.{ext}`. Paths must not contain `..` or start with
//! `/`. Path generation is centralized in the `keys` module so all backends
//! stay consistent.
//!
//! # Listing
//!
//! [`Storage::list`] returns entries whose `name` is relative to the listed
//! prefix, so callers match on the bare object name whatever the backend.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-http")]
pub mod http;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod probe;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-http")]
pub use http::HttpObjectStorage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ObjectEntry, ProbeResponse, Storage, StorageError, StorageResult, StoredObject};
pub use vitrine_core::StorageBackend;
