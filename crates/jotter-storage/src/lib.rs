//! # jotter-storage
//!
//! Object storage for note attachments.
//!
//! Backends:
//! - [`S3ObjectStore`]: AWS S3 or an S3-compatible service, requests signed
//!   with AWS Signature Version 4 using static keys or instance profile
//!   credentials
//! - [`FilesystemObjectStore`]: a local directory, for development
//! - [`MemoryObjectStore`]: in-process map, for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use jotter_storage::{generate_storage_key, ObjectStore, S3Config, S3ObjectStore};
//!
//! let store = S3ObjectStore::new(S3Config::from_env()?)?;
//! let key = generate_storage_key(Some("report.pdf"));
//! let url = store.put_object(&key, &data, "application/pdf").await?;
//! ```

use async_trait::async_trait;

use jotter_core::Result;

pub mod credentials;
pub mod filesystem;
pub mod keys;
pub mod memory;
pub mod s3;
pub mod sigv4;

pub use credentials::{AwsCredentials, CredentialSource, CredentialsProvider};
pub use filesystem::FilesystemObjectStore;
pub use keys::generate_storage_key;
pub use memory::{MemoryObjectStore, StoredObject, MEMORY_URL_PREFIX};
pub use s3::{S3Config, S3ObjectStore, DEFAULT_REGION};

/// Content type used when an upload does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Storage backend for uploaded attachments.
///
/// Implementations are shared across concurrent requests and must not need
/// external locking.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key` and return the object's public URL.
    ///
    /// Failures are reported as `Error::StorageUnavailable` (service or
    /// transport) or `Error::StorageConfig` (credentials, bucket).
    async fn put_object(&self, key: &str, data: &[u8], content_type: &str) -> Result<String>;

    /// Short backend name for logs ("s3", "filesystem", "memory").
    fn backend_name(&self) -> &'static str;
}
