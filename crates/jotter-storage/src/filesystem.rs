//! Local filesystem object store.
//!
//! Objects are written to `{base_path}/{key}` and served by the API under
//! `public_base_url`. Meant for development and single-node deployments.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use jotter_core::{Error, Result};

use crate::ObjectStore;

/// Filesystem storage backend.
#[derive(Debug, Clone)]
pub struct FilesystemObjectStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl FilesystemObjectStore {
    pub fn new(base_path: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a key under the base directory, refusing anything that could
    /// escape it.
    fn full_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::InvalidInput(format!("invalid storage key: {}", key)));
        }
        Ok(self.base_path.join(relative))
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// Check that the backend can write, read and delete files.
    ///
    /// Run once at startup so permission problems fail fast.
    pub async fn validate(&self) -> Result<()> {
        let test_dir = self.base_path.join(".health-check");
        let test_file = test_dir.join("write-check.bin");
        let fail = |step: &str, path: &Path, e: std::io::Error| {
            Error::StorageConfig(format!("{}({:?}): {}", step, path, e))
        };

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| fail("create_dir_all", &test_dir, e))?;

        let data = b"storage-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| fail("write", &test_file, e))?;

        let read_back = fs::read(&test_file)
            .await
            .map_err(|e| fail("read", &test_file, e))?;
        if read_back != data {
            return Err(Error::StorageConfig("read-back mismatch".to_string()));
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| fail("remove_file", &test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await;

        Ok(())
    }

    async fn write_atomic(&self, full_path: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp_name = full_path.as_os_str().to_owned();
        temp_name.push(".part");
        let temp_path = PathBuf::from(temp_name);

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, full_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        // rw-r--r--
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put_object(&self, key: &str, data: &[u8], content_type: &str) -> Result<String> {
        let full_path = self.full_path(key)?;
        debug!(
            subsystem = "storage",
            component = "filesystem",
            storage_key = %key,
            content_type,
            size_bytes = data.len(),
            "Writing object"
        );

        self.write_atomic(&full_path, data).await.map_err(|e| {
            warn!(
                subsystem = "storage",
                component = "filesystem",
                path = %full_path.display(),
                error = %e,
                "Object write failed"
            );
            Error::StorageUnavailable(format!("write {}: {}", full_path.display(), e))
        })?;

        Ok(self.public_url(key))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_path_rejects_traversal() {
        let store = FilesystemObjectStore::new("/srv/files", "http://localhost/files");
        assert!(store.full_path("../etc/passwd").is_err());
        assert!(store.full_path("/etc/passwd").is_err());
        assert!(store.full_path("").is_err());
        assert_eq!(
            store.full_path("abc_file.txt").unwrap(),
            PathBuf::from("/srv/files/abc_file.txt")
        );
    }

    #[test]
    fn test_public_url_trims_trailing_slash() {
        let store = FilesystemObjectStore::new("/srv/files", "http://localhost:8080/files/");
        assert_eq!(
            store.public_url("k_a.txt"),
            "http://localhost:8080/files/k_a.txt"
        );
    }
}
