//! In-memory object store for tests and local experiments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use jotter_core::{Error, Result};

use crate::ObjectStore;

/// An object held by [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Object store backed by a shared map.
///
/// Clones share the same contents. [`MemoryObjectStore::failing`] builds a
/// store whose writes always fail with `StorageUnavailable`.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    put_calls: Arc<AtomicUsize>,
    fail: bool,
}

/// Prefix of URLs returned by [`MemoryObjectStore`].
pub const MEMORY_URL_PREFIX: &str = "memory://";

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Number of `put_object` calls, including failed ones.
    pub fn put_count(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, key: &str, data: &[u8], content_type: &str) -> Result<String> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::StorageUnavailable(
                "memory store configured to fail".to_string(),
            ));
        }

        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("{}{}", MEMORY_URL_PREFIX, key))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
