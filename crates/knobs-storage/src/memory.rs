//! In-memory storage backend.
//!
//! Namespaces map to their own `BTreeMap` behind a single `RwLock`. Nothing
//! is persisted; all data is lost when the process exits. Used by unit and
//! integration tests and by `KNOBS_STORAGE=memory`.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{StorageBackend, StorageError, validate_name};

type Namespaces = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// An in-memory backend. Clones share the same data.
///
/// # Examples
///
/// ```
/// # use knobs_storage::{MemoryBackend, StorageBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// backend.put("hydro", "targetEC", b"data").await.unwrap();
/// let val = backend.get("hydro", "targetEC").await.unwrap();
/// assert_eq!(val, Some(b"data".to_vec()));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<Namespaces>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_name(namespace)?;
        validate_name(key)?;
        let mut data = self.data.write().await;
        data.entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        if let Some(ns) = data.get_mut(namespace) {
            ns.remove(key);
            if ns.is_empty() {
                data.remove(namespace);
            }
        }
        Ok(())
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        let data = self.data.read().await;
        Ok(data
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn contains(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(namespace).is_some_and(|ns| ns.contains_key(key)))
    }

    async fn clear(&self, namespace: &str) -> Result<(), StorageError> {
        self.data.write().await.remove(namespace);
        Ok(())
    }
}
