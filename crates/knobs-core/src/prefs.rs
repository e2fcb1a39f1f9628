//! Typed, namespaced view over a storage backend.
//!
//! [`Preferences`] is opened for one namespace around each bulk load or
//! save. Values are encoded as:
//!
//! | kind    | bytes                     |
//! |---------|---------------------------|
//! | bool    | one byte, `0` or `1`      |
//! | integer | `i32`, 4 bytes little-endian |
//! | float   | `f32`, 4 bytes little-endian |
//! | string  | UTF-8                     |
//!
//! Reads never fail: a missing key, a value of the wrong shape, or a backend
//! error yields the caller's default, and the latter two are logged.

use std::sync::Arc;

use knobs_storage::{StorageBackend, StorageError};
use tracing::warn;

use crate::value::{Value, ValueKind};

/// A namespaced handle onto a shared storage backend.
#[derive(Clone)]
pub struct Preferences {
    storage: Arc<dyn StorageBackend>,
    namespace: String,
}

impl std::fmt::Debug for Preferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preferences")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl Preferences {
    /// Open the namespace `namespace` on `storage`.
    #[must_use]
    pub fn open(storage: Arc<dyn StorageBackend>, namespace: impl Into<String>) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
        }
    }

    /// The namespace this handle reads and writes.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        match self.storage.get(&self.namespace, key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(namespace = %self.namespace, key, error = %e, "store read failed, using default");
                None
            }
        }
    }

    fn malformed(&self, key: &str, kind: ValueKind, len: usize) {
        warn!(
            namespace = %self.namespace,
            key,
            kind = %kind,
            len,
            "stored value has the wrong shape, using default"
        );
    }

    pub async fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.raw(key).await.as_deref() {
            None => default,
            Some([b]) => *b != 0,
            Some(other) => {
                self.malformed(key, ValueKind::Boolean, other.len());
                default
            }
        }
    }

    pub async fn get_int(&self, key: &str, default: i32) -> i32 {
        match self.raw(key).await {
            None => default,
            Some(bytes) => match <[u8; 4]>::try_from(bytes.as_slice()) {
                Ok(raw) => i32::from_le_bytes(raw),
                Err(_) => {
                    self.malformed(key, ValueKind::Integer, bytes.len());
                    default
                }
            },
        }
    }

    pub async fn get_float(&self, key: &str, default: f32) -> f32 {
        match self.raw(key).await {
            None => default,
            Some(bytes) => match <[u8; 4]>::try_from(bytes.as_slice()) {
                Ok(raw) => f32::from_le_bytes(raw),
                Err(_) => {
                    self.malformed(key, ValueKind::Float, bytes.len());
                    default
                }
            },
        }
    }

    pub async fn get_string(&self, key: &str, default: &str) -> String {
        match self.raw(key).await {
            None => default.to_owned(),
            Some(bytes) => String::from_utf8(bytes).unwrap_or_else(|e| {
                self.malformed(key, ValueKind::Text, e.as_bytes().len());
                default.to_owned()
            }),
        }
    }

    /// # Errors
    ///
    /// Propagates the backend's [`StorageError`].
    pub async fn put_bool(&self, key: &str, value: bool) -> Result<(), StorageError> {
        self.storage
            .put(&self.namespace, key, &[u8::from(value)])
            .await
    }

    /// # Errors
    ///
    /// Propagates the backend's [`StorageError`].
    pub async fn put_int(&self, key: &str, value: i32) -> Result<(), StorageError> {
        self.storage
            .put(&self.namespace, key, &value.to_le_bytes())
            .await
    }

    /// # Errors
    ///
    /// Propagates the backend's [`StorageError`].
    pub async fn put_float(&self, key: &str, value: f32) -> Result<(), StorageError> {
        self.storage
            .put(&self.namespace, key, &value.to_le_bytes())
            .await
    }

    /// # Errors
    ///
    /// Propagates the backend's [`StorageError`].
    pub async fn put_string(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage
            .put(&self.namespace, key, value.as_bytes())
            .await
    }

    /// Read `key` with the accessor matching `current`'s kind, falling back
    /// to `current` itself.
    pub async fn get_value(&self, key: &str, current: &Value) -> Value {
        match current {
            Value::Boolean(v) => Value::Boolean(self.get_bool(key, *v).await),
            Value::Integer(v) => Value::Integer(self.get_int(key, *v).await),
            Value::Float(v) => Value::Float(self.get_float(key, *v).await),
            Value::Text(v) => Value::Text(self.get_string(key, v).await),
        }
    }

    /// Write `value` with the accessor matching its kind.
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`StorageError`].
    pub async fn put_value(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        match value {
            Value::Boolean(v) => self.put_bool(key, *v).await,
            Value::Integer(v) => self.put_int(key, *v).await,
            Value::Float(v) => self.put_float(key, *v).await,
            Value::Text(v) => self.put_string(key, v).await,
        }
    }

    /// Keys currently stored in this namespace.
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`StorageError`].
    pub async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.storage.keys(&self.namespace).await
    }

    /// Remove every key in this namespace.
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`StorageError`].
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.storage.clear(&self.namespace).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use knobs_storage::MemoryBackend;

    fn prefs() -> (Arc<MemoryBackend>, Preferences) {
        let backend = Arc::new(MemoryBackend::new());
        let prefs = Preferences::open(backend.clone(), "hydro");
        (backend, prefs)
    }

    #[tokio::test]
    async fn missing_keys_return_defaults() {
        let (_, prefs) = prefs();
        assert!(prefs.get_bool("dryRun", true).await);
        assert_eq!(prefs.get_int("dayLength", 16).await, 16);
        assert_eq!(prefs.get_float("targetEC", 1.2).await, 1.2);
        assert_eq!(prefs.get_string("name", "tank").await, "tank");
    }

    #[tokio::test]
    async fn typed_values_round_trip() {
        let (_, prefs) = prefs();
        prefs.put_bool("dryRun", false).await.unwrap();
        prefs.put_int("dayLength", -3).await.unwrap();
        prefs.put_float("targetEC", 1.35).await.unwrap();
        prefs.put_string("name", "tänk").await.unwrap();

        assert!(!prefs.get_bool("dryRun", true).await);
        assert_eq!(prefs.get_int("dayLength", 0).await, -3);
        assert_eq!(prefs.get_float("targetEC", 0.0).await, 1.35);
        assert_eq!(prefs.get_string("name", "").await, "tänk");
    }

    #[tokio::test]
    async fn encoding_is_little_endian() {
        let (backend, prefs) = prefs();
        prefs.put_int("lvl_0", 1).await.unwrap();
        prefs.put_bool("dryRun", true).await.unwrap();
        assert_eq!(
            backend.get("hydro", "lvl_0").await.unwrap(),
            Some(vec![1, 0, 0, 0])
        );
        assert_eq!(backend.get("hydro", "dryRun").await.unwrap(), Some(vec![1]));
    }

    #[tokio::test]
    async fn wrong_shape_falls_back_to_default() {
        let (backend, prefs) = prefs();
        backend.put("hydro", "dayLength", b"xy").await.unwrap();
        backend.put("hydro", "dryRun", b"true").await.unwrap();
        backend.put("hydro", "name", &[0xff, 0xfe]).await.unwrap();

        assert_eq!(prefs.get_int("dayLength", 16).await, 16);
        assert!(prefs.get_bool("dryRun", true).await);
        assert_eq!(prefs.get_string("name", "tank").await, "tank");
    }

    #[tokio::test]
    async fn value_dispatch_follows_kind() {
        let (_, prefs) = prefs();
        prefs.put_value("targetEC", &Value::Float(2.5)).await.unwrap();
        assert_eq!(
            prefs.get_value("targetEC", &Value::Float(0.0)).await,
            Value::Float(2.5)
        );
        assert_eq!(
            prefs.get_value("absent", &Value::Text("x".to_owned())).await,
            Value::Text("x".to_owned())
        );
    }
}
