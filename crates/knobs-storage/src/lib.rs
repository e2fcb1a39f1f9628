//! Storage backend abstraction for `knobs`.
//!
//! This crate defines the [`StorageBackend`] trait, a namespaced key-value
//! storage interface that knows nothing about settings, value kinds, or
//! forms. Typed access (booleans, integers, floats, strings) is layered on
//! top of it by `knobs-core`.
//!
//! Every value lives in exactly one namespace. A settings block owns one
//! namespace and writes one key per scalar field (or one key per array
//! element), so namespaces and keys are short identifiers, validated by
//! [`validate_name`].
//!
//! Three implementations are provided:
//!
//! - [`RedbBackend`]: default, pure Rust, one table per namespace (feature `redb-backend`)
//! - [`RocksDbBackend`]: backed by `RocksDB` (feature `rocksdb-backend`)
//! - [`MemoryBackend`]: in-memory, for tests and development

mod error;
mod memory;
#[cfg(feature = "redb-backend")]
mod redb_backend;
#[cfg(feature = "rocksdb-backend")]
mod rocksdb_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
#[cfg(feature = "rocksdb-backend")]
pub use rocksdb_backend::RocksDbBackend;

/// Maximum length of a namespace or key, in bytes.
pub const MAX_NAME_LEN: usize = 15;

/// Check that `name` is usable as a namespace or key.
///
/// Names are 1 to [`MAX_NAME_LEN`] characters of `[A-Za-z0-9_-]`. The
/// restriction keeps keys portable across backends and lets the `RocksDB`
/// backend use `/` as an unambiguous namespace separator.
///
/// # Errors
///
/// Returns [`StorageError::InvalidName`] describing the first violated rule.
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.len() > MAX_NAME_LEN {
        "must be at most 15 characters"
    } else if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        "may only contain alphanumeric characters, '_' and '-'"
    } else {
        return Ok(());
    };

    Err(StorageError::InvalidName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    })
}

/// A pluggable, namespaced key-value storage backend.
///
/// Values are opaque byte arrays; their encoding is decided by the caller.
/// Writes to different keys are independent: there is no transaction
/// spanning several `put` calls.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a value.
    ///
    /// Returns `Ok(None)` if the key (or the whole namespace) does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a value, overwriting any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidName`] for malformed names and
    /// [`StorageError::Write`] if the underlying backend fails.
    async fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove a key. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Remove`] if the underlying backend fails.
    async fn remove(&self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// List every key stored in `namespace`, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the underlying backend fails.
    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

    /// Check whether a key exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn contains(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(namespace, key).await?.is_some())
    }

    /// Remove every key in `namespace`.
    ///
    /// The default implementation lists the keys and removes them one by
    /// one. Backends may override this with a bulk operation.
    ///
    /// # Errors
    ///
    /// Returns the first [`StorageError`] raised while listing or removing.
    async fn clear(&self, namespace: &str) -> Result<(), StorageError> {
        for key in self.keys(namespace).await? {
            self.remove(namespace, &key).await?;
        }
        Ok(())
    }
}
