//! `RocksDB` storage backend.
//!
//! Namespaced keys are flattened to `"{namespace}/{key}"`. [`validate_name`]
//! forbids `/` inside both parts, so the flattening is unambiguous and a
//! namespace listing is a plain prefix scan. All blocking `RocksDB` calls are
//! dispatched to [`tokio::task::spawn_blocking`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rocksdb::{DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options, WriteBatch};
use tokio::task::JoinError;

use crate::{StorageBackend, StorageError, validate_name};

type Db = DBWithThreadMode<MultiThreaded>;

fn flat_key(namespace: &str, key: &str) -> String {
    format!("{namespace}/{key}")
}

fn join_error(e: &JoinError) -> StorageError {
    StorageError::Transaction {
        reason: format!("blocking task panicked: {e}"),
    }
}

/// Scan every key under `namespace/`, returning the un-prefixed key names.
fn scan_namespace(db: &Db, namespace: &str) -> Result<Vec<String>, StorageError> {
    let prefix = format!("{namespace}/");
    let list_error = |reason: String| StorageError::List {
        namespace: namespace.to_owned(),
        reason,
    };

    let mut keys = Vec::new();
    for item in db.iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward)) {
        let (k, _) = item.map_err(|e| list_error(e.to_string()))?;
        let flat = std::str::from_utf8(&k).map_err(|e| list_error(e.to_string()))?;
        let Some(key) = flat.strip_prefix(&prefix) else {
            break;
        };
        keys.push(key.to_owned());
    }
    Ok(keys)
}

/// A storage backend backed by `RocksDB`.
///
/// Thread-safe (`Arc<DB>` internally) and cheap to clone.
///
/// # Examples
///
/// ```no_run
/// # use knobs_storage::RocksDbBackend;
/// let backend = RocksDbBackend::open("/var/lib/knobs/data").unwrap();
/// ```
#[derive(Clone)]
pub struct RocksDbBackend {
    db: Arc<Db>,
    path: PathBuf,
}

impl std::fmt::Debug for RocksDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RocksDbBackend {
    /// Open a `RocksDB` database at the given path, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if `RocksDB` fails to open or create the
    /// database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = Db::open(&opts, path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Return the filesystem path of this database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl StorageBackend for RocksDbBackend {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let db = Arc::clone(&self.db);
        let namespace = namespace.to_owned();
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            db.get(flat_key(&namespace, &key).as_bytes())
                .map_err(|e| StorageError::Read {
                    namespace,
                    key,
                    reason: e.to_string(),
                })
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_name(namespace)?;
        validate_name(key)?;
        let db = Arc::clone(&self.db);
        let namespace = namespace.to_owned();
        let key = key.to_owned();
        let value = value.to_vec();
        tokio::task::spawn_blocking(move || {
            db.put(flat_key(&namespace, &key).as_bytes(), &value)
                .map_err(|e| StorageError::Write {
                    namespace,
                    key,
                    reason: e.to_string(),
                })
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);
        let namespace = namespace.to_owned();
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            db.delete(flat_key(&namespace, &key).as_bytes())
                .map_err(|e| StorageError::Remove {
                    namespace,
                    key,
                    reason: e.to_string(),
                })
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        let db = Arc::clone(&self.db);
        let namespace = namespace.to_owned();
        tokio::task::spawn_blocking(move || scan_namespace(&db, &namespace))
            .await
            .map_err(|e| join_error(&e))?
    }

    async fn clear(&self, namespace: &str) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);
        let namespace = namespace.to_owned();
        tokio::task::spawn_blocking(move || {
            let mut batch = WriteBatch::default();
            for key in scan_namespace(&db, &namespace)? {
                batch.delete(flat_key(&namespace, &key).as_bytes());
            }
            db.write(batch).map_err(|e| StorageError::Transaction {
                reason: e.to_string(),
            })
        })
        .await
        .map_err(|e| join_error(&e))?
    }
}
