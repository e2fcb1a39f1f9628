//! Pure-Rust redb storage backend, the default.
//!
//! Each namespace is its own redb table, created on first write. Reading
//! from a namespace that was never written behaves like an empty namespace.
//! All blocking redb calls run on the Tokio blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition, TableError};
use tokio::task::JoinError;

use crate::{StorageBackend, StorageError, validate_name};

fn table_def(namespace: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(namespace)
}

fn transaction_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

fn join_error(e: &JoinError) -> StorageError {
    StorageError::Transaction {
        reason: format!("blocking task panicked: {e}"),
    }
}

/// A storage backend backed by a single redb database file.
///
/// Cheap to clone (`Arc<Database>` internally).
///
/// # Examples
///
/// ```no_run
/// # use knobs_storage::RedbBackend;
/// let backend = RedbBackend::open("/var/lib/knobs/settings.redb").unwrap();
/// ```
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if redb fails to open or create the
    /// database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| StorageError::Open {
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
impl StorageBackend for RedbBackend {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let db = Arc::clone(&self.db);
        let namespace = namespace.to_owned();
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(transaction_error)?;
            let table = match txn.open_table(table_def(&namespace)) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(e) => {
                    return Err(StorageError::Read {
                        namespace: namespace.clone(),
                        key: key.clone(),
                        reason: e.to_string(),
                    });
                }
            };
            let value = table
                .get(key.as_str())
                .map_err(|e| StorageError::Read {
                    namespace: namespace.clone(),
                    key: key.clone(),
                    reason: e.to_string(),
                })?
                .map(|v| v.value().to_vec());
            Ok(value)
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
            let write_error = |e: &dyn std::fmt::Display| StorageError::Write {
                namespace: namespace.clone(),
                key: key.clone(),
                reason: e.to_string(),
            };
            let txn = db.begin_write().map_err(transaction_error)?;
            {
                // Opening a table in a write transaction creates it.
                let mut table = txn
                    .open_table(table_def(&namespace))
                    .map_err(|e| write_error(&e))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| write_error(&e))?;
            }
            txn.commit().map_err(transaction_error)
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);
        let namespace = namespace.to_owned();
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(transaction_error)?;
            {
                let mut table = txn.open_table(table_def(&namespace)).map_err(|e| {
                    StorageError::Remove {
                        namespace: namespace.clone(),
                        key: key.clone(),
                        reason: e.to_string(),
                    }
                })?;
                table
                    .remove(key.as_str())
                    .map_err(|e| StorageError::Remove {
                        namespace: namespace.clone(),
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
            }
            txn.commit().map_err(transaction_error)
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        let db = Arc::clone(&self.db);
        let namespace = namespace.to_owned();
        tokio::task::spawn_blocking(move || {
            let list_error = |e: &dyn std::fmt::Display| StorageError::List {
                namespace: namespace.clone(),
                reason: e.to_string(),
            };
            let txn = db.begin_read().map_err(transaction_error)?;
            let table = match txn.open_table(table_def(&namespace)) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(e) => return Err(list_error(&e)),
            };

            let mut keys = Vec::new();
            for item in table.iter().map_err(|e| list_error(&e))? {
                let (k, _) = item.map_err(|e| list_error(&e))?;
                keys.push(k.value().to_owned());
            }
            Ok(keys)
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn clear(&self, namespace: &str) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);
        let namespace = namespace.to_owned();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(transaction_error)?;
            txn.delete_table(table_def(&namespace))
                .map_err(|e| StorageError::List {
                    namespace: namespace.clone(),
                    reason: e.to_string(),
                })?;
            txn.commit().map_err(transaction_error)
        })
        .await
        .map_err(|e| join_error(&e))?
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, RedbBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("settings.redb")).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn unknown_namespace_reads_as_empty() {
        let (_dir, backend) = open_temp();
        assert_eq!(backend.get("hydro", "targetEC").await.unwrap(), None);
        assert!(backend.keys("hydro").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn put_get_and_list() {
        let (_dir, backend) = open_temp();
        backend.put("light", "lvl_1", b"2").await.unwrap();
        backend.put("light", "lvl_0", b"1").await.unwrap();
        backend.put("hydro", "dryRun", b"\x01").await.unwrap();

        assert_eq!(
            backend.get("light", "lvl_0").await.unwrap(),
            Some(b"1".to_vec())
        );
        assert_eq!(backend.keys("light").await.unwrap(), vec!["lvl_0", "lvl_1"]);
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let (_dir, backend) = open_temp();
        backend.put("light", "a", b"1").await.unwrap();
        backend.put("light", "b", b"2").await.unwrap();

        backend.remove("light", "a").await.unwrap();
        backend.remove("light", "missing").await.unwrap();
        assert_eq!(backend.keys("light").await.unwrap(), vec!["b"]);

        backend.clear("light").await.unwrap();
        assert!(backend.keys("light").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.redb");
        {
            let backend = RedbBackend::open(&path).unwrap();
            backend.put("hydro", "targetEC", b"abcd").await.unwrap();
        }
        let backend = RedbBackend::open(&path).unwrap();
        assert_eq!(
            backend.get("hydro", "targetEC").await.unwrap(),
            Some(b"abcd".to_vec())
        );
    }
}
