//! Storage error types.
//!
//! Every variant names the namespace and key involved so a failed load or
//! save can be diagnosed from the log line alone.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to open the storage backend at the given path.
    #[error("failed to open storage at '{path}': {reason}")]
    Open { path: String, reason: String },

    /// Failed to read a value.
    #[error("failed to read '{namespace}/{key}': {reason}")]
    Read {
        namespace: String,
        key: String,
        reason: String,
    },

    /// Failed to write a value.
    #[error("failed to write '{namespace}/{key}': {reason}")]
    Write {
        namespace: String,
        key: String,
        reason: String,
    },

    /// Failed to remove a key.
    #[error("failed to remove '{namespace}/{key}': {reason}")]
    Remove {
        namespace: String,
        key: String,
        reason: String,
    },

    /// Failed to list the keys of a namespace.
    #[error("failed to list namespace '{namespace}': {reason}")]
    List { namespace: String, reason: String },

    /// Failed to begin or commit a transaction.
    #[error("transaction failed: {reason}")]
    Transaction { reason: String },

    /// A namespace or key does not satisfy the naming rules.
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}
