//! Error types for `knobs-core`.
//!
//! Parsing user input never produces an error (malformed text degrades to a
//! default value). Errors are reserved for programming mistakes caught at
//! registration time and for storage failures while saving.

use knobs_storage::StorageError;

use crate::value::ValueKind;

/// Errors from building or mutating a settings block.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Two entries of one block would write the same storage key.
    #[error("duplicate key '{key}' in block '{namespace}'")]
    DuplicateKey { namespace: String, key: String },

    /// A namespace or key is not a valid storage name.
    #[error("invalid name: {0}")]
    InvalidName(#[source] StorageError),

    /// A block path cannot be routed.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A value of the wrong kind was assigned to a field.
    #[error("field '{key}' holds {expected} values, got {actual}")]
    KindMismatch {
        key: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    /// An array element index was outside the array.
    #[error("index {index} out of range for '{key}' (length {len})")]
    IndexOutOfRange {
        key: String,
        index: usize,
        len: usize,
    },

    /// No entry with the given key is registered.
    #[error("no field '{key}' in block '{namespace}'")]
    UnknownKey { namespace: String, key: String },

    /// The storage backend failed.
    #[error("settings storage error: {0}")]
    Storage(#[from] StorageError),
}
