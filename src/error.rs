//! Error types for tincan-persist.
//!
//! Only construction and the raw key/value boundary can fail. Everything a
//! bound value exposes afterwards absorbs failures and degrades to a default
//! or a no-op.

use thiserror::Error;

/// Failure to establish a persisted binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    /// A scoped binding needs an enclosing component scope to own its effects.
    #[error("scoped binding created outside of a component scope")]
    NoComponentScope,

    /// The enclosing component scope has already been torn down.
    #[error("scoped binding created inside a disposed component scope")]
    ScopeDisposed,
}

/// Failure reported by a [`KeyValueStore`](crate::platform::KeyValueStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Writing the entry would exceed the store's byte quota.
    #[error("storage quota of {quota} bytes exceeded while writing `{key}`")]
    QuotaExceeded { key: String, quota: usize },

    /// Any other backend failure, described by the backend.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Result type alias
pub type Result<T, E = PersistError> = std::result::Result<T, E>;
