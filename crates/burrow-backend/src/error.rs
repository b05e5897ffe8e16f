use std::io;

use burrow_types::PathError;

use crate::traits::BackendKind;

/// Errors from persistence backends.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The stored representation is malformed.
    #[error("corrupt document at {location}: {reason}")]
    CorruptDocument { location: String, reason: String },

    /// The backend's layout cannot represent a folder with this name.
    #[error("name {name:?} is reserved by the {backend} backend")]
    ReservedName { name: String, backend: BackendKind },

    /// A stored path or name failed validation.
    #[error(transparent)]
    Path(#[from] PathError),

    /// A lock guarding shared backend state was poisoned.
    #[error("lock poisoned: {0}")]
    Poisoned(String),

    /// The write executor could not be started.
    #[error("executor error: {0}")]
    Executor(String),
}

impl BackendError {
    pub(crate) fn corrupt(location: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::CorruptDocument {
            location: location.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
