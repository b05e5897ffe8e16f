use burrow_backend::BackendError;
use burrow_types::PathError;
use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No folder exists at the given path.
    #[error("folder not found: {0}")]
    NotFound(String),

    /// A caller-supplied path or name is malformed.
    #[error(transparent)]
    Path(#[from] PathError),

    /// The persistence backend failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The configuration is invalid or unreadable.
    #[error("invalid config: {0}")]
    Config(String),

    /// I/O error while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
