//! Error types
//!
//! Structured errors for backend operations and cache persistence.
//! Not-found and already-exists come from the backend and pass through the
//! cache unchanged; persistence failures come from the snapshot store.

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Storage and cache error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    /// The path exists but is a directory
    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Invalid root: {0}")]
    InvalidRoot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache persistence failed: {0}")]
    Persist(#[from] PersistError),
}

/// Snapshot persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

impl Error {
    /// Whether the backend reported the path as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::DirectoryNotFound(_))
    }
}

/// Turn a backend not-found into an explicit absent value.
///
/// Every other error is passed through.
pub fn found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
