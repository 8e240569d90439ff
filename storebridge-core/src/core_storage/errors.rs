use thiserror::Error;

/// Errors reported by a storage collaborator
#[derive(Debug, Error)]
pub enum StorageError {
    /// Opening the underlying database failed
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// A read or write failed
    #[error("Storage I/O error: {0}")]
    Io(String),

    /// Storage was closed
    #[error("Storage closed")]
    Closed,
}

pub type StorageResult<T> = Result<T, StorageError>;
