//! Error types for the storage crate.

use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Storage error types.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database open/create failure.
    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction could not be started.
    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table could not be opened.
    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    /// Row-level storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    /// Commit failure.
    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Persisted value failed validation on load.
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}
