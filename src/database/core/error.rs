//! Error types for the storage layer

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the connection manager and the migration runner
///
/// Nothing here is retried internally: every variant describes a
/// programmer or configuration error and is returned to the caller of the
/// failing operation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database file or its parent directory cannot be created or opened
    #[error("database storage unavailable at '{}': {source}", .path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed SQL, constraint violation or type mismatch
    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// The migrations directory cannot be listed
    #[error("cannot read migrations directory '{}': {source}", .path.display())]
    MigrationDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration could not be read, its script failed, or its ledger
    /// row could not be written. Nothing was recorded for it.
    #[error("migration '{file}' failed: {source}")]
    MigrationFailure {
        file: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type alias for [`StoreError`]
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn storage_unavailable<E>(path: impl Into<PathBuf>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::StorageUnavailable {
            path: path.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn migration_failure<E>(file: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::MigrationFailure {
            file: file.into(),
            source: Box::new(source),
        }
    }

    /// The engine diagnostic behind this error, if the engine produced one
    pub fn engine_error(&self) -> Option<&rusqlite::Error> {
        match self {
            StoreError::Query(e) => Some(e),
            StoreError::StorageUnavailable { source, .. }
            | StoreError::MigrationFailure { source, .. } => {
                source.downcast_ref::<rusqlite::Error>().or_else(|| {
                    source
                        .downcast_ref::<StoreError>()
                        .and_then(StoreError::engine_error)
                })
            }
            StoreError::MigrationDirectory { .. } => None,
        }
    }
}
