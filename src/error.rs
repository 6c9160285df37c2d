use std::path::PathBuf;
use thiserror::Error;

use crate::sqlite_persistence::MigrationError;

/// Errors surfaced by the library index.
///
/// Only `NotInitialized` and `MigrationFailed` stop the engine from serving
/// requests. Per-file variants are collected by the scanner, search engine
/// failures trigger the fallback path and never reach callers.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Library store is not initialized")]
    NotInitialized,

    #[error("Migration {version} failed: {reason}")]
    MigrationFailed { version: String, reason: String },

    #[error("Failed to read {path:?}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract metadata from {path:?}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("Full-text search failed: {0}")]
    SearchEngine(#[source] rusqlite::Error),

    #[error("A scan is already in progress")]
    ConcurrentScanRejected,

    #[error("Directory not found: {0:?}")]
    DirectoryNotFound(PathBuf),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<MigrationError> for LibraryError {
    fn from(err: MigrationError) -> Self {
        LibraryError::MigrationFailed {
            version: err.version,
            reason: err.source.to_string(),
        }
    }
}

impl LibraryError {
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LibraryError::FileRead {
            path: path.into(),
            source,
        }
    }

    pub fn extraction(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        LibraryError::Extraction {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error only concerns a single file.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            LibraryError::FileRead { .. } | LibraryError::Extraction { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
