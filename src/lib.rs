//! Pezzottify Library
//!
//! Local music library index: scans directories of audio files into an
//! embedded SQLite store, keeps it in sync with the filesystem, and serves
//! search, filtering and artwork on top of it.

pub mod artwork;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod filters;
pub mod fs;
pub mod library_store;
pub mod metadata;
pub mod path_filter;
pub mod perf;
pub mod scanner;
pub mod search;
pub mod sqlite_persistence;
pub mod watcher;

// Re-export commonly used types for convenience
pub use engine::LibraryEngine;
pub use error::{LibraryError, Result};
pub use events::{DirectoryEvent, LibraryEvents, ScanEvent, TrackEvent, WatcherEvent};
pub use filters::{FilterCriteria, Range};
pub use library_store::{Album, Artist, SqliteLibraryStore, Track};
pub use scanner::{LibraryScanner, ScanOptions, ScanSummary};
pub use search::{SearchQuery, SearchResults, SearchType};
