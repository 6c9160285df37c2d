//! Filesystem capability used by the scanner, the watcher and the artwork
//! resolver.

use crate::error::{LibraryError, Result};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::warn;
use walkdir::WalkDir;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    /// Modification time in milliseconds since the epoch (0 if unavailable).
    pub modified_ms: i64,
    pub is_dir: bool,
}

/// Read, list and stat. Implemented over the real disk by [`LocalFs`]; tests
/// substitute their own implementation.
pub trait LibraryFs: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Direct children of `dir`, sorted by path.
    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    fn stat(&self, path: &Path) -> Result<FileStat>;

    fn exists(&self, path: &Path) -> bool {
        self.stat(path).is_ok()
    }

    /// Files under `root`, descending into subdirectories when `recursive` and
    /// `skip_dir` does not reject them. Unreadable entries are logged and
    /// skipped. Order is unspecified.
    fn walk_files(&self, root: &Path, recursive: bool, skip_dir: &dyn Fn(&Path) -> bool) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let entries = match self.list_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Skipping unreadable directory {:?}: {}", dir, e);
                    continue;
                }
            };
            for entry in entries {
                match self.stat(&entry) {
                    Ok(stat) if stat.is_dir => {
                        if recursive && !skip_dir(&entry) {
                            pending.push(entry);
                        }
                    }
                    Ok(_) => files.push(entry),
                    Err(e) => warn!("Skipping unreadable entry {:?}: {}", entry, e),
                }
            }
        }
        files
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFs;

impl LibraryFs for LocalFs {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| LibraryError::file_read(path, e))
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(dir).map_err(|e| LibraryError::file_read(dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LibraryError::file_read(dir, e))?;
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    fn stat(&self, path: &Path) -> Result<FileStat> {
        let metadata = std::fs::metadata(path).map_err(|e| LibraryError::file_read(path, e))?;
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Ok(FileStat {
            size: metadata.len(),
            modified_ms,
            is_dir: metadata.is_dir(),
        })
    }

    fn walk_files(&self, root: &Path, recursive: bool, skip_dir: &dyn Fn(&Path) -> bool) -> Vec<PathBuf> {
        let max_depth = if recursive { usize::MAX } else { 1 };
        WalkDir::new(root)
            .follow_links(true)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !entry.file_type().is_dir() || !skip_dir(entry.path())
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry under {:?}: {}", root, e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect()
    }
}
