use crate::fs::LibraryFs;
use crate::path_filter::PathFilter;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Audio files under `root` accepted by `filter`, sorted.
///
/// Excluded directories are pruned rather than walked. Unreadable entries are
/// logged and skipped.
pub fn enumerate_audio_files(
    fs: &dyn LibraryFs,
    root: &Path,
    filter: &PathFilter,
    recursive: bool,
) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs
        .walk_files(root, recursive, &|dir| filter.is_excluded(dir))
        .into_iter()
        .filter(|path| filter.accepts(path))
        .collect();
    files.sort();
    debug!("Found {} audio files under {:?}", files.len(), root);
    files
}
