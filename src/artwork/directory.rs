//! Picking a cover image out of a track's folder.

use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Conventional cover file stems, best first. Any other image ranks after these.
const PREFERRED_STEMS: &[&str] = &[
    "cover",
    "folder",
    "front",
    "albumart",
    "albumartsmall",
    "thumb",
];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_string_lossy().to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn priority(path: &Path) -> usize {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    PREFERRED_STEMS
        .iter()
        .position(|preferred| *preferred == stem)
        .unwrap_or(PREFERRED_STEMS.len())
}

/// Best cover candidate among `entries`, by stem priority then file name.
pub fn best_candidate(entries: &[PathBuf]) -> Option<PathBuf> {
    entries
        .iter()
        .filter(|p| is_image_file(p))
        .min_by(|a, b| {
            priority(a)
                .cmp(&priority(b))
                .then_with(|| a.file_name().cmp(&b.file_name()))
        })
        .cloned()
}
