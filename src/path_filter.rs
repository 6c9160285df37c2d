//! Decides which paths belong in the library.
//!
//! Exclude patterns are globs (`*`, `?`, `**`) tested against every component
//! of the path and against the whole path, so `node_modules`, `*.tmp` and
//! `**/Samples/**` all behave as expected.

use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

pub const DEFAULT_SUPPORTED_FORMATS: &[&str] =
    &["mp3", "flac", "wav", "ogg", "m4a", "aac", "wma", "alac"];

#[derive(Debug, Clone)]
pub struct PathFilter {
    extensions: HashSet<String>,
    excludes: Vec<Regex>,
}

fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("(?i)^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    re.push_str(".*");
                } else {
                    re.push_str("[^/\\\\]*");
                }
            }
            '?' => re.push_str("[^/\\\\]"),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    match Regex::new(&re) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("Ignoring invalid exclude pattern '{}': {}", pattern, e);
            None
        }
    }
}

impl PathFilter {
    pub fn new<S: AsRef<str>>(formats: &[S], exclude_patterns: &[S]) -> Self {
        Self {
            extensions: formats
                .iter()
                .map(|f| f.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            excludes: exclude_patterns
                .iter()
                .filter(|p| !p.as_ref().trim().is_empty())
                .filter_map(|p| glob_to_regex(p.as_ref().trim()))
                .collect(),
        }
    }

    pub fn has_supported_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| self.extensions.contains(&e.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or(false)
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.excludes.is_empty() {
            return false;
        }
        let full = path.to_string_lossy();
        self.excludes.iter().any(|re| {
            re.is_match(&full)
                || path
                    .components()
                    .any(|c| re.is_match(&c.as_os_str().to_string_lossy()))
        })
    }

    /// Supported audio file that no exclude pattern rejects.
    pub fn accepts(&self, path: &Path) -> bool {
        self.has_supported_extension(path) && !self.is_excluded(path)
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new::<&str>(DEFAULT_SUPPORTED_FORMATS, &[])
    }
}
