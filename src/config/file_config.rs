use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub read_pool_size: Option<usize>,

    pub library: Option<LibraryConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LibraryConfig {
    pub directories: Option<Vec<String>>,
    pub watch_for_changes: Option<bool>,
    pub scan_on_startup: Option<bool>,
    pub auto_index_new_files: Option<bool>,
    pub supported_formats: Option<Vec<String>>,
    pub include_subdirectories: Option<bool>,
    pub exclude_patterns: Option<Vec<String>>,
    // Scanner
    pub parallel_scan: Option<bool>,
    pub scan_batch_size: Option<usize>,
    pub progress_interval_ms: Option<u64>,
    // Watcher debounce
    pub add_debounce_ms: Option<u64>,
    pub unlink_debounce_ms: Option<u64>,
    pub search_history_limit: Option<usize>,
    // Instrumentation
    pub slow_operation_threshold_ms: Option<u64>,
    pub metric_retention_days: Option<u64>,
    // Artwork
    pub artwork_cache_size: Option<usize>,
    pub preload_batch_size: Option<usize>,
    pub preload_pause_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
