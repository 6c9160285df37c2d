mod file_config;

pub use file_config::{FileConfig, LibraryConfig};

use crate::artwork::ArtworkSettings;
use crate::library_store::DEFAULT_READ_POOL_SIZE;
use crate::path_filter::{PathFilter, DEFAULT_SUPPORTED_FORMATS};
use crate::scanner::ScanOptions;
use crate::watcher::WatcherSettings;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub directories: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub read_pool_size: usize,
    pub library: LibrarySettings,
}

/// User-facing library settings with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct LibrarySettings {
    pub directories: Vec<PathBuf>,
    pub watch_for_changes: bool,
    pub scan_on_startup: bool,
    pub auto_index_new_files: bool,
    pub supported_formats: Vec<String>,
    pub include_subdirectories: bool,
    pub exclude_patterns: Vec<String>,
    pub parallel_scan: bool,
    pub scan_batch_size: usize,
    pub progress_interval_ms: u64,
    pub add_debounce_ms: u64,
    pub unlink_debounce_ms: u64,
    pub search_history_limit: usize,
    pub slow_operation_threshold_ms: u64,
    pub metric_retention_days: u64,
    pub artwork_cache_size: usize,
    pub preload_batch_size: usize,
    pub preload_pause_ms: u64,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            watch_for_changes: true,
            scan_on_startup: true,
            auto_index_new_files: true,
            supported_formats: DEFAULT_SUPPORTED_FORMATS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            include_subdirectories: true,
            exclude_patterns: Vec::new(),
            parallel_scan: true,
            scan_batch_size: 4,
            progress_interval_ms: 250,
            add_debounce_ms: 2000,
            unlink_debounce_ms: 500,
            search_history_limit: 100,
            slow_operation_threshold_ms: 100,
            metric_retention_days: 30,
            artwork_cache_size: 256,
            preload_batch_size: 10,
            preload_pause_ms: 50,
        }
    }
}

impl LibrarySettings {
    /// Merge a `[library]` table over the defaults.
    pub fn from_file(file: LibraryConfig, cli_directories: &[PathBuf]) -> Self {
        let defaults = Self::default();
        Self {
            directories: file
                .directories
                .map(|dirs| dirs.into_iter().map(PathBuf::from).collect())
                .unwrap_or_else(|| cli_directories.to_vec()),
            watch_for_changes: file.watch_for_changes.unwrap_or(defaults.watch_for_changes),
            scan_on_startup: file.scan_on_startup.unwrap_or(defaults.scan_on_startup),
            auto_index_new_files: file
                .auto_index_new_files
                .unwrap_or(defaults.auto_index_new_files),
            supported_formats: file
                .supported_formats
                .unwrap_or(defaults.supported_formats),
            include_subdirectories: file
                .include_subdirectories
                .unwrap_or(defaults.include_subdirectories),
            exclude_patterns: file.exclude_patterns.unwrap_or(defaults.exclude_patterns),
            parallel_scan: file.parallel_scan.unwrap_or(defaults.parallel_scan),
            scan_batch_size: file.scan_batch_size.unwrap_or(defaults.scan_batch_size),
            progress_interval_ms: file
                .progress_interval_ms
                .unwrap_or(defaults.progress_interval_ms),
            add_debounce_ms: file.add_debounce_ms.unwrap_or(defaults.add_debounce_ms),
            unlink_debounce_ms: file
                .unlink_debounce_ms
                .unwrap_or(defaults.unlink_debounce_ms),
            search_history_limit: file
                .search_history_limit
                .unwrap_or(defaults.search_history_limit),
            slow_operation_threshold_ms: file
                .slow_operation_threshold_ms
                .unwrap_or(defaults.slow_operation_threshold_ms),
            metric_retention_days: file
                .metric_retention_days
                .unwrap_or(defaults.metric_retention_days),
            artwork_cache_size: file
                .artwork_cache_size
                .unwrap_or(defaults.artwork_cache_size),
            preload_batch_size: file
                .preload_batch_size
                .unwrap_or(defaults.preload_batch_size),
            preload_pause_ms: file.preload_pause_ms.unwrap_or(defaults.preload_pause_ms),
        }
    }

    pub fn path_filter(&self) -> PathFilter {
        PathFilter::new(&self.supported_formats, &self.exclude_patterns)
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            filter: self.path_filter(),
            include_subdirectories: self.include_subdirectories,
            parallel: self.parallel_scan,
            batch_size: self.scan_batch_size.max(1),
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            force: false,
            remove_missing: true,
            metric_retention: self.metric_retention(),
        }
    }

    pub fn watcher_settings(&self) -> WatcherSettings {
        WatcherSettings {
            add_delay: Duration::from_millis(self.add_debounce_ms),
            unlink_delay: Duration::from_millis(self.unlink_debounce_ms),
            auto_index_new_files: self.auto_index_new_files,
            filter: self.path_filter(),
        }
    }

    pub fn artwork_settings(&self) -> ArtworkSettings {
        ArtworkSettings {
            cache_size: self.artwork_cache_size,
            preload_batch_size: self.preload_batch_size,
            preload_pause: Duration::from_millis(self.preload_pause_ms),
        }
    }

    pub fn slow_operation_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_operation_threshold_ms)
    }

    pub fn metric_retention(&self) -> Duration {
        Duration::from_secs(self.metric_retention_days * 24 * 60 * 60)
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db or in config file")
            })?;

        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let read_pool_size = file.read_pool_size.unwrap_or(DEFAULT_READ_POOL_SIZE);
        let library = LibrarySettings::from_file(file.library.unwrap_or_default(), &cli.directories);
        if library.scan_batch_size == 0 {
            bail!("scan_batch_size must be at least 1");
        }

        Ok(Self {
            db_path,
            read_pool_size,
            library,
        })
    }
}
