//! The owning context for a library: one store, one scanner, one watcher.

use crate::artwork::ArtworkResolver;
use crate::config::LibrarySettings;
use crate::error::{LibraryError, Result};
use crate::events::{DirectoryEvent, LibraryEvents};
use crate::fs::{LibraryFs, LocalFs};
use crate::library_store::SqliteLibraryStore;
use crate::metadata::{LoftyExtractor, PictureExtractor, TrackExtractor};
use crate::perf::PerformanceMonitor;
use crate::scanner::{LibraryScanner, ScanSummary};
use crate::watcher::LibraryWatcher;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{info, warn};

pub struct LibraryEngine {
    store: SqliteLibraryStore,
    fs: Arc<dyn LibraryFs>,
    events: LibraryEvents,
    artwork: Arc<ArtworkResolver>,
    scanner: Arc<LibraryScanner>,
    watcher: LibraryWatcher,
    settings: RwLock<LibrarySettings>,
}

impl LibraryEngine {
    /// Engine over the local disk with lofty-based extraction.
    pub fn new(store: SqliteLibraryStore, settings: LibrarySettings) -> Self {
        let fs: Arc<dyn LibraryFs> = Arc::new(LocalFs);
        let extractor = Arc::new(LoftyExtractor::new(fs.clone()));
        Self::with_components(store, settings, fs, extractor.clone(), extractor)
    }

    pub fn with_components(
        store: SqliteLibraryStore,
        settings: LibrarySettings,
        fs: Arc<dyn LibraryFs>,
        extractor: Arc<dyn TrackExtractor>,
        pictures: Arc<dyn PictureExtractor>,
    ) -> Self {
        let store = store.with_slow_operation_threshold(settings.slow_operation_threshold());
        let events = LibraryEvents::new();
        let perf = PerformanceMonitor::new(store.clone(), settings.slow_operation_threshold());
        let artwork = Arc::new(ArtworkResolver::new(
            store.clone(),
            fs.clone(),
            pictures,
            settings.artwork_settings(),
        ));
        let scanner = Arc::new(LibraryScanner::new(
            store.clone(),
            fs.clone(),
            extractor,
            artwork.clone(),
            perf,
            events.clone(),
        ));
        let watcher = LibraryWatcher::new(scanner.clone(), events.clone(), settings.watcher_settings());
        Self {
            store,
            fs,
            events,
            artwork,
            scanner,
            watcher,
            settings: RwLock::new(settings),
        }
    }

    pub fn store(&self) -> &SqliteLibraryStore {
        &self.store
    }

    pub fn events(&self) -> &LibraryEvents {
        &self.events
    }

    pub fn artwork(&self) -> &Arc<ArtworkResolver> {
        &self.artwork
    }

    pub fn scanner(&self) -> &Arc<LibraryScanner> {
        &self.scanner
    }

    pub fn watcher(&self) -> &LibraryWatcher {
        &self.watcher
    }

    pub fn settings(&self) -> LibrarySettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_settings(&self, f: impl FnOnce(&mut LibrarySettings)) {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut settings);
    }

    pub fn directories(&self) -> Vec<PathBuf> {
        self.settings().directories
    }

    fn watch(&self, root: &Path) {
        // Errors are already reported on the watcher channel.
        if let Err(e) = self.watcher.watch_root(root) {
            warn!("Not watching {:?}: {}", root, e);
        }
    }

    /// Register a library root. When new files are indexed automatically the
    /// root is scanned right away; a scan that is already running is reported
    /// and the new root is picked up by the next rescan.
    pub async fn add_directory(&self, path: &Path) -> Result<Option<ScanSummary>> {
        if !self.fs.stat(path).map(|s| s.is_dir).unwrap_or(false) {
            return Err(LibraryError::DirectoryNotFound(path.to_path_buf()));
        }
        let settings = self.settings();
        if settings.directories.iter().any(|d| d == path) {
            return Ok(None);
        }
        self.update_settings(|s| s.directories.push(path.to_path_buf()));
        info!("Added library directory {:?}", path);
        self.events.directory(DirectoryEvent::Added {
            path: path.to_path_buf(),
        });

        if settings.watch_for_changes {
            self.watch(path);
        }
        if !settings.auto_index_new_files {
            return Ok(None);
        }
        match self
            .scanner
            .scan_directory(path.to_path_buf(), settings.scan_options())
            .await
        {
            Ok(summary) => Ok(Some(summary)),
            Err(LibraryError::ConcurrentScanRejected) => {
                warn!("Scan in progress, {:?} will be indexed on the next rescan", path);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Unregister a root: stop watching it, then drop its tracks.
    pub async fn remove_directory(&self, path: &Path) -> Result<usize> {
        if !self.directories().iter().any(|d| d == path) {
            return Err(LibraryError::DirectoryNotFound(path.to_path_buf()));
        }
        self.watcher.unwatch_root(path).await;
        self.update_settings(|s| s.directories.retain(|d| d != path));

        let scanner = self.scanner.clone();
        let root = path.to_path_buf();
        let tracks_removed =
            tokio::task::spawn_blocking(move || scanner.remove_directory_tracks(&root)).await??;
        info!(
            "Removed library directory {:?} ({} tracks)",
            path, tracks_removed
        );
        self.events.directory(DirectoryEvent::Removed {
            path: path.to_path_buf(),
            tracks_removed,
        });
        Ok(tracks_removed)
    }

    /// Scan every configured root. `force` reprocesses unchanged files too.
    pub async fn rescan(&self, force: bool) -> Result<ScanSummary> {
        let settings = self.settings();
        let mut options = settings.scan_options();
        options.force = force;
        self.scanner
            .scan_all_directories(settings.directories, options)
            .await
    }

    /// Begin watching and run the startup scan, per settings.
    pub async fn start(&self) -> Result<Option<ScanSummary>> {
        let settings = self.settings();
        info!(
            "Starting library engine with {} directories (watch: {}, scan on startup: {})",
            settings.directories.len(),
            settings.watch_for_changes,
            settings.scan_on_startup
        );
        if settings.watch_for_changes {
            for root in &settings.directories {
                self.watch(root);
            }
        }
        if settings.scan_on_startup {
            return self.rescan(false).await.map(Some);
        }
        Ok(None)
    }

    pub async fn set_watch_enabled(&self, enabled: bool) {
        self.update_settings(|s| s.watch_for_changes = enabled);
        for root in self.directories() {
            if enabled {
                self.watch(&root);
            } else {
                self.watcher.unwatch_root(&root).await;
            }
        }
    }

    /// Cancel any scan, stop all watchers and pending changes, close the store.
    pub async fn shutdown(&self) {
        self.scanner.cancel();
        while self.scanner.is_scanning() {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        self.watcher.shutdown().await;
        self.store.close();
        info!("Library engine stopped");
    }
}
