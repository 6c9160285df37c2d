//! Filesystem watching for library roots.
//!
//! Each root gets its own notify watcher feeding a tokio task. Raw events are
//! reduced to the paths they touch and debounced per path; when a path's
//! timer fires, the path is reconciled against the disk: existing audio files
//! go through the indexing pipeline, vanished paths are removed from the
//! store. A failure on one root is reported and never affects the others.

mod debounce;

pub use debounce::PathDebouncer;

use crate::error::{LibraryError, Result};
use crate::events::{LibraryEvents, WatcherEvent};
use crate::fs::LibraryFs;
use crate::path_filter::PathFilter;
use crate::scanner::{enumerate_audio_files, FileOutcome, LibraryScanner};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct WatcherSettings {
    /// Delay after an add or change, long enough for multi-write copies to settle.
    pub add_delay: Duration,
    pub unlink_delay: Duration,
    /// Index files that are not in the library yet. When off, only known
    /// tracks are refreshed.
    pub auto_index_new_files: bool,
    pub filter: PathFilter,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            add_delay: Duration::from_millis(2000),
            unlink_delay: Duration::from_millis(500),
            auto_index_new_files: true,
            filter: PathFilter::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathChange {
    Upsert,
    Remove,
}

/// Paths touched by `event` and what happened to them.
pub fn classify(event: &Event) -> Vec<(PathBuf, PathChange)> {
    let change = match &event.kind {
        EventKind::Create(_) => PathChange::Upsert,
        EventKind::Remove(_) => PathChange::Remove,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => PathChange::Remove,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // [from, to]
            let mut changes = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                changes.push((from.clone(), PathChange::Remove));
            }
            if let Some(to) = event.paths.get(1) {
                changes.push((to.clone(), PathChange::Upsert));
            }
            return changes;
        }
        EventKind::Modify(_) => PathChange::Upsert,
        _ => return Vec::new(),
    };
    event.paths.iter().map(|p| (p.clone(), change)).collect()
}

struct WatchContext {
    scanner: Arc<LibraryScanner>,
    settings: WatcherSettings,
    debouncer: PathDebouncer,
}

impl WatchContext {
    fn handle_event(self: &Arc<Self>, event: Event) {
        for (path, change) in classify(&event) {
            if self.settings.filter.is_excluded(&path) {
                debug!("Ignoring excluded path {:?}", path);
                continue;
            }
            let delay = match change {
                PathChange::Upsert => {
                    let is_file = self
                        .scanner
                        .fs()
                        .stat(&path)
                        .map(|stat| !stat.is_dir)
                        .unwrap_or(false);
                    if is_file && !self.settings.filter.has_supported_extension(&path) {
                        continue;
                    }
                    self.settings.add_delay
                }
                PathChange::Remove => self.settings.unlink_delay,
            };
            let ctx = Arc::clone(self);
            let target = path.clone();
            self.debouncer.schedule(path, delay, move || async move {
                let scanner_ctx = Arc::clone(&ctx);
                let blocking_target = target.clone();
                let result =
                    tokio::task::spawn_blocking(move || scanner_ctx.reconcile(&blocking_target)).await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Failed to apply change to {:?}: {}", target, e),
                    Err(e) => warn!("Change handler for {:?} did not finish: {}", target, e),
                }
            });
        }
    }

    /// Bring the store in line with what is on disk at `path` now.
    fn reconcile(&self, path: &Path) -> Result<()> {
        let fs = self.scanner.fs();
        match fs.stat(path) {
            Ok(stat) if stat.is_dir => {
                for file in enumerate_audio_files(fs, path, &self.settings.filter, true) {
                    if let Err(e) = self.index(&file) {
                        warn!("Failed to index {:?}: {}", file, e);
                    }
                }
                Ok(())
            }
            Ok(_) => {
                if self.settings.filter.accepts(path) {
                    self.index(path)?;
                }
                Ok(())
            }
            Err(_) => {
                let path_str = path.to_string_lossy();
                if self.scanner.remove_path(&path_str)? {
                    info!("Removed deleted file {:?}", path);
                } else {
                    let removed = self.scanner.remove_directory_tracks(path)?;
                    if removed > 0 {
                        info!("Removed {} tracks under deleted directory {:?}", removed, path);
                    }
                }
                Ok(())
            }
        }
    }

    fn index(&self, path: &Path) -> Result<()> {
        if !self.settings.auto_index_new_files && !self.scanner.is_indexed(path)? {
            debug!("Not indexing new file {:?}", path);
            return Ok(());
        }
        match self.scanner.index_file(path)? {
            FileOutcome::Added(track) => info!("Indexed new file {:?} ({})", path, track.id),
            FileOutcome::Updated(track) => debug!("Refreshed {:?} ({})", path, track.id),
            FileOutcome::Unchanged => debug!("Unchanged: {:?}", path),
        }
        Ok(())
    }
}

struct WatchedRoot {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

pub struct LibraryWatcher {
    ctx: Arc<WatchContext>,
    events: LibraryEvents,
    roots: Mutex<HashMap<PathBuf, WatchedRoot>>,
}

impl LibraryWatcher {
    pub fn new(scanner: Arc<LibraryScanner>, events: LibraryEvents, settings: WatcherSettings) -> Self {
        Self {
            ctx: Arc::new(WatchContext {
                scanner,
                settings,
                debouncer: PathDebouncer::new(),
            }),
            events,
            roots: Mutex::new(HashMap::new()),
        }
    }

    fn roots(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, WatchedRoot>> {
        self.roots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn report_error(&self, root: &Path, error: notify::Error) -> LibraryError {
        warn!("Watcher error for {:?}: {}", root, error);
        self.events.watcher(WatcherEvent::Error {
            root: root.to_path_buf(),
            message: error.to_string(),
        });
        LibraryError::Watcher(error)
    }

    /// Start watching `root` recursively. Must be called from within a tokio
    /// runtime. Watching an already watched root is a no-op.
    pub fn watch_root(&self, root: &Path) -> Result<()> {
        if cfg!(feature = "no_watch") {
            info!("Filesystem watching is disabled in this build, not watching {:?}", root);
            return Ok(());
        }
        if self.is_watching(root) {
            return Ok(());
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            NotifyConfig::default(),
        )
        .map_err(|e| self.report_error(root, e))?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| self.report_error(root, e))?;

        let ctx = Arc::clone(&self.ctx);
        let events = self.events.clone();
        let task_root = root.to_path_buf();
        let task = tokio::spawn(async move {
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => ctx.handle_event(event),
                    Err(e) => {
                        warn!("Watcher error for {:?}: {}", task_root, e);
                        events.watcher(WatcherEvent::Error {
                            root: task_root.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        });

        self.roots().insert(
            root.to_path_buf(),
            WatchedRoot {
                _watcher: watcher,
                task,
            },
        );
        info!("Watching {:?} for changes", root);
        self.events.watcher(WatcherEvent::Started {
            root: root.to_path_buf(),
        });
        Ok(())
    }

    async fn stop(&self, root: PathBuf, watched: WatchedRoot) {
        let WatchedRoot {
            _watcher: watcher,
            task,
        } = watched;
        drop(watcher);
        task.abort();
        let _ = task.await;
        let cancelled = self.ctx.debouncer.cancel_under(&root);
        debug!("Stopped watching {:?}, {} pending changes dropped", root, cancelled);
        self.events.watcher(WatcherEvent::Stopped { root });
    }

    /// Stop watching `root` and drop its pending changes. Returns whether it was watched.
    pub async fn unwatch_root(&self, root: &Path) -> bool {
        let watched = self.roots().remove(root);
        match watched {
            Some(watched) => {
                self.stop(root.to_path_buf(), watched).await;
                true
            }
            None => false,
        }
    }

    pub fn is_watching(&self, root: &Path) -> bool {
        self.roots().contains_key(root)
    }

    pub fn watched_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self.roots().keys().cloned().collect();
        roots.sort();
        roots
    }

    /// Feed a raw filesystem event through classification and debouncing.
    pub fn handle_event(&self, event: Event) {
        self.ctx.handle_event(event);
    }

    pub fn pending_changes(&self) -> usize {
        self.ctx.debouncer.pending_count()
    }

    /// Stop every root and wait for in-flight changes to finish.
    pub async fn shutdown(&self) {
        let drained: Vec<(PathBuf, WatchedRoot)> = self.roots().drain().collect();
        for (root, watched) in drained {
            self.stop(root, watched).await;
        }
        self.ctx.debouncer.shutdown().await;
        info!("Library watcher stopped");
    }
}
