//! Directory scanning.
//!
//! A scan runs in three phases. Counting enumerates every accepted file under
//! every root so progress has a total. Processing sends new or modified files
//! through extraction, artwork and the store, skipping files whose size and
//! modification time match the stored record, then drops stored tracks whose
//! files are gone. Post-processing rebuilds aggregates and runs store
//! maintenance. Only one scan runs at a time.

mod progress;
mod walk;

pub use progress::{ScanPhase, ScanProgress};
pub use walk::enumerate_audio_files;

use crate::artwork::ArtworkResolver;
use crate::error::{LibraryError, Result};
use crate::events::{LibraryEvents, ScanEvent, TrackEvent};
use crate::fs::LibraryFs;
use crate::library_store::{SqliteLibraryStore, Track};
use crate::metadata::{ExtractedTrack, TrackExtractor};
use crate::path_filter::PathFilter;
use crate::perf::PerformanceMonitor;
use progress::ProgressTracker;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct ScanOptions {
    pub filter: PathFilter,
    pub include_subdirectories: bool,
    /// Extract metadata for up to `batch_size` files at once.
    pub parallel: bool,
    pub batch_size: usize,
    pub progress_interval: Duration,
    /// Reprocess files even when their modification time is unchanged.
    pub force: bool,
    /// Drop stored tracks whose files no longer exist under the root.
    pub remove_missing: bool,
    pub metric_retention: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            filter: PathFilter::default(),
            include_subdirectories: true,
            parallel: true,
            batch_size: 4,
            progress_interval: Duration::from_millis(250),
            force: false,
            remove_missing: true,
            metric_retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub path: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub roots: Vec<PathBuf>,
    pub total_files: usize,
    pub processed: usize,
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub removed: usize,
    pub errors: Vec<FileError>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// What indexing a single file did.
#[derive(Clone, Debug, PartialEq)]
pub enum FileOutcome {
    Added(Track),
    Updated(Track),
    Unchanged,
}

/// Resets the in-flight flag when a scan ends, however it ends.
struct ScanGuard(Arc<AtomicBool>);

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct LibraryScanner {
    store: SqliteLibraryStore,
    fs: Arc<dyn LibraryFs>,
    extractor: Arc<dyn TrackExtractor>,
    artwork: Arc<ArtworkResolver>,
    perf: PerformanceMonitor,
    events: LibraryEvents,
    running: Arc<AtomicBool>,
    cancel_token: Mutex<CancellationToken>,
}

impl LibraryScanner {
    pub fn new(
        store: SqliteLibraryStore,
        fs: Arc<dyn LibraryFs>,
        extractor: Arc<dyn TrackExtractor>,
        artwork: Arc<ArtworkResolver>,
        perf: PerformanceMonitor,
        events: LibraryEvents,
    ) -> Self {
        Self {
            store,
            fs,
            extractor,
            artwork,
            perf,
            events,
            running: Arc::new(AtomicBool::new(false)),
            cancel_token: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn fs(&self) -> &dyn LibraryFs {
        self.fs.as_ref()
    }

    /// Ask the running scan to stop after the file it is working on.
    pub fn cancel(&self) {
        let token = self
            .cancel_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_scanning() {
            info!("Cancelling library scan");
        }
        token.cancel();
    }

    fn begin(&self) -> Result<(ScanGuard, CancellationToken)> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LibraryError::ConcurrentScanRejected);
        }
        let token = CancellationToken::new();
        *self
            .cancel_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token.clone();
        Ok((ScanGuard(self.running.clone()), token))
    }

    /// Scan every root. Rejected with `ConcurrentScanRejected` if a scan is
    /// already running; the work itself happens on the blocking pool.
    pub async fn scan_all_directories(
        self: &Arc<Self>,
        roots: Vec<PathBuf>,
        options: ScanOptions,
    ) -> Result<ScanSummary> {
        let (guard, token) = self.begin()?;
        let scanner = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            scanner.run_scan(&roots, &options, &token)
        })
        .await?
    }

    pub async fn scan_directory(
        self: &Arc<Self>,
        root: PathBuf,
        options: ScanOptions,
    ) -> Result<ScanSummary> {
        self.scan_all_directories(vec![root], options).await
    }

    /// Synchronous scan for callers already off the async runtime.
    pub fn scan_blocking(&self, roots: &[PathBuf], options: &ScanOptions) -> Result<ScanSummary> {
        let (_guard, token) = self.begin()?;
        self.run_scan(roots, options, &token)
    }

    fn emit_progress(&self, tracker: &mut ProgressTracker, force: bool) {
        if let Some(progress) = tracker.report(force) {
            self.events.scan(ScanEvent::Progress(progress));
        }
    }

    fn run_scan(
        &self,
        roots: &[PathBuf],
        options: &ScanOptions,
        token: &CancellationToken,
    ) -> Result<ScanSummary> {
        info!("Starting library scan of {} directories", roots.len());
        self.events.scan(ScanEvent::Started {
            roots: roots.to_vec(),
        });

        let result = self.run_phases(roots, options, token);
        match &result {
            Ok(summary) => {
                info!(
                    "Library scan finished in {}ms: {} added, {} updated, {} skipped, {} removed, {} errors{}",
                    summary.duration_ms,
                    summary.added,
                    summary.updated,
                    summary.skipped,
                    summary.removed,
                    summary.errors.len(),
                    if summary.cancelled { " (cancelled)" } else { "" }
                );
                self.perf.record(
                    "scan_all_directories",
                    Duration::from_millis(summary.duration_ms),
                    Some(json!({
                        "files": summary.total_files,
                        "added": summary.added,
                        "updated": summary.updated,
                        "errors": summary.errors.len(),
                    })),
                );
                self.events.scan(ScanEvent::Completed(summary.clone()));
            }
            Err(e) => {
                warn!("Library scan failed: {}", e);
                self.events.scan(ScanEvent::Error {
                    message: e.to_string(),
                });
            }
        }
        result
    }

    fn run_phases(
        &self,
        roots: &[PathBuf],
        options: &ScanOptions,
        token: &CancellationToken,
    ) -> Result<ScanSummary> {
        let mut summary = ScanSummary {
            roots: roots.to_vec(),
            ..Default::default()
        };

        // Counting
        let mut listings: Vec<(PathBuf, Option<Vec<PathBuf>>)> = Vec::with_capacity(roots.len());
        for root in roots {
            if !self.fs.stat(root).map(|s| s.is_dir).unwrap_or(false) {
                warn!("Library directory {:?} is missing", root);
                summary.errors.push(FileError {
                    path: root.to_string_lossy().into_owned(),
                    message: LibraryError::DirectoryNotFound(root.clone()).to_string(),
                });
                listings.push((root.clone(), None));
                continue;
            }
            let files = enumerate_audio_files(
                self.fs.as_ref(),
                root,
                &options.filter,
                options.include_subdirectories,
            );
            summary.total_files += files.len();
            listings.push((root.clone(), Some(files)));
        }

        let mut tracker = ProgressTracker::new(summary.total_files, options.progress_interval);
        tracker.progress.phase = ScanPhase::Counting;
        tracker.progress.operation = "counting".to_string();
        self.emit_progress(&mut tracker, true);
        tracker.progress.phase = ScanPhase::Processing;

        // Processing
        for (root, files) in &listings {
            let Some(files) = files else { continue };
            if token.is_cancelled() {
                break;
            }
            if options.parallel && options.batch_size > 1 {
                self.process_parallel(files, options, token, &mut tracker, &mut summary);
            } else {
                self.process_sequential(files, options, token, &mut tracker, &mut summary);
            }
            if options.remove_missing && !token.is_cancelled() {
                summary.removed += self.remove_stale(root, files, &mut summary.errors);
            }
        }
        summary.cancelled = token.is_cancelled();
        self.emit_progress(&mut tracker, true);

        // Post-processing
        tracker.progress.phase = ScanPhase::PostProcessing;
        tracker.progress.current_file = None;
        tracker.progress.operation = "rebuilding aggregates".to_string();
        self.emit_progress(&mut tracker, true);
        self.store.rebuild_aggregated_data()?;

        tracker.progress.operation = "maintenance".to_string();
        self.emit_progress(&mut tracker, true);
        self.store.run_maintenance()?;
        let pruned = self.perf.prune(options.metric_retention)?;
        debug!("Post-scan maintenance pruned {} metrics", pruned);

        summary.duration_ms = tracker.elapsed().as_millis() as u64;
        Ok(summary)
    }

    fn record_error(&self, summary: &mut ScanSummary, tracker: &mut ProgressTracker, path: &Path, error: &LibraryError) {
        warn!("Failed to index {:?}: {}", path, error);
        summary.errors.push(FileError {
            path: path.to_string_lossy().into_owned(),
            message: error.to_string(),
        });
        tracker.progress.errors += 1;
    }

    fn record_saved(&self, summary: &mut ScanSummary, tracker: &mut ProgressTracker, track: &Track, was_known: bool) {
        let event = if was_known {
            summary.updated += 1;
            tracker.progress.updated += 1;
            TrackEvent::Changed {
                track_id: track.id.clone(),
                path: track.file_path.clone(),
            }
        } else {
            summary.added += 1;
            tracker.progress.added += 1;
            TrackEvent::Added {
                track_id: track.id.clone(),
                path: track.file_path.clone(),
            }
        };
        self.events.track(event);
    }

    fn record_skipped(&self, summary: &mut ScanSummary, tracker: &mut ProgressTracker, path: &Path) {
        debug!("Unchanged since last scan: {:?}", path);
        summary.skipped += 1;
        tracker.progress.skipped += 1;
    }

    fn finish_file(&self, summary: &mut ScanSummary, tracker: &mut ProgressTracker, path: &Path) {
        summary.processed += 1;
        tracker.progress.processed += 1;
        tracker.progress.current_file = Some(path.to_string_lossy().into_owned());
        self.events.track(TrackEvent::Scanned {
            path: path.to_string_lossy().into_owned(),
        });
        let last = tracker.progress.processed == tracker.progress.total;
        self.emit_progress(tracker, last);
    }

    /// Stored record for `path` if the file changed (or `force`), `None` if it can be skipped.
    fn needs_processing(&self, path: &Path, force: bool) -> Result<Option<Option<Track>>> {
        let stat = self.fs.stat(path)?;
        let existing = self.store.get_track_by_path(&path.to_string_lossy())?;
        match existing {
            Some(existing)
                if !force
                    && existing.date_modified == stat.modified_ms
                    && existing.file_size == stat.size as i64 =>
            {
                Ok(None)
            }
            existing => Ok(Some(existing)),
        }
    }

    /// Persist the embedded picture and point the track at it, or fall back to
    /// the folder cover as album artwork when the file carries none.
    fn attach_artwork(&self, extracted: ExtractedTrack) -> Track {
        let ExtractedTrack { mut track, picture } = extracted;
        match picture {
            Some(picture) => {
                if let Some(artwork) = self.artwork.store_embedded(&track, picture) {
                    track.artwork_id = Some(artwork.id);
                }
            }
            None => {
                // artwork_id only ever names an embedded picture
                self.artwork.forget_embedded(&track);
                track.artwork_id = None;
                self.artwork.attach_directory_artwork(&track);
            }
        }
        track
    }

    fn process_sequential(
        &self,
        files: &[PathBuf],
        options: &ScanOptions,
        token: &CancellationToken,
        tracker: &mut ProgressTracker,
        summary: &mut ScanSummary,
    ) {
        for path in files {
            if token.is_cancelled() {
                break;
            }
            tracker.progress.current_file = Some(path.to_string_lossy().into_owned());
            tracker.progress.operation = "extracting".to_string();
            let started = Instant::now();
            match self.index_file_with(path, options.force) {
                Ok(FileOutcome::Added(track)) => self.record_saved(summary, tracker, &track, false),
                Ok(FileOutcome::Updated(track)) => self.record_saved(summary, tracker, &track, true),
                Ok(FileOutcome::Unchanged) => self.record_skipped(summary, tracker, path),
                Err(e) => self.record_error(summary, tracker, path, &e),
            }
            tracker.record_work(1, started.elapsed());
            self.finish_file(summary, tracker, path);
        }
    }

    /// Extraction fans out over rayon one batch at a time; the batch is then
    /// written in a single store transaction.
    fn process_parallel(
        &self,
        files: &[PathBuf],
        options: &ScanOptions,
        token: &CancellationToken,
        tracker: &mut ProgressTracker,
        summary: &mut ScanSummary,
    ) {
        for chunk in files.chunks(options.batch_size) {
            if token.is_cancelled() {
                break;
            }
            let started = Instant::now();
            let mut pending = Vec::with_capacity(chunk.len());
            for path in chunk {
                match self.needs_processing(path, options.force) {
                    Ok(Some(existing)) => pending.push((path, existing)),
                    Ok(None) => {
                        self.record_skipped(summary, tracker, path);
                        self.finish_file(summary, tracker, path);
                    }
                    Err(e) => {
                        self.record_error(summary, tracker, path, &e);
                        self.finish_file(summary, tracker, path);
                    }
                }
            }
            if pending.is_empty() {
                continue;
            }

            tracker.progress.operation = "extracting".to_string();
            let extracted: Vec<(&PathBuf, bool, Result<ExtractedTrack>)> = pending
                .into_par_iter()
                .map(|(path, existing)| {
                    let result = self.extractor.extract(path, existing.as_ref());
                    (path, existing.is_some(), result)
                })
                .collect();

            tracker.progress.operation = "saving".to_string();
            let mut batch = Vec::with_capacity(extracted.len());
            for (path, was_known, result) in extracted {
                match result {
                    Ok(extracted) => batch.push((path, was_known, self.attach_artwork(extracted))),
                    Err(e) => {
                        self.record_error(summary, tracker, path, &e);
                        self.finish_file(summary, tracker, path);
                    }
                }
            }
            let tracks: Vec<Track> = batch.iter().map(|(_, _, t)| t.clone()).collect();
            let saved = self.store.save_tracks_batch(&tracks);
            let worked = batch.len();
            for (path, was_known, track) in batch {
                match &saved {
                    Ok(_) => self.record_saved(summary, tracker, &track, was_known),
                    Err(e) => {
                        let error = LibraryError::extraction(path, format!("batch save failed: {}", e));
                        self.record_error(summary, tracker, path, &error);
                    }
                }
                self.finish_file(summary, tracker, path);
            }
            tracker.record_work(worked.max(1), started.elapsed());
        }
    }

    /// Remove stored tracks under `root` that were not found on disk.
    fn remove_stale(&self, root: &Path, found: &[PathBuf], errors: &mut Vec<FileError>) -> usize {
        let stored = match self.store.get_track_paths_under(&root.to_string_lossy()) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not list stored tracks under {:?}: {}", root, e);
                return 0;
            }
        };
        let found: HashSet<String> = found
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let mut removed = 0;
        for path in stored.into_iter().filter(|p| !found.contains(p)) {
            match self.remove_path(&path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => errors.push(FileError {
                    path,
                    message: e.to_string(),
                }),
            }
        }
        if removed > 0 {
            info!("Removed {} stale tracks under {:?}", removed, root);
        }
        removed
    }

    // =========================================================================
    // Single-file pipeline (shared with the watcher)
    // =========================================================================

    fn index_file_with(&self, path: &Path, force: bool) -> Result<FileOutcome> {
        let Some(existing) = self.needs_processing(path, force)? else {
            return Ok(FileOutcome::Unchanged);
        };
        let extracted = self.extractor.extract(path, existing.as_ref())?;
        let track = self.attach_artwork(extracted);
        let saved = self.store.save_track(&track)?;
        Ok(if existing.is_some() {
            FileOutcome::Updated(saved)
        } else {
            FileOutcome::Added(saved)
        })
    }

    /// Run one file through extraction, artwork and the store.
    pub fn index_file(&self, path: &Path) -> Result<FileOutcome> {
        let started = Instant::now();
        let outcome = self.index_file_with(path, false);
        self.perf.record(
            "index_file",
            started.elapsed(),
            Some(json!({ "path": path.to_string_lossy() })),
        );
        match &outcome {
            Ok(FileOutcome::Added(track)) => self.events.track(TrackEvent::Added {
                track_id: track.id.clone(),
                path: track.file_path.clone(),
            }),
            Ok(FileOutcome::Updated(track)) => self.events.track(TrackEvent::Changed {
                track_id: track.id.clone(),
                path: track.file_path.clone(),
            }),
            _ => {}
        }
        outcome
    }

    pub fn is_indexed(&self, path: &Path) -> Result<bool> {
        Ok(self
            .store
            .get_track_by_path(&path.to_string_lossy())?
            .is_some())
    }

    /// Remove the track stored for `path`. Returns false if none was stored.
    pub fn remove_path(&self, path: &str) -> Result<bool> {
        match self.store.remove_track_by_path(path)? {
            Some(track) => {
                self.artwork.invalidate_track(&track.id);
                self.events.track(TrackEvent::Removed {
                    track_id: track.id,
                    path: track.file_path,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove everything stored under the directory `path`.
    pub fn remove_directory_tracks(&self, path: &Path) -> Result<usize> {
        let removed = self.store.remove_tracks_by_directory(&path.to_string_lossy())?;
        if removed > 0 {
            self.artwork.clear_cache();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::ArtworkSettings;
    use crate::fs::LocalFs;
    use crate::metadata::{build_track, ExtractedPicture, PictureExtractor, TrackTags};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// Reads `key=value` lines as tags.
    #[derive(Default)]
    struct TextExtractor {
        calls: AtomicUsize,
    }

    impl TrackExtractor for TextExtractor {
        fn extract(&self, path: &Path, existing: Option<&Track>) -> Result<ExtractedTrack> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let content = std::fs::read_to_string(path).map_err(|e| LibraryError::file_read(path, e))?;
            if content.starts_with("corrupt") {
                return Err(LibraryError::extraction(path, "unreadable container"));
            }
            let mut tags = TrackTags::default();
            for line in content.lines() {
                match line.split_once('=') {
                    Some(("title", v)) => tags.title = Some(v.to_string()),
                    Some(("artist", v)) => tags.artist = Some(v.to_string()),
                    Some(("album", v)) => tags.album = Some(v.to_string()),
                    _ => {}
                }
            }
            let stat = LocalFs.stat(path)?;
            Ok(ExtractedTrack {
                track: build_track(path, &stat, tags, existing),
                picture: None,
            })
        }
    }

    struct NoPictures;

    impl PictureExtractor for NoPictures {
        fn extract_picture(&self, _path: &Path) -> Result<Option<ExtractedPicture>> {
            Ok(None)
        }
    }

    fn scanner(store: &SqliteLibraryStore) -> (Arc<LibraryScanner>, Arc<TextExtractor>) {
        let fs: Arc<dyn LibraryFs> = Arc::new(LocalFs);
        let extractor = Arc::new(TextExtractor::default());
        let artwork = Arc::new(ArtworkResolver::new(
            store.clone(),
            fs.clone(),
            Arc::new(NoPictures),
            ArtworkSettings::default(),
        ));
        let scanner = LibraryScanner::new(
            store.clone(),
            fs,
            extractor.clone(),
            artwork,
            PerformanceMonitor::new(store.clone(), Duration::from_secs(60)),
            LibraryEvents::new(),
        );
        (Arc::new(scanner), extractor)
    }

    fn options(parallel: bool) -> ScanOptions {
        ScanOptions {
            parallel,
            batch_size: 2,
            progress_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn rescan_skips_unchanged_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        std::fs::write(root.join("a.mp3"), "title=A\nartist=X").unwrap();
        std::fs::write(root.join("b.mp3"), "title=B\nartist=X").unwrap();
        let store = SqliteLibraryStore::in_memory().unwrap();
        let (scanner, extractor) = scanner(&store);

        let first = scanner.scan_blocking(&[root.clone()], &options(false)).unwrap();
        assert_eq!((first.total_files, first.added, first.skipped), (2, 2, 0));
        let before = store
            .get_track_by_path(&root.join("a.mp3").to_string_lossy())
            .unwrap()
            .unwrap();

        let second = scanner.scan_blocking(&[root.clone()], &options(false)).unwrap();
        assert_eq!((second.added, second.updated, second.skipped), (0, 0, 2));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
        let after = store
            .get_track_by_path(&root.join("a.mp3").to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(after.date_added, before.date_added);
        assert_eq!(after.id, before.id);
    }

    #[test]
    fn parallel_mode_collects_per_file_errors() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        std::fs::write(root.join("a.mp3"), "title=A").unwrap();
        std::fs::write(root.join("b.mp3"), "corrupt").unwrap();
        std::fs::write(root.join("c.mp3"), "title=C").unwrap();
        let store = SqliteLibraryStore::in_memory().unwrap();
        let (scanner, _) = scanner(&store);

        let summary = scanner.scan_blocking(&[root.clone()], &options(true)).unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.added, 2);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].path.ends_with("b.mp3"));
        assert_eq!(store.get_track_count().unwrap(), 2);
    }

    #[test]
    fn deleted_files_are_removed_on_rescan() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        std::fs::write(root.join("a.mp3"), "title=A\nartist=Solo").unwrap();
        std::fs::write(root.join("b.mp3"), "title=B\nartist=X").unwrap();
        let store = SqliteLibraryStore::in_memory().unwrap();
        let (scanner, _) = scanner(&store);
        scanner.scan_blocking(&[root.clone()], &options(false)).unwrap();
        assert_eq!(store.get_all_artists(10, 0).unwrap().len(), 2);

        std::fs::remove_file(root.join("a.mp3")).unwrap();
        let summary = scanner.scan_blocking(&[root.clone()], &options(false)).unwrap();
        assert_eq!(summary.removed, 1);
        let artists = store.get_all_artists(10, 0).unwrap();
        assert_eq!(artists.len(), 1);
        assert_eq!(artists[0].name, "X");
    }

    #[test]
    fn missing_root_is_reported_and_keeps_its_tracks() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("music");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("a.mp3"), "title=A").unwrap();
        let store = SqliteLibraryStore::in_memory().unwrap();
        let (scanner, _) = scanner(&store);
        scanner.scan_blocking(&[root.clone()], &options(false)).unwrap();

        let unmounted = temp_dir.path().join("unmounted");
        std::fs::rename(&root, &unmounted).unwrap();
        let summary = scanner.scan_blocking(&[root.clone()], &options(false)).unwrap();
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.removed, 0);
        assert_eq!(store.get_track_count().unwrap(), 1);
    }

    #[test]
    fn second_scan_is_rejected_while_one_runs() {
        let store = SqliteLibraryStore::in_memory().unwrap();
        let (scanner, _) = scanner(&store);
        let held = scanner.begin().unwrap();
        assert!(scanner.is_scanning());
        assert!(matches!(
            scanner.scan_blocking(&[], &options(false)),
            Err(LibraryError::ConcurrentScanRejected)
        ));
        drop(held);
        assert!(!scanner.is_scanning());
        assert!(scanner.scan_blocking(&[], &options(false)).is_ok());
    }

    #[test]
    fn cancelled_scan_stops_between_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        std::fs::write(root.join("a.mp3"), "title=A").unwrap();
        let store = SqliteLibraryStore::in_memory().unwrap();
        let (scanner, _) = scanner(&store);

        let (_guard, token) = scanner.begin().unwrap();
        scanner.cancel();
        assert!(token.is_cancelled());
        let summary = scanner.run_scan(&[root], &options(false), &token).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.processed, 0);
    }

    #[tokio::test]
    async fn async_scan_reports_events() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        std::fs::write(root.join("a.mp3"), "title=A").unwrap();
        let store = SqliteLibraryStore::in_memory().unwrap();
        let (scanner, _) = scanner(&store);
        let mut scan_events = scanner.events.subscribe_scan();

        let summary = scanner.scan_directory(root, options(true)).await.unwrap();
        assert_eq!(summary.added, 1);

        let mut saw_started = false;
        let mut saw_completed = false;
        while let Ok(event) = scan_events.try_recv() {
            match event {
                ScanEvent::Started { .. } => saw_started = true,
                ScanEvent::Completed(done) => {
                    saw_completed = true;
                    assert_eq!(done, summary);
                }
                _ => {}
            }
        }
        assert!(saw_started && saw_completed);
    }
}
