//! Common test infrastructure
//!
//! Builds a library engine over a temporary directory with test doubles for
//! tag parsing, so tests control exactly which tags each file reports.
//! Tests should only import from this module.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestLibrary, INTRO_FILE};
//!
//! #[tokio::test]
//! async fn test_scan() {
//!     let library = TestLibrary::new();
//!     library.write_track(INTRO_FILE, tags("Intro", Some("X"), None));
//!     let summary = library.engine.rescan(false).await.unwrap();
//!     assert_eq!(summary.added, 1);
//! }
//! ```

#![allow(dead_code)]

use pezzottify_library::config::LibrarySettings;
use pezzottify_library::fs::{LibraryFs, LocalFs};
use pezzottify_library::metadata::{
    build_track, ExtractedPicture, ExtractedTrack, PictureExtractor, TrackExtractor, TrackTags,
};
use pezzottify_library::{LibraryEngine, LibraryError, Result, SqliteLibraryStore, Track};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const INTRO_FILE: &str = "01 - Intro.mp3";
pub const UNKNOWN_FILE: &str = "Unknown.flac";

pub const ADD_DEBOUNCE: Duration = Duration::from_millis(80);
pub const UNLINK_DEBOUNCE: Duration = Duration::from_millis(40);

pub fn tags(title: &str, artist: Option<&str>, album: Option<&str>) -> TrackTags {
    TrackTags {
        title: Some(title.to_string()),
        artist: artist.map(str::to_string),
        album: album.map(str::to_string),
        duration_ms: 180_000,
        ..Default::default()
    }
}

/// Reports the tags registered for a file name; unregistered files are untagged.
#[derive(Default)]
pub struct FakeExtractor {
    tags: Mutex<HashMap<String, TrackTags>>,
    pictures: Mutex<HashMap<String, ExtractedPicture>>,
    failing: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn set_tags(&self, file_name: &str, tags: TrackTags) {
        self.tags.lock().unwrap().insert(file_name.to_string(), tags);
    }

    pub fn set_picture(&self, file_name: &str, picture: ExtractedPicture) {
        self.pictures
            .lock()
            .unwrap()
            .insert(file_name.to_string(), picture);
    }

    /// Report `file_name` as carrying no embedded picture from now on.
    pub fn clear_picture(&self, file_name: &str) {
        self.pictures.lock().unwrap().remove(file_name);
    }

    pub fn fail_on(&self, file_name: &str) {
        self.failing.lock().unwrap().push(file_name.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl TrackExtractor for FakeExtractor {
    fn extract(&self, path: &Path, existing: Option<&Track>) -> Result<ExtractedTrack> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = Self::file_name(path);
        if self.failing.lock().unwrap().contains(&name) {
            return Err(LibraryError::extraction(path, "corrupt container"));
        }
        let stat = LocalFs.stat(path)?;
        let tags = self.tags.lock().unwrap().get(&name).cloned().unwrap_or_default();
        Ok(ExtractedTrack {
            track: build_track(path, &stat, tags, existing),
            picture: self.pictures.lock().unwrap().get(&name).cloned(),
        })
    }
}

/// Picture source for on-demand artwork lookups, counting every call.
#[derive(Default)]
pub struct FakePictures {
    pictures: Mutex<HashMap<String, ExtractedPicture>>,
    calls: AtomicUsize,
}

impl FakePictures {
    pub fn set_picture(&self, file_name: &str, picture: ExtractedPicture) {
        self.pictures
            .lock()
            .unwrap()
            .insert(file_name.to_string(), picture);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PictureExtractor for FakePictures {
    fn extract_picture(&self, path: &Path) -> Result<Option<ExtractedPicture>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = FakeExtractor::file_name(path);
        Ok(self.pictures.lock().unwrap().get(&name).cloned())
    }
}

pub fn test_settings(root: &Path) -> LibrarySettings {
    LibrarySettings {
        directories: vec![root.to_path_buf()],
        watch_for_changes: false,
        scan_on_startup: false,
        progress_interval_ms: 0,
        add_debounce_ms: ADD_DEBOUNCE.as_millis() as u64,
        unlink_debounce_ms: UNLINK_DEBOUNCE.as_millis() as u64,
        slow_operation_threshold_ms: 0,
        ..Default::default()
    }
}

pub struct TestLibrary {
    pub temp_dir: TempDir,
    pub root: PathBuf,
    pub engine: Arc<LibraryEngine>,
    pub extractor: Arc<FakeExtractor>,
    pub pictures: Arc<FakePictures>,
}

impl TestLibrary {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    /// Library rooted at `<temp>/music`, with `customize` applied to the default test settings.
    pub fn with_settings(customize: impl FnOnce(&mut LibrarySettings)) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("music");
        std::fs::create_dir_all(&root).unwrap();
        let root = root.canonicalize().unwrap();

        let mut settings = test_settings(&root);
        customize(&mut settings);

        let store = SqliteLibraryStore::open(temp_dir.path().join("library.db"), 2).unwrap();
        let extractor = Arc::new(FakeExtractor::default());
        let pictures = Arc::new(FakePictures::default());
        let engine = LibraryEngine::with_components(
            store,
            settings,
            Arc::new(LocalFs),
            extractor.clone(),
            pictures.clone(),
        );
        Self {
            temp_dir,
            root,
            engine: Arc::new(engine),
            extractor,
            pictures,
        }
    }

    pub fn store(&self) -> &SqliteLibraryStore {
        self.engine.store()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn path_str(&self, relative: &str) -> String {
        self.path(relative).to_string_lossy().into_owned()
    }

    /// Write `relative` under the root and register its tags.
    pub fn write_track(&self, relative: &str, tags: TrackTags) -> PathBuf {
        let path = self.write_file(relative, b"not really audio");
        let name = FakeExtractor::file_name(&path);
        self.extractor.set_tags(&name, tags);
        path
    }

    pub fn write_file(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, bytes).unwrap();
        path
    }

    pub fn track(&self, relative: &str) -> Option<Track> {
        self.store().get_track_by_path(&self.path_str(relative)).unwrap()
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
