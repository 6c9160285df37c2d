//! End-to-end tests for filesystem watching
//!
//! Most tests feed notify events straight into the watcher so timing only
//! depends on the debounce delays; one test goes through a real notify watcher.

mod common;

use common::{tags, wait_until, TestLibrary, ADD_DEBOUNCE, INTRO_FILE, UNKNOWN_FILE};
use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use pezzottify_library::{TrackEvent, WatcherEvent};
use std::path::PathBuf;
use std::time::Duration;

fn event(kind: EventKind, path: PathBuf) -> Event {
    Event::new(kind).add_path(path)
}

fn modified(path: PathBuf) -> Event {
    event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), path)
}

#[tokio::test]
async fn test_rapid_changes_trigger_one_pipeline_run() {
    let library = TestLibrary::new();
    let path = library.write_track(INTRO_FILE, tags("Intro", Some("X"), None));
    let watcher = library.engine.watcher();

    watcher.handle_event(modified(path.clone()));
    tokio::time::sleep(ADD_DEBOUNCE / 4).await;
    watcher.handle_event(modified(path.clone()));
    assert_eq!(watcher.pending_changes(), 1);

    assert!(wait_until(Duration::from_secs(5), || library.track(INTRO_FILE).is_some()).await);
    tokio::time::sleep(ADD_DEBOUNCE * 2).await;
    assert_eq!(library.extractor.calls(), 1);
    assert_eq!(watcher.pending_changes(), 0);
}

#[tokio::test]
async fn test_unlink_removes_track_and_sole_artist() {
    let library = TestLibrary::new();
    library.write_track(INTRO_FILE, tags("Intro", Some("X"), None));
    let unknown = library.write_track(UNKNOWN_FILE, tags("Unknown", Some("Solo"), None));
    library.engine.rescan(false).await.unwrap();
    let mut track_events = library.engine.events().subscribe_tracks();

    std::fs::remove_file(&unknown).unwrap();
    library
        .engine
        .watcher()
        .handle_event(event(EventKind::Remove(RemoveKind::File), unknown.clone()));

    assert!(wait_until(Duration::from_secs(5), || library.track(UNKNOWN_FILE).is_none()).await);
    let artists = library.store().get_all_artists(10, 0).unwrap();
    assert_eq!(artists.len(), 1);
    assert_eq!(artists[0].name, "X");
    match track_events.recv().await.unwrap() {
        TrackEvent::Removed { path, .. } => assert_eq!(path, unknown.to_string_lossy()),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_deleted_directory_removes_its_tracks() {
    let library = TestLibrary::new();
    library.write_track("keep.mp3", tags("Keep", None, None));
    library.write_track("old/a.mp3", tags("A", None, None));
    library.write_track("old/b.mp3", tags("B", None, None));
    library.engine.rescan(false).await.unwrap();

    std::fs::remove_dir_all(library.path("old")).unwrap();
    library.engine.watcher().handle_event(event(
        EventKind::Remove(RemoveKind::Folder),
        library.path("old"),
    ));

    assert!(
        wait_until(Duration::from_secs(5), || library.store().get_track_count().unwrap() == 1)
            .await
    );
    assert!(library.track("keep.mp3").is_some());
}

#[tokio::test]
async fn test_rename_moves_track() {
    let library = TestLibrary::new();
    let old = library.write_track("old name.mp3", tags("Song", Some("X"), None));
    library.engine.rescan(false).await.unwrap();

    let new = library.path("new name.mp3");
    std::fs::rename(&old, &new).unwrap();
    library.extractor.set_tags("new name.mp3", tags("Song", Some("X"), None));
    library.engine.watcher().handle_event(
        Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(old.clone())
            .add_path(new.clone()),
    );

    assert!(
        wait_until(Duration::from_secs(5), || {
            library.track("old name.mp3").is_none() && library.track("new name.mp3").is_some()
        })
        .await
    );
    assert_eq!(library.store().get_track_count().unwrap(), 1);
}

#[tokio::test]
async fn test_excluded_paths_are_ignored() {
    let library = TestLibrary::with_settings(|s| s.exclude_patterns = vec!["Incoming".to_string()]);
    let path = library.write_track("Incoming/new.mp3", tags("New", None, None));

    library
        .engine
        .watcher()
        .handle_event(event(EventKind::Create(CreateKind::File), path));

    assert_eq!(library.engine.watcher().pending_changes(), 0);
    tokio::time::sleep(ADD_DEBOUNCE * 2).await;
    assert_eq!(library.extractor.calls(), 0);
}

#[tokio::test]
async fn test_new_files_not_indexed_when_auto_index_off() {
    let library = TestLibrary::with_settings(|s| s.auto_index_new_files = false);
    let known = library.write_track("known.mp3", tags("Known", None, None));
    library.engine.rescan(false).await.unwrap();
    let calls = library.extractor.calls();

    let fresh = library.write_track("fresh.mp3", tags("Fresh", None, None));
    library
        .extractor
        .set_tags("known.mp3", tags("Known (Edit)", None, None));
    // Make sure the modification time moves on
    tokio::time::sleep(Duration::from_millis(20)).await;
    std::fs::write(&known, b"re-tagged audio").unwrap();

    let watcher = library.engine.watcher();
    watcher.handle_event(event(EventKind::Create(CreateKind::File), fresh));
    watcher.handle_event(modified(known));

    assert!(
        wait_until(Duration::from_secs(5), || {
            library.track("known.mp3").map(|t| t.title) == Some("Known (Edit)".to_string())
        })
        .await
    );
    tokio::time::sleep(ADD_DEBOUNCE * 2).await;
    assert!(library.track("fresh.mp3").is_none());
    assert_eq!(library.extractor.calls(), calls + 1);
}

#[tokio::test]
async fn test_real_watcher_indexes_new_file() {
    let library = TestLibrary::new();
    let mut watcher_events = library.engine.events().subscribe_watcher();
    library.engine.set_watch_enabled(true).await;
    assert!(library.engine.watcher().is_watching(&library.root));
    assert_eq!(
        watcher_events.recv().await.unwrap(),
        WatcherEvent::Started {
            root: library.root.clone()
        }
    );

    library.write_track("dropped in.mp3", tags("Dropped In", Some("X"), None));

    assert!(wait_until(Duration::from_secs(10), || library.track("dropped in.mp3").is_some()).await);

    library.engine.set_watch_enabled(false).await;
    assert!(!library.engine.watcher().is_watching(&library.root));
    assert_eq!(
        watcher_events.recv().await.unwrap(),
        WatcherEvent::Stopped {
            root: library.root.clone()
        }
    );
}

#[tokio::test]
async fn test_shutdown_drops_pending_changes() {
    let library = TestLibrary::with_settings(|s| s.add_debounce_ms = 60_000);
    let path = library.write_track(INTRO_FILE, tags("Intro", None, None));
    library.engine.watcher().handle_event(modified(path));
    assert_eq!(library.engine.watcher().pending_changes(), 1);

    library.engine.shutdown().await;

    assert_eq!(library.engine.watcher().pending_changes(), 0);
    assert_eq!(library.extractor.calls(), 0);
}
