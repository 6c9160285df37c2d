//! End-to-end tests for artwork resolution over a scanned library

mod common;

use common::{tags, TestLibrary, INTRO_FILE};
use pezzottify_library::artwork::{placeholder_png, ArtworkResolver};
use pezzottify_library::library_store::{album_id, ArtworkSource};
use pezzottify_library::metadata::ExtractedPicture;
use pezzottify_library::FilterCriteria;

fn png_picture() -> ExtractedPicture {
    ExtractedPicture {
        data: placeholder_png(),
        mime: "image/png".to_string(),
    }
}

#[tokio::test]
async fn test_embedded_picture_beats_cover_file_and_is_cached() {
    let library = TestLibrary::new();
    library.write_track(INTRO_FILE, tags("Intro", Some("X"), Some("First Light")));
    library.write_file("cover.png", &placeholder_png());
    library.pictures.set_picture(INTRO_FILE, png_picture());
    library.engine.rescan(false).await.unwrap();
    let track = library.track(INTRO_FILE).unwrap();

    let first = library.engine.artwork().get_track_artwork(&track);
    assert_eq!(first.source, ArtworkSource::Embedded);
    assert_eq!(library.pictures.calls(), 1);

    let second = library.engine.artwork().get_track_artwork(&track);
    assert_eq!(second.id, first.id);
    assert_eq!(library.pictures.calls(), 1);
}

#[tokio::test]
async fn test_picture_found_during_scan_is_persisted() {
    let library = TestLibrary::new();
    library.write_track(INTRO_FILE, tags("Intro", Some("X"), Some("First Light")));
    library.extractor.set_picture(INTRO_FILE, png_picture());
    library.engine.rescan(false).await.unwrap();

    let track = library.track(INTRO_FILE).unwrap();
    let artwork_id = track.artwork_id.clone().unwrap();
    let stored = library.store().get_artwork(&artwork_id).unwrap().unwrap();
    assert_eq!(stored.track_id.as_deref(), Some(track.id.as_str()));
    assert_eq!(stored.album_id, Some(album_id("X", "First Light")));
    assert_eq!(stored.width, Some(64));

    library.engine.artwork().clear_cache();
    let resolved = library.engine.artwork().get_track_artwork(&track);
    assert_eq!(resolved.id, artwork_id);
    assert_eq!(library.pictures.calls(), 0);

    // A forced rescan updates the same row
    library.engine.rescan(true).await.unwrap();
    let rescanned = library.track(INTRO_FILE).unwrap();
    assert_eq!(rescanned.artwork_id, Some(artwork_id));
}

#[tokio::test]
async fn test_cover_file_used_without_embedded_picture() {
    let library = TestLibrary::new();
    library.write_track(INTRO_FILE, tags("Intro", Some("X"), Some("First Light")));
    library.write_file("folder.png", &placeholder_png());
    library.write_file("cover.png", &placeholder_png());
    library.engine.rescan(false).await.unwrap();
    let track = library.track(INTRO_FILE).unwrap();

    let artwork = library.engine.artwork().get_track_artwork(&track);

    assert_eq!(artwork.source, ArtworkSource::Directory);
    assert_eq!(
        artwork.source_path.as_deref(),
        Some(library.path_str("cover.png").as_str())
    );
    assert_eq!(artwork.format, "image/png");
}

fn with_artwork_count(library: &common::TestLibrary) -> usize {
    let criteria = FilterCriteria {
        has_artwork: Some(true),
        ..Default::default()
    };
    library.store().count_tracks_with_filters(&criteria).unwrap()
}

#[tokio::test]
async fn test_removed_embedded_picture_is_cleared_on_rescan() {
    let library = TestLibrary::new();
    library.write_track(INTRO_FILE, tags("Intro", Some("X"), Some("First Light")));
    library.extractor.set_picture(INTRO_FILE, png_picture());
    library.engine.rescan(false).await.unwrap();
    let old_id = library.track(INTRO_FILE).unwrap().artwork_id.unwrap();
    assert_eq!(with_artwork_count(&library), 1);

    library.extractor.clear_picture(INTRO_FILE);
    let summary = library.engine.rescan(true).await.unwrap();
    assert_eq!(summary.updated, 1);

    let track = library.track(INTRO_FILE).unwrap();
    assert_eq!(track.artwork_id, None);
    assert_eq!(with_artwork_count(&library), 0);
    assert!(library.store().get_artwork(&old_id).unwrap().is_none());
    assert!(library.store().get_artwork_for_track(&track.id).unwrap().is_none());
    let album = library
        .store()
        .get_album(&album_id("X", "First Light"))
        .unwrap()
        .unwrap();
    assert_eq!(album.artwork_id, None);

    let resolved = library.engine.artwork().get_track_artwork(&track);
    assert!(ArtworkResolver::is_placeholder(&resolved));
    assert_eq!(resolved.source, ArtworkSource::Generated);
}

#[tokio::test]
async fn test_folder_cover_becomes_album_artwork_during_scan() {
    let library = TestLibrary::new();
    library.write_track(INTRO_FILE, tags("Intro", Some("X"), Some("First Light")));
    library.write_track("02 - Outro.mp3", tags("Outro", Some("X"), Some("First Light")));
    library.write_file("cover.jpg", b"\xFF\xD8\xFF\xE0jpeg");
    library.engine.rescan(false).await.unwrap();

    let album = library
        .store()
        .get_album(&album_id("X", "First Light"))
        .unwrap()
        .unwrap();
    let artwork_id = album.artwork_id.clone().unwrap();
    let stored = library.store().get_artwork(&artwork_id).unwrap().unwrap();
    assert_eq!(stored.source, ArtworkSource::Directory);
    assert_eq!(stored.track_id, None);
    assert_eq!(stored.source_path, Some(library.path_str("cover.jpg")));
    assert_eq!(stored.format, "image/jpeg");

    // Track artwork keeps naming embedded pictures only
    let track = library.track(INTRO_FILE).unwrap();
    assert_eq!(track.artwork_id, None);
    assert_eq!(with_artwork_count(&library), 0);

    let resolved = library.engine.artwork().get_track_artwork(&track);
    assert_eq!(resolved.id, artwork_id);
    assert_eq!(resolved.source, ArtworkSource::Directory);
    let for_album = library
        .engine
        .artwork()
        .get_album_artwork(&album_id("X", "First Light"));
    assert_eq!(for_album.id, artwork_id);

    // Rescanning reuses the row
    library.engine.rescan(true).await.unwrap();
    let album = library
        .store()
        .get_album(&album_id("X", "First Light"))
        .unwrap()
        .unwrap();
    assert_eq!(album.artwork_id, Some(artwork_id));
}

#[tokio::test]
async fn test_placeholder_when_nothing_found() {
    let library = TestLibrary::new();
    library.write_track(INTRO_FILE, tags("Intro", Some("X"), Some("First Light")));
    library.engine.rescan(false).await.unwrap();
    let track = library.track(INTRO_FILE).unwrap();

    let artwork = library.engine.artwork().get_track_artwork(&track);
    assert!(ArtworkResolver::is_placeholder(&artwork));

    let album = library
        .engine
        .artwork()
        .get_album_artwork(&album_id("X", "First Light"));
    assert!(ArtworkResolver::is_placeholder(&album));
}

#[tokio::test]
async fn test_preload_warms_cache() {
    let library = TestLibrary::new();
    for i in 0..12 {
        let name = format!("{:02}.mp3", i);
        library.write_track(&name, tags(&format!("T{}", i), Some("X"), None));
        if i % 2 == 0 {
            library.pictures.set_picture(&name, png_picture());
        }
    }
    library.engine.rescan(false).await.unwrap();
    let tracks = library.store().get_all_tracks(100, 0).unwrap();

    let with_art = library.engine.artwork().preload_artwork(tracks.clone()).await;

    assert_eq!(with_art, 6);
    let calls = library.pictures.calls();
    for track in &tracks {
        library.engine.artwork().get_track_artwork(track);
    }
    assert_eq!(library.pictures.calls(), calls);
}
