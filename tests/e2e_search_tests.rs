//! End-to-end tests for search, filters and saved filters over a scanned library

mod common;

use common::{tags, TestLibrary, INTRO_FILE, UNKNOWN_FILE};
use pezzottify_library::metadata::TrackTags;
use pezzottify_library::{FilterCriteria, Range, SearchQuery, SearchType};

async fn scanned_library() -> TestLibrary {
    let library = TestLibrary::new();
    library.write_track(INTRO_FILE, tags("Intro", Some("X"), Some("First Light")));
    library.write_file(UNKNOWN_FILE, b"no tags here");
    library.write_track(
        "02 - Night Drive.flac",
        TrackTags {
            year: Some(1999),
            genre: Some("Synthwave".to_string()),
            ..tags("Night Drive", Some("X"), Some("First Light"))
        },
    );
    library.write_track(
        "jazz/So What.mp3",
        TrackTags {
            year: Some(1959),
            genre: Some("Jazz".to_string()),
            lyrics: Some("instrumental".to_string()),
            duration_ms: 545_000,
            ..tags("So What", Some("Miles"), Some("Kind of Blue"))
        },
    );
    library.engine.rescan(false).await.unwrap();
    library
}

// =============================================================================
// Search
// =============================================================================

#[tokio::test]
async fn test_search_finds_track_and_records_history() {
    let library = scanned_library().await;
    let history_before = library.store().get_search_history(100).unwrap().len();

    let results = library
        .store()
        .search_tracks(&SearchQuery::new("intro", SearchType::Tracks))
        .unwrap();

    assert_eq!(results.tracks.len(), 1);
    assert_eq!(results.tracks[0].title, "Intro");
    assert!(!results.used_fallback);
    let history = library.store().get_search_history(100).unwrap();
    assert_eq!(history.len(), history_before + 1);
    assert_eq!(history[0].query, "intro");
    assert_eq!(history[0].search_type, "tracks");
}

#[tokio::test]
async fn test_search_all_types() {
    let library = scanned_library().await;

    let results = library
        .store()
        .search_tracks(&SearchQuery::new("first", SearchType::All))
        .unwrap();

    assert_eq!(results.tracks.len(), 2);
    assert_eq!(results.albums.len(), 1);
    assert_eq!(results.albums[0].name, "First Light");
    assert!(results.artists.is_empty());
}

#[tokio::test]
async fn test_malformed_query_uses_fallback() {
    let library = scanned_library().await;

    let results = library
        .store()
        .search_tracks(&SearchQuery::new("\"night", SearchType::Tracks))
        .unwrap();

    assert!(results.used_fallback);
    assert_eq!(results.tracks.len(), 1);
    assert_eq!(results.tracks[0].title, "Night Drive");
}

#[tokio::test]
async fn test_fuzzy_search_matches_prefixes() {
    let library = scanned_library().await;

    let exact = library
        .store()
        .search_tracks(&SearchQuery::new("nig", SearchType::Tracks))
        .unwrap();
    let fuzzy = library
        .store()
        .search_tracks(&SearchQuery::new("nig", SearchType::Tracks).fuzzy(true))
        .unwrap();

    assert!(exact.tracks.is_empty());
    assert_eq!(fuzzy.tracks.len(), 1);
}

// =============================================================================
// Filters
// =============================================================================

#[tokio::test]
async fn test_filter_by_exact_year() {
    let library = scanned_library().await;
    let criteria = FilterCriteria {
        years: Some(Range::between(1959, 1959)),
        ..Default::default()
    };

    let tracks = library
        .store()
        .get_tracks_with_filters(&criteria, 100, 0)
        .unwrap();

    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].title, "So What");
    assert_eq!(library.store().count_tracks_with_filters(&criteria).unwrap(), 1);
}

#[tokio::test]
async fn test_filter_combines_criteria() {
    let library = scanned_library().await;
    let criteria = FilterCriteria {
        artists: vec!["X".to_string(), "Miles".to_string()],
        duration: Some(Range::at_least(200)),
        has_lyrics: Some(true),
        ..Default::default()
    };

    let tracks = library
        .store()
        .get_tracks_with_filters(&criteria, 100, 0)
        .unwrap();

    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].artist.as_deref(), Some("Miles"));
}

#[tokio::test]
async fn test_empty_criteria_returns_whole_library() {
    let library = scanned_library().await;
    let criteria = FilterCriteria::default();
    assert_eq!(library.store().count_tracks_with_filters(&criteria).unwrap(), 4);
}

#[tokio::test]
async fn test_saved_filter_round_trip() {
    let library = scanned_library().await;
    let criteria = FilterCriteria {
        genres: vec!["Jazz".to_string()],
        years: Some(Range::at_most(1970)),
        ..Default::default()
    };

    library.store().save_filter("Old jazz", &criteria).unwrap();
    let saved = library.store().get_saved_filter("Old jazz").unwrap().unwrap();
    assert_eq!(saved.criteria, criteria);

    let tracks = library
        .store()
        .get_tracks_with_filters(&saved.criteria, 100, 0)
        .unwrap();
    assert_eq!(tracks.len(), 1);

    assert!(library.store().delete_saved_filter("Old jazz").unwrap());
    assert!(library.store().list_saved_filters().unwrap().is_empty());
}
