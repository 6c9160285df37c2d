//! Library search.
//!
//! Track search goes through the FTS5 index ranked by BM25. When SQLite rejects
//! the match expression (unbalanced quotes, bare operators, ...) the same query
//! is answered by a LIKE scan instead; callers only see `used_fallback` flip.

mod fallback;
mod fts5_search;

use crate::error::{LibraryError, Result};
use crate::library_store::{Album, Artist, SqliteLibraryStore, Track};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Tracks,
    Albums,
    Artists,
    All,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Tracks => "tracks",
            SearchType::Albums => "albums",
            SearchType::Artists => "artists",
            SearchType::All => "all",
        }
    }

    fn includes_tracks(&self) -> bool {
        matches!(self, SearchType::Tracks | SearchType::All)
    }

    fn includes_albums(&self) -> bool {
        matches!(self, SearchType::Albums | SearchType::All)
    }

    fn includes_artists(&self) -> bool {
        matches!(self, SearchType::Artists | SearchType::All)
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tracks" | "track" => Ok(SearchType::Tracks),
            "albums" | "album" => Ok(SearchType::Albums),
            "artists" | "artist" => Ok(SearchType::Artists),
            "all" => Ok(SearchType::All),
            other => Err(format!("unknown search type '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub search_type: SearchType,
    pub limit: usize,
    pub offset: usize,
    /// Append a prefix wildcard to every term.
    pub fuzzy: bool,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, search_type: SearchType) -> Self {
        Self {
            query: query.into(),
            search_type,
            limit: 50,
            offset: 0,
            fuzzy: false,
        }
    }

    pub fn fuzzy(mut self, fuzzy: bool) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub tracks: Vec<Track>,
    pub albums: Vec<Album>,
    pub artists: Vec<Artist>,
    pub elapsed_ms: u64,
    /// The full-text engine rejected the query and substring matching answered it.
    pub used_fallback: bool,
}

/// Whitespace separated terms of `query`.
pub(crate) fn terms(query: &str) -> Vec<&str> {
    query.split_whitespace().collect()
}

/// `%term%` with LIKE wildcards in the term escaped by `\`.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl SqliteLibraryStore {
    /// Search tracks, albums and/or artists. Each call appends one history entry.
    pub fn search_tracks(&self, query: &SearchQuery) -> Result<SearchResults> {
        self.timed(
            "search_tracks",
            || self.run_search(query),
            |results: &SearchResults| {
                json!({
                    "type": query.search_type.as_str(),
                    "tracks": results.tracks.len(),
                    "albums": results.albums.len(),
                    "artists": results.artists.len(),
                    "fallback": results.used_fallback,
                })
            },
        )
    }

    fn run_search(&self, query: &SearchQuery) -> Result<SearchResults> {
        let started = Instant::now();
        let mut results = SearchResults::default();
        let trimmed = query.query.trim();

        if !trimmed.is_empty() {
            if query.search_type.includes_tracks() {
                match self.fts_search(trimmed, query.fuzzy, query.limit, query.offset) {
                    Ok(tracks) => results.tracks = tracks,
                    Err(LibraryError::SearchEngine(e)) => {
                        warn!(
                            "Full-text search for '{}' failed, using fallback: {}",
                            trimmed, e
                        );
                        results.tracks = self.fallback_search(trimmed, query.limit, query.offset)?;
                        results.used_fallback = true;
                    }
                    Err(e) => return Err(e),
                }
            }
            if query.search_type.includes_albums() {
                results.albums = self.search_albums(trimmed, query.limit, query.offset)?;
            }
            if query.search_type.includes_artists() {
                results.artists = self.search_artists(trimmed, query.limit, query.offset)?;
            }
        }

        self.record_search(&query.query, query.search_type.as_str())?;
        results.elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(
            "Search '{}' ({}) returned {} tracks, {} albums, {} artists in {}ms",
            trimmed,
            query.search_type,
            results.tracks.len(),
            results.albums.len(),
            results.artists.len(),
            results.elapsed_ms
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_store::test_support::track_at;

    pub(super) fn seeded_store() -> SqliteLibraryStore {
        let store = SqliteLibraryStore::in_memory().unwrap();
        let mut intro = track_at("/m/01 - Intro.mp3");
        intro.title = "Intro".to_string();
        intro.artist = Some("X".to_string());
        intro.album = Some("First Light".to_string());

        let mut interlude = track_at("/m/02 - Interlude.mp3");
        interlude.title = "Interlude".to_string();
        interlude.artist = Some("X".to_string());
        interlude.album = Some("First Light".to_string());
        interlude.genre = Some("Ambient".to_string());

        let mut other = track_at("/m/other.flac");
        other.title = "Morning".to_string();
        other.artist = Some("Introvert".to_string());
        other.lyrics = Some("wake up slowly".to_string());

        store.save_tracks_batch(&[intro, interlude, other]).unwrap();
        store
    }

    fn titles(tracks: &[Track]) -> Vec<&str> {
        let mut titles: Vec<&str> = tracks.iter().map(|t| t.title.as_str()).collect();
        titles.sort();
        titles
    }

    #[test]
    fn track_search_uses_full_text_index() {
        let store = seeded_store();
        let results = store
            .search_tracks(&SearchQuery::new("intro", SearchType::Tracks))
            .unwrap();
        assert!(!results.used_fallback);
        assert_eq!(titles(&results.tracks), vec!["Intro"]);
        assert!(results.albums.is_empty());
        assert!(results.artists.is_empty());
    }

    #[test]
    fn each_search_appends_one_history_row() {
        let store = seeded_store();
        store
            .search_tracks(&SearchQuery::new("intro", SearchType::Tracks))
            .unwrap();
        let history = store.get_search_history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query, "intro");
        assert_eq!(history[0].search_type, "tracks");
    }

    #[test]
    fn fuzzy_mode_matches_prefixes() {
        let store = seeded_store();
        let strict = store
            .search_tracks(&SearchQuery::new("inter", SearchType::Tracks))
            .unwrap();
        assert!(strict.tracks.is_empty());

        let fuzzy = store
            .search_tracks(&SearchQuery::new("inter", SearchType::Tracks).fuzzy(true))
            .unwrap();
        assert_eq!(titles(&fuzzy.tracks), vec!["Interlude"]);
    }

    #[test]
    fn search_covers_lyrics_and_genre() {
        let store = seeded_store();
        let by_lyrics = store
            .search_tracks(&SearchQuery::new("slowly", SearchType::Tracks))
            .unwrap();
        assert_eq!(titles(&by_lyrics.tracks), vec!["Morning"]);
        let by_genre = store
            .search_tracks(&SearchQuery::new("ambient", SearchType::Tracks))
            .unwrap();
        assert_eq!(titles(&by_genre.tracks), vec!["Interlude"]);
    }

    #[test]
    fn malformed_query_falls_back_with_same_shape() {
        let store = seeded_store();
        let results = store
            .search_tracks(&SearchQuery::new("\"intro", SearchType::Tracks))
            .unwrap();
        assert!(results.used_fallback);
        assert!(titles(&results.tracks).contains(&"Intro"));
        assert_eq!(store.get_search_history(10).unwrap().len(), 1);
    }

    #[test]
    fn all_type_searches_albums_and_artists_case_insensitively() {
        let store = seeded_store();
        let results = store
            .search_tracks(&SearchQuery::new("first", SearchType::All))
            .unwrap();
        assert_eq!(results.albums.len(), 1);
        assert_eq!(results.albums[0].name, "First Light");

        let results = store
            .search_tracks(&SearchQuery::new("INTRO", SearchType::Artists))
            .unwrap();
        assert_eq!(results.artists.len(), 1);
        assert_eq!(results.artists[0].name, "Introvert");
        assert!(results.tracks.is_empty());
    }

    #[test]
    fn search_type_parses_from_cli_strings() {
        assert_eq!("albums".parse::<SearchType>().unwrap(), SearchType::Albums);
        assert_eq!("Track".parse::<SearchType>().unwrap(), SearchType::Tracks);
        assert!("songs".parse::<SearchType>().is_err());
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }
}
