//! FTS5 track search ranked with BM25.

use super::terms;
use crate::error::{LibraryError, Result};
use crate::library_store::{SqliteLibraryStore, Track, TRACK_COLUMNS};
use rusqlite::params;

/// Column weights for title, artist, album, genre, composer and lyrics.
const BM25_WEIGHTS: &str = "10.0, 6.0, 4.0, 2.0, 2.0, 1.0";

/// Terms are passed through untouched so SQLite can reject bad syntax and the
/// caller can fall back; fuzzy mode turns each term into a prefix query.
pub(crate) fn match_expression(query: &str, fuzzy: bool) -> String {
    terms(query)
        .into_iter()
        .map(|term| {
            if fuzzy && !term.ends_with('*') {
                format!("{}*", term)
            } else {
                term.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn qualified_track_columns(alias: &str) -> String {
    TRACK_COLUMNS
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

impl SqliteLibraryStore {
    /// Engine-level failures come back as `SearchEngine` so the caller can fall back.
    pub(crate) fn fts_search(
        &self,
        query: &str,
        fuzzy: bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Track>> {
        let expression = match_expression(query, fuzzy);
        let sql = format!(
            "SELECT {} FROM tracks_fts
             JOIN tracks t ON t.rowid = tracks_fts.rowid
             WHERE tracks_fts MATCH ?1
             ORDER BY bm25(tracks_fts, {}), t.title COLLATE NOCASE
             LIMIT ?2 OFFSET ?3",
            qualified_track_columns("t"),
            BM25_WEIGHTS
        );
        self.with_read(|conn| {
            let run = || -> rusqlite::Result<Vec<Track>> {
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(
                    params![expression, limit as i64, offset as i64],
                    SqliteLibraryStore::parse_track_row,
                )?;
                rows.collect()
            };
            run().map_err(LibraryError::SearchEngine)
        })
    }
}
