//! Substring search used when the full-text engine cannot answer a query.

use super::{like_pattern, terms};
use crate::error::Result;
use crate::library_store::{
    Album, Artist, SqliteLibraryStore, Track, ALBUM_COLUMNS, ARTIST_COLUMNS, TRACK_COLUMNS,
};
use rusqlite::ToSql;

const SEARCHABLE_COLUMNS: [&str; 6] = ["title", "artist", "album", "genre", "composer", "lyrics"];

/// Query terms with full-text syntax stripped: quotes, prefix stars, grouping
/// and the bare boolean operators.
fn plain_terms(query: &str) -> Vec<String> {
    terms(query)
        .into_iter()
        .map(|term| {
            term.trim_matches(|c: char| matches!(c, '"' | '*' | '(' | ')' | '^' | '+' | ':'))
                .to_string()
        })
        .filter(|term| !term.is_empty() && !matches!(term.as_str(), "AND" | "OR" | "NOT" | "NEAR"))
        .collect()
}

impl SqliteLibraryStore {
    /// Every term must appear in at least one searchable column. Exact title
    /// matches sort first, then exact artist, then exact album, then by title.
    pub(crate) fn fallback_search(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Track>> {
        let terms = plain_terms(query);
        let mut clauses = Vec::with_capacity(terms.len());
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();
        for term in &terms {
            let pattern = like_pattern(term);
            let any_column = SEARCHABLE_COLUMNS
                .iter()
                .map(|c| format!("{} LIKE ? ESCAPE '\\'", c))
                .collect::<Vec<_>>()
                .join(" OR ");
            clauses.push(format!("({})", any_column));
            for _ in SEARCHABLE_COLUMNS {
                params.push(Box::new(pattern.clone()));
            }
        }
        let where_clause = if clauses.is_empty() {
            "0".to_string()
        } else {
            clauses.join(" AND ")
        };

        let sql = format!(
            "SELECT {} FROM tracks WHERE {}
             ORDER BY
                CASE WHEN title = ? COLLATE NOCASE THEN 0
                     WHEN artist = ? COLLATE NOCASE THEN 1
                     WHEN album = ? COLLATE NOCASE THEN 2
                     ELSE 3 END,
                title COLLATE NOCASE
             LIMIT ? OFFSET ?",
            TRACK_COLUMNS, where_clause
        );
        for _ in 0..3 {
            params.push(Box::new(query.to_string()));
        }
        params.push(Box::new(limit as i64));
        params.push(Box::new(offset as i64));

        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        self.with_read(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let tracks = stmt
                .query_map(param_refs.as_slice(), SqliteLibraryStore::parse_track_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tracks)
        })
    }

    pub(crate) fn search_albums(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<Album>> {
        let pattern = like_pattern(query);
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM albums
                 WHERE name LIKE ?1 ESCAPE '\\' OR artist LIKE ?1 ESCAPE '\\'
                 ORDER BY name COLLATE NOCASE, artist COLLATE NOCASE
                 LIMIT ?2 OFFSET ?3",
                ALBUM_COLUMNS
            ))?;
            let albums = stmt
                .query_map(
                    rusqlite::params![pattern, limit as i64, offset as i64],
                    SqliteLibraryStore::parse_album_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(albums)
        })
    }

    pub(crate) fn search_artists(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Artist>> {
        let pattern = like_pattern(query);
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM artists WHERE name LIKE ?1 ESCAPE '\\'
                 ORDER BY name COLLATE NOCASE LIMIT ?2 OFFSET ?3",
                ARTIST_COLUMNS
            ))?;
            let artists = stmt
                .query_map(
                    rusqlite::params![pattern, limit as i64, offset as i64],
                    SqliteLibraryStore::parse_artist_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(artists)
        })
    }
}
