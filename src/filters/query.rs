use super::{FilterCriteria, Range};
use crate::error::Result;
use crate::library_store::{SqliteLibraryStore, Track, TRACK_COLUMNS};
use rusqlite::ToSql;
use serde_json::json;
use tracing::debug;

/// One field constraint: a SQL fragment plus the values it binds, in order.
pub struct Predicate {
    pub sql: String,
    pub params: Vec<Box<dyn ToSql>>,
}

/// Where clause assembled from a [`FilterCriteria`].
pub struct FilterQuery {
    pub predicates: Vec<Predicate>,
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn membership(columns: &[&str], values: &[String]) -> Option<Predicate> {
    let values: Vec<&String> = values.iter().filter(|v| !v.trim().is_empty()).collect();
    if values.is_empty() {
        return None;
    }
    let marks = placeholders(values.len());
    let sql = columns
        .iter()
        .map(|c| format!("{c} IN ({marks})"))
        .collect::<Vec<_>>()
        .join(" OR ");
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    for _ in columns {
        for value in &values {
            params.push(Box::new(value.to_string()));
        }
    }
    Some(Predicate {
        sql: format!("({sql})"),
        params,
    })
}

fn range<T: ToSql + Copy + 'static>(
    column: &str,
    range: &Option<Range<T>>,
    scale: impl Fn(T) -> T,
) -> Option<Predicate> {
    let range = range.as_ref().filter(|r| !r.is_open())?;
    let mut clauses = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some(min) = range.min {
        clauses.push(format!("{column} >= ?"));
        params.push(Box::new(scale(min)));
    }
    if let Some(max) = range.max {
        clauses.push(format!("{column} <= ?"));
        params.push(Box::new(scale(max)));
    }
    Some(Predicate {
        sql: format!("({})", clauses.join(" AND ")),
        params,
    })
}

fn presence(column: &str, wanted: Option<bool>) -> Option<Predicate> {
    let sql = match wanted? {
        true => format!("({column} IS NOT NULL AND {column} != '')"),
        false => format!("({column} IS NULL OR {column} = '')"),
    };
    Some(Predicate {
        sql,
        params: Vec::new(),
    })
}

impl FilterQuery {
    pub fn build(criteria: &FilterCriteria) -> Self {
        let lowercase_formats: Vec<String> =
            criteria.formats.iter().map(|f| f.to_lowercase()).collect();
        let predicates = [
            membership(&["artist", "album_artist"], &criteria.artists),
            membership(&["album"], &criteria.albums),
            membership(&["genre"], &criteria.genres),
            range("year", &criteria.years, |y| y),
            range("duration_ms", &criteria.duration, |secs| secs.saturating_mul(1000)),
            range("bitrate", &criteria.bitrate, |b| b),
            membership(&["format"], &lowercase_formats),
            range("play_count", &criteria.play_count, |c| c),
            range("date_added", &criteria.date_added, |d| d),
            presence("lyrics", criteria.has_lyrics),
            presence("artwork_id", criteria.has_artwork),
        ]
        .into_iter()
        .flatten()
        .collect();
        Self { predicates }
    }

    /// `WHERE ...` or an empty string when nothing is constrained.
    pub fn where_clause(&self) -> String {
        if self.predicates.is_empty() {
            return String::new();
        }
        let joined = self
            .predicates
            .iter()
            .map(|p| p.sql.as_str())
            .collect::<Vec<_>>()
            .join(" AND ");
        format!("WHERE {joined}")
    }

    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.predicates
            .iter()
            .flat_map(|p| p.params.iter().map(|b| b.as_ref()))
            .collect()
    }
}

impl SqliteLibraryStore {
    /// Tracks matching every populated criterion, in artist / album / track order.
    pub fn get_tracks_with_filters(
        &self,
        criteria: &FilterCriteria,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Track>> {
        let query = FilterQuery::build(criteria);
        self.timed(
            "get_tracks_with_filters",
            || self.select_filtered(&query, limit, offset),
            |tracks: &Vec<Track>| {
                json!({ "predicates": query.predicates.len(), "rows": tracks.len() })
            },
        )
    }

    fn select_filtered(&self, query: &FilterQuery, limit: usize, offset: usize) -> Result<Vec<Track>> {
        let sql = format!(
            "SELECT {} FROM tracks {}
             ORDER BY artist COLLATE NOCASE, album COLLATE NOCASE, track_number, title COLLATE NOCASE
             LIMIT {} OFFSET {}",
            TRACK_COLUMNS,
            query.where_clause(),
            limit,
            offset
        );
        debug!(
            "Filtering tracks with {} predicates",
            query.predicates.len()
        );
        self.with_read(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let tracks = stmt
                .query_map(query.params().as_slice(), SqliteLibraryStore::parse_track_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tracks)
        })
    }

    pub fn count_tracks_with_filters(&self, criteria: &FilterCriteria) -> Result<usize> {
        let query = FilterQuery::build(criteria);
        let sql = format!("SELECT COUNT(*) FROM tracks {}", query.where_clause());
        self.timed(
            "count_tracks_with_filters",
            || {
                self.with_read(|conn| {
                    let count: i64 =
                        conn.query_row(&sql, query.params().as_slice(), |r| r.get(0))?;
                    Ok(count as usize)
                })
            },
            |count: &usize| json!({ "predicates": query.predicates.len(), "rows": count }),
        )
    }
}
