//! Saved filters and search history.

use super::models::{SavedFilter, SearchHistoryEntry};
use super::now_millis;
use super::store::SqliteLibraryStore;
use crate::error::Result;
use crate::filters::FilterCriteria;
use rusqlite::{params, Connection, OptionalExtension};

impl SqliteLibraryStore {
    // =========================================================================
    // Saved Filters
    // =========================================================================

    /// Create or replace the filter called `name`. `created_at` survives updates.
    pub fn save_filter(&self, name: &str, criteria: &FilterCriteria) -> Result<SavedFilter> {
        let json = serde_json::to_string(criteria)?;
        let now = now_millis();
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO saved_filters (name, criteria, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                    criteria = excluded.criteria,
                    updated_at = excluded.updated_at",
                params![name, json, now],
            )?;
            Ok(())
        })?;
        self.get_saved_filter(name)?
            .ok_or(crate::error::LibraryError::Storage(
                rusqlite::Error::QueryReturnedNoRows,
            ))
    }

    pub fn get_saved_filter(&self, name: &str) -> Result<Option<SavedFilter>> {
        let row: Option<(String, String, i64, i64)> = self.with_read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT name, criteria, created_at, updated_at FROM saved_filters WHERE name = ?1",
                    params![name],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
                )
                .optional()?)
        })?;
        row.map(|(name, criteria, created_at, updated_at)| {
            Ok(SavedFilter {
                name,
                criteria: serde_json::from_str(&criteria)?,
                created_at,
                updated_at,
            })
        })
        .transpose()
    }

    pub fn list_saved_filters(&self) -> Result<Vec<SavedFilter>> {
        let rows: Vec<(String, String, i64, i64)> = self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT name, criteria, created_at, updated_at FROM saved_filters
                 ORDER BY name COLLATE NOCASE",
            )?;
            let rows = stmt
                .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.into_iter()
            .map(|(name, criteria, created_at, updated_at)| {
                Ok(SavedFilter {
                    name,
                    criteria: serde_json::from_str(&criteria)?,
                    created_at,
                    updated_at,
                })
            })
            .collect()
    }

    /// Returns false if no filter had that name.
    pub fn delete_saved_filter(&self, name: &str) -> Result<bool> {
        self.with_write(|conn| {
            let deleted = conn.execute("DELETE FROM saved_filters WHERE name = ?1", params![name])?;
            Ok(deleted > 0)
        })
    }

    // =========================================================================
    // Search History
    // =========================================================================

    /// Append one history entry and keep only the newest `search_history_limit` rows.
    pub fn record_search(&self, query: &str, search_type: &str) -> Result<()> {
        let limit = self.search_history_limit as i64;
        self.with_write(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO search_history (query, search_type, created_at) VALUES (?1, ?2, ?3)",
                params![query, search_type, now_millis()],
            )?;
            prune_history(&tx, limit)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Newest entries first.
    pub fn get_search_history(&self, limit: usize) -> Result<Vec<SearchHistoryEntry>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT rowid, query, search_type, created_at FROM search_history
                 ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            )?;
            let entries = stmt
                .query_map(params![limit as i64], |r| {
                    Ok(SearchHistoryEntry {
                        id: r.get(0)?,
                        query: r.get(1)?,
                        search_type: r.get(2)?,
                        created_at: r.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }

    pub fn clear_search_history(&self) -> Result<usize> {
        self.with_write(|conn| Ok(conn.execute("DELETE FROM search_history", [])?))
    }
}

fn prune_history(conn: &Connection, keep: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM search_history WHERE rowid NOT IN (
            SELECT rowid FROM search_history ORDER BY created_at DESC, rowid DESC LIMIT ?1
         )",
        params![keep],
    )
}
