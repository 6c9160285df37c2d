//! Persisted artwork rows.

use super::models::{AlbumArtwork, ArtworkSource};
use super::store::SqliteLibraryStore;
use crate::error::Result;
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

const ARTWORK_COLUMNS: &str =
    "id, track_id, album_id, data, format, width, height, size, source, source_path, created_at";

fn parse_artwork_row(row: &Row) -> rusqlite::Result<AlbumArtwork> {
    let source: String = row.get("source")?;
    Ok(AlbumArtwork {
        id: row.get("id")?,
        track_id: row.get("track_id")?,
        album_id: row.get("album_id")?,
        data: row.get("data")?,
        format: row.get("format")?,
        width: row.get("width")?,
        height: row.get("height")?,
        size: row.get("size")?,
        source: ArtworkSource::from_db_str(&source),
        source_path: row.get("source_path")?,
        created_at: row.get("created_at")?,
    })
}

impl SqliteLibraryStore {
    /// Insert or replace an artwork row by id.
    pub fn save_artwork(&self, artwork: &AlbumArtwork) -> Result<()> {
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO album_artwork (id, track_id, album_id, data, format, width, height,
                                            size, source, source_path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                    track_id = excluded.track_id,
                    album_id = excluded.album_id,
                    data = excluded.data,
                    format = excluded.format,
                    width = excluded.width,
                    height = excluded.height,
                    size = excluded.size,
                    source = excluded.source,
                    source_path = excluded.source_path",
                params![
                    artwork.id,
                    artwork.track_id,
                    artwork.album_id,
                    artwork.data,
                    artwork.format,
                    artwork.width,
                    artwork.height,
                    artwork.size,
                    artwork.source.to_db_str(),
                    artwork.source_path,
                    artwork.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_artwork(&self, id: &str) -> Result<Option<AlbumArtwork>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM album_artwork WHERE id = ?1",
                ARTWORK_COLUMNS
            ))?;
            Ok(stmt.query_row(params![id], parse_artwork_row).optional()?)
        })
    }

    /// Most recent artwork row owned by `track_id`.
    pub fn get_artwork_for_track(&self, track_id: &str) -> Result<Option<AlbumArtwork>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM album_artwork WHERE track_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                ARTWORK_COLUMNS
            ))?;
            Ok(stmt.query_row(params![track_id], parse_artwork_row).optional()?)
        })
    }

    /// Artwork row for `album_id`, embedded pictures before folder images,
    /// newest first.
    pub fn get_artwork_for_album(&self, album_id: &str) -> Result<Option<AlbumArtwork>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM album_artwork WHERE album_id = ?1
                 ORDER BY (source = 'embedded') DESC, created_at DESC, rowid DESC LIMIT 1",
                ARTWORK_COLUMNS
            ))?;
            Ok(stmt.query_row(params![album_id], parse_artwork_row).optional()?)
        })
    }

    /// Delete the rows of `source` owned by `track_id`. Returns the album ids
    /// those rows belonged to.
    pub fn delete_track_artwork(&self, track_id: &str, source: ArtworkSource) -> Result<Vec<String>> {
        self.with_write(|conn| {
            let tx = conn.transaction()?;
            let albums = {
                let mut stmt = tx.prepare_cached(
                    "SELECT DISTINCT album_id FROM album_artwork
                     WHERE track_id = ?1 AND source = ?2 AND album_id IS NOT NULL",
                )?;
                let rows = stmt.query_map(params![track_id, source.to_db_str()], |row| {
                    row.get::<_, String>(0)
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            tx.execute(
                "DELETE FROM album_artwork WHERE track_id = ?1 AND source = ?2",
                params![track_id, source.to_db_str()],
            )?;
            tx.commit()?;
            Ok(albums)
        })
    }

    /// Delete artwork no live track, album or track reference points at.
    pub fn delete_orphaned_artwork(&self) -> Result<usize> {
        let removed = self.with_write(|conn| {
            Ok(conn.execute(
                "DELETE FROM album_artwork
                 WHERE (track_id IS NULL OR track_id NOT IN (SELECT id FROM tracks))
                   AND (album_id IS NULL OR album_id NOT IN (SELECT id FROM albums))
                   AND id NOT IN (SELECT artwork_id FROM tracks WHERE artwork_id IS NOT NULL)
                   AND id NOT IN (SELECT artwork_id FROM albums WHERE artwork_id IS NOT NULL)",
                [],
            )?)
        })?;
        if removed > 0 {
            info!("Deleted {} orphaned artwork rows", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_store::test_support::track_at;

    fn artwork(id: &str, track_id: Option<&str>, album_id: Option<&str>) -> AlbumArtwork {
        AlbumArtwork {
            id: id.to_string(),
            track_id: track_id.map(str::to_string),
            album_id: album_id.map(str::to_string),
            data: vec![1, 2, 3],
            format: "image/png".to_string(),
            width: Some(1),
            height: Some(1),
            size: 3,
            source: ArtworkSource::Directory,
            source_path: Some("/m/cover.png".to_string()),
            created_at: 10,
        }
    }

    #[test]
    fn artwork_lookups_by_owner() {
        let store = SqliteLibraryStore::in_memory().unwrap();
        store
            .save_artwork(&artwork("a1", Some("t1"), Some("al1")))
            .unwrap();

        let by_id = store.get_artwork("a1").unwrap().unwrap();
        assert_eq!(by_id.data, vec![1, 2, 3]);
        assert_eq!(by_id.source, ArtworkSource::Directory);
        assert_eq!(store.get_artwork_for_track("t1").unwrap().unwrap().id, "a1");
        assert_eq!(store.get_artwork_for_album("al1").unwrap().unwrap().id, "a1");
        assert!(store.get_artwork_for_track("t2").unwrap().is_none());
    }

    #[test]
    fn album_lookup_prefers_embedded_rows() {
        let store = SqliteLibraryStore::in_memory().unwrap();
        let mut embedded = artwork("emb", Some("t1"), Some("al1"));
        embedded.source = ArtworkSource::Embedded;
        store.save_artwork(&embedded).unwrap();
        let mut folder = artwork("dir", None, Some("al1"));
        folder.created_at = 20;
        store.save_artwork(&folder).unwrap();

        assert_eq!(store.get_artwork_for_album("al1").unwrap().unwrap().id, "emb");
    }

    #[test]
    fn deleting_track_artwork_only_touches_that_source() {
        let store = SqliteLibraryStore::in_memory().unwrap();
        let mut embedded = artwork("emb", Some("t1"), Some("al1"));
        embedded.source = ArtworkSource::Embedded;
        store.save_artwork(&embedded).unwrap();
        store.save_artwork(&artwork("dir", Some("t1"), None)).unwrap();

        let albums = store
            .delete_track_artwork("t1", ArtworkSource::Embedded)
            .unwrap();
        assert_eq!(albums, vec!["al1".to_string()]);
        assert!(store.get_artwork("emb").unwrap().is_none());
        assert_eq!(store.get_artwork_for_track("t1").unwrap().unwrap().id, "dir");
    }

    #[test]
    fn orphan_cleanup_keeps_referenced_rows() {
        let store = SqliteLibraryStore::in_memory().unwrap();
        let track = track_at("/m/1.mp3");
        store.save_track(&track).unwrap();

        store
            .save_artwork(&artwork("kept", Some(&track.id), None))
            .unwrap();
        store
            .save_artwork(&artwork("orphan", Some("gone"), None))
            .unwrap();

        assert_eq!(store.delete_orphaned_artwork().unwrap(), 1);
        assert!(store.get_artwork("kept").unwrap().is_some());
        assert!(store.get_artwork("orphan").unwrap().is_none());
    }
}
