//! SQLite-backed library repository.
//!
//! All writes go through a single connection. Reads use a small pool of
//! read-only connections when the database is file backed (WAL mode lets them
//! run alongside the writer); in-memory stores route reads through the writer.

use super::ids::{album_id, artist_id};
use super::models::*;
use super::now_millis;
use super::schema::LIBRARY_MIGRATIONS;
use crate::error::{LibraryError, Result};
use crate::perf::PerformanceMonitor;
use crate::sqlite_persistence::{self, AppliedMigration};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

pub(crate) const TRACK_COLUMNS: &str = "id, title, artist, album, album_artist, composer, genre, \
     comment, lyrics, duration_ms, track_number, year, format, bitrate, sample_rate, file_path, \
     file_name, file_size, artwork_id, date_added, date_modified, last_played, play_count";

pub(crate) const ALBUM_COLUMNS: &str = "id, name, artist, track_count, total_duration_ms, artwork_id, year, genre";

pub(crate) const ARTIST_COLUMNS: &str = "id, name, album_count, track_count, total_duration_ms";

pub const DEFAULT_READ_POOL_SIZE: usize = 4;

type SharedConn = Arc<Mutex<Option<Connection>>>;

fn lock(conn: &SharedConn) -> MutexGuard<'_, Option<Connection>> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

/// SQLite-backed store owning every persisted library row.
#[derive(Clone)]
pub struct SqliteLibraryStore {
    write_conn: SharedConn,
    read_pool: Arc<Vec<SharedConn>>,
    read_index: Arc<AtomicUsize>,
    pub(crate) search_history_limit: usize,
    /// Repository operations at least this slow are recorded as metrics.
    slow_operation_threshold: Option<Duration>,
}

impl SqliteLibraryStore {
    /// Open (creating if needed) the library database and run pending migrations.
    ///
    /// Returns `MigrationFailed` if any migration or the post-migration schema
    /// validation fails; the store is never handed out half migrated.
    pub fn open<P: AsRef<Path>>(db_path: P, read_pool_size: usize) -> Result<Self> {
        let db_path = db_path.as_ref();
        let mut write_conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        write_conn.pragma_update(None, "journal_mode", "WAL")?;
        write_conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::initialize(&mut write_conn)?;

        let mut read_pool = Vec::with_capacity(read_pool_size);
        for _ in 0..read_pool_size {
            let read_conn = Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            read_pool.push(Arc::new(Mutex::new(Some(read_conn))));
        }

        info!(
            "Opened library database at {:?} with {} read connections",
            db_path, read_pool_size
        );
        Ok(Self::from_parts(write_conn, read_pool))
    }

    /// In-memory store, used by tests and throwaway indexes.
    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        Self::initialize(&mut conn)?;
        Ok(Self::from_parts(conn, Vec::new()))
    }

    fn from_parts(write_conn: Connection, read_pool: Vec<SharedConn>) -> Self {
        Self {
            write_conn: Arc::new(Mutex::new(Some(write_conn))),
            read_pool: Arc::new(read_pool),
            read_index: Arc::new(AtomicUsize::new(0)),
            search_history_limit: 100,
            slow_operation_threshold: None,
        }
    }

    pub fn with_search_history_limit(mut self, limit: usize) -> Self {
        self.search_history_limit = limit.max(1);
        self
    }

    pub fn with_slow_operation_threshold(mut self, threshold: Duration) -> Self {
        self.slow_operation_threshold = Some(threshold);
        self
    }

    /// Run `f`, recording it as a metric named `operation` when it is slow.
    /// `metadata` describes successful results, typically with row counts.
    pub(crate) fn timed<T>(
        &self,
        operation: &str,
        f: impl FnOnce() -> Result<T>,
        metadata: impl FnOnce(&T) -> serde_json::Value,
    ) -> Result<T> {
        let Some(threshold) = self.slow_operation_threshold else {
            return f();
        };
        PerformanceMonitor::new(self.clone(), threshold).measure_with(operation, f, |result| {
            result.as_ref().ok().map(metadata)
        })
    }

    fn initialize(conn: &mut Connection) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let applied = sqlite_persistence::apply_migrations(conn, LIBRARY_MIGRATIONS, now_millis())?;
        if !applied.is_empty() {
            info!("Applied library migrations: {}", applied.join(", "));
        }
        sqlite_persistence::validate_tables(conn, LIBRARY_MIGRATIONS)?;

        let track_count: i64 = conn.query_row("SELECT COUNT(*) FROM tracks", [], |r| r.get(0))?;
        let album_count: i64 = conn.query_row("SELECT COUNT(*) FROM albums", [], |r| r.get(0))?;
        let artist_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM artists", [], |r| r.get(0))?;
        info!(
            "Library store ready: {} tracks, {} albums, {} artists",
            track_count, album_count, artist_count
        );
        Ok(())
    }

    /// Release every connection. Later calls fail with `NotInitialized`.
    pub fn close(&self) {
        lock(&self.write_conn).take();
        for conn in self.read_pool.iter() {
            lock(conn).take();
        }
        info!("Library store closed");
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.write_conn).is_some()
    }

    /// Run `f` on the single writer connection.
    pub(crate) fn with_write<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = lock(&self.write_conn);
        let conn = guard.as_mut().ok_or(LibraryError::NotInitialized)?;
        f(conn)
    }

    /// Run `f` on a reader connection (the writer when no read pool exists).
    pub(crate) fn with_read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        if self.read_pool.is_empty() {
            return self.with_write(|conn| f(conn));
        }
        let index = self.read_index.fetch_add(1, Ordering::Relaxed) % self.read_pool.len();
        let guard = lock(&self.read_pool[index]);
        let conn = guard.as_ref().ok_or(LibraryError::NotInitialized)?;
        f(conn)
    }

    // =========================================================================
    // Row Parsing
    // =========================================================================

    pub(crate) fn parse_track_row(row: &Row) -> rusqlite::Result<Track> {
        Ok(Track {
            id: row.get("id")?,
            title: row.get("title")?,
            artist: row.get("artist")?,
            album: row.get("album")?,
            album_artist: row.get("album_artist")?,
            composer: row.get("composer")?,
            genre: row.get("genre")?,
            comment: row.get("comment")?,
            lyrics: row.get("lyrics")?,
            duration_ms: row.get("duration_ms")?,
            track_number: row.get("track_number")?,
            year: row.get("year")?,
            format: row.get("format")?,
            bitrate: row.get("bitrate")?,
            sample_rate: row.get("sample_rate")?,
            file_path: row.get("file_path")?,
            file_name: row.get("file_name")?,
            file_size: row.get("file_size")?,
            artwork_id: row.get("artwork_id")?,
            date_added: row.get("date_added")?,
            date_modified: row.get("date_modified")?,
            last_played: row.get("last_played")?,
            play_count: row.get("play_count")?,
        })
    }

    pub(crate) fn parse_album_row(row: &Row) -> rusqlite::Result<Album> {
        Ok(Album {
            id: row.get("id")?,
            name: row.get("name")?,
            artist: row.get("artist")?,
            track_count: row.get("track_count")?,
            total_duration_ms: row.get("total_duration_ms")?,
            artwork_id: row.get("artwork_id")?,
            year: row.get("year")?,
            genre: row.get("genre")?,
        })
    }

    pub(crate) fn parse_artist_row(row: &Row) -> rusqlite::Result<Artist> {
        Ok(Artist {
            id: row.get("id")?,
            name: row.get("name")?,
            album_count: row.get("album_count")?,
            track_count: row.get("track_count")?,
            total_duration_ms: row.get("total_duration_ms")?,
        })
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    fn find_track_by_path(conn: &Connection, file_path: &str) -> Result<Option<Track>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM tracks WHERE file_path = ?1",
            TRACK_COLUMNS
        ))?;
        Ok(stmt
            .query_row(params![file_path], Self::parse_track_row)
            .optional()?)
    }

    /// Insert or update by `file_path`. An existing row keeps its id, date
    /// added, play count and last played time.
    fn upsert_track(conn: &Connection, track: &Track) -> Result<()> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO tracks (
                id, title, artist, album, album_artist, composer, genre, comment, lyrics,
                duration_ms, track_number, year, format, bitrate, sample_rate, file_path,
                file_name, file_size, artwork_id, date_added, date_modified, last_played, play_count
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                       ?17, ?18, ?19, ?20, ?21, ?22, ?23)
             ON CONFLICT(file_path) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                album = excluded.album,
                album_artist = excluded.album_artist,
                composer = excluded.composer,
                genre = excluded.genre,
                comment = excluded.comment,
                lyrics = excluded.lyrics,
                duration_ms = excluded.duration_ms,
                track_number = excluded.track_number,
                year = excluded.year,
                format = excluded.format,
                bitrate = excluded.bitrate,
                sample_rate = excluded.sample_rate,
                file_name = excluded.file_name,
                file_size = excluded.file_size,
                artwork_id = excluded.artwork_id,
                date_modified = excluded.date_modified",
        )?;
        stmt.execute(params![
            track.id,
            track.title,
            track.artist,
            track.album,
            track.album_artist,
            track.composer,
            track.genre,
            track.comment,
            track.lyrics,
            track.duration_ms,
            track.track_number,
            track.year,
            track.format,
            track.bitrate,
            track.sample_rate,
            track.file_path,
            track.file_name,
            track.file_size,
            track.artwork_id,
            track.date_added,
            track.date_modified,
            track.last_played,
            track.play_count,
        ])?;
        Ok(())
    }

    /// Recompute one album aggregate from the live track set.
    pub(crate) fn recompute_album(conn: &Connection, album: &str, artist: &str) -> Result<()> {
        let id = album_id(artist, album);
        let (track_count, total_duration, artwork_id, year, genre): (
            i64,
            i64,
            Option<String>,
            Option<i32>,
            Option<String>,
        ) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(duration_ms), 0),
                    COALESCE(MAX(artwork_id), (
                        SELECT id FROM album_artwork WHERE album_id = ?3
                        ORDER BY (source = 'embedded') DESC, created_at DESC, rowid DESC LIMIT 1
                    )),
                    MAX(year), MAX(genre)
             FROM tracks WHERE album = ?1 AND artist = ?2",
            params![album, artist, id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )?;

        if track_count == 0 {
            let removed = conn.execute("DELETE FROM albums WHERE id = ?1", params![id])?;
            if removed > 0 {
                debug!("Removed empty album '{}' by '{}'", album, artist);
            }
            return Ok(());
        }

        conn.execute(
            "INSERT INTO albums (id, name, artist, track_count, total_duration_ms, artwork_id, year, genre, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                track_count = excluded.track_count,
                total_duration_ms = excluded.total_duration_ms,
                artwork_id = excluded.artwork_id,
                year = excluded.year,
                genre = excluded.genre,
                updated_at = excluded.updated_at",
            params![
                id,
                album,
                artist,
                track_count,
                total_duration,
                artwork_id,
                year,
                genre,
                now_millis()
            ],
        )?;
        Ok(())
    }

    /// Recompute one artist aggregate, matching both artist and album artist.
    pub(crate) fn recompute_artist(conn: &Connection, name: &str) -> Result<()> {
        let id = artist_id(name);
        let (track_count, total_duration, album_count): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(duration_ms), 0), COUNT(DISTINCT album)
             FROM tracks WHERE artist = ?1 OR album_artist = ?1",
            params![name],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;

        if track_count == 0 {
            let removed = conn.execute("DELETE FROM artists WHERE id = ?1", params![id])?;
            if removed > 0 {
                debug!("Removed empty artist '{}'", name);
            }
            return Ok(());
        }

        conn.execute(
            "INSERT INTO artists (id, name, album_count, track_count, total_duration_ms, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                album_count = excluded.album_count,
                track_count = excluded.track_count,
                total_duration_ms = excluded.total_duration_ms,
                updated_at = excluded.updated_at",
            params![id, name, album_count, track_count, total_duration, now_millis()],
        )?;
        Ok(())
    }

    pub(crate) fn recompute_aggregates(conn: &Connection, keys: &AggregateKeys) -> Result<()> {
        for (album, artist) in &keys.albums {
            Self::recompute_album(conn, album, artist)?;
        }
        for artist in &keys.artists {
            Self::recompute_artist(conn, artist)?;
        }
        Ok(())
    }

    // =========================================================================
    // Write Operations - Tracks
    // =========================================================================

    /// Persist one track and refresh the aggregates it touches, in one transaction.
    pub fn save_track(&self, track: &Track) -> Result<Track> {
        let track = normalize_track(track);
        self.with_write(|conn| {
            let tx = conn.transaction()?;
            let previous = Self::find_track_by_path(&tx, &track.file_path)?;

            let mut keys = AggregateKeys::default();
            if let Some(previous) = &previous {
                keys.add(previous);
            }
            keys.add(&track);

            Self::upsert_track(&tx, &track)?;
            Self::recompute_aggregates(&tx, &keys)?;
            let saved = Self::find_track_by_path(&tx, &track.file_path)?
                .ok_or(LibraryError::Storage(rusqlite::Error::QueryReturnedNoRows))?;
            tx.commit()?;
            Ok(saved)
        })
    }

    /// Persist many tracks atomically. Either every track and every touched
    /// aggregate lands, or none of them do.
    pub fn save_tracks_batch(&self, tracks: &[Track]) -> Result<usize> {
        if tracks.is_empty() {
            return Ok(0);
        }
        self.timed(
            "save_tracks_batch",
            || self.write_tracks_batch(tracks),
            |saved: &usize| json!({ "rows": saved }),
        )
    }

    fn write_tracks_batch(&self, tracks: &[Track]) -> Result<usize> {
        let tracks: Vec<Track> = tracks.iter().map(normalize_track).collect();
        self.with_write(|conn| {
            let tx = conn.transaction()?;
            let mut keys = AggregateKeys::default();
            for track in &tracks {
                if let Some(previous) = Self::find_track_by_path(&tx, &track.file_path)? {
                    keys.add(&previous);
                }
                keys.add(track);
                Self::upsert_track(&tx, track)?;
            }
            Self::recompute_aggregates(&tx, &keys)?;
            tx.commit()?;
            debug!(
                "Saved batch of {} tracks ({} albums, {} artists refreshed)",
                tracks.len(),
                keys.albums.len(),
                keys.artists.len()
            );
            Ok(tracks.len())
        })
    }

    /// Remove the track stored for `file_path`, returning it if it existed.
    pub fn remove_track_by_path(&self, file_path: &str) -> Result<Option<Track>> {
        self.with_write(|conn| {
            let tx = conn.transaction()?;
            let Some(track) = Self::find_track_by_path(&tx, file_path)? else {
                return Ok(None);
            };
            tx.execute("DELETE FROM tracks WHERE id = ?1", params![track.id])?;
            let mut keys = AggregateKeys::default();
            keys.add(&track);
            Self::recompute_aggregates(&tx, &keys)?;
            tx.commit()?;
            Ok(Some(track))
        })
    }

    /// Remove every track whose path starts with `prefix` and rebuild all
    /// aggregates, in one transaction.
    pub fn remove_tracks_by_directory(&self, prefix: &str) -> Result<usize> {
        let prefix = directory_prefix(prefix);
        let removed = self.timed(
            "remove_tracks_by_directory",
            || {
                self.with_write(|conn| {
                    let tx = conn.transaction()?;
                    let removed = tx.execute(
                        "DELETE FROM tracks WHERE substr(file_path, 1, length(?1)) = ?1",
                        params![prefix],
                    )?;
                    if removed > 0 {
                        Self::rebuild_aggregates_in(&tx)?;
                    }
                    tx.commit()?;
                    Ok(removed)
                })
            },
            |removed: &usize| json!({ "rows": removed }),
        )?;
        info!("Removed {} tracks under {}", removed, prefix);
        Ok(removed)
    }

    /// Bump play count and last-played time. Returns false for unknown ids.
    pub fn update_play_count(&self, track_id: &str) -> Result<bool> {
        self.with_write(|conn| {
            let updated = conn.execute(
                "UPDATE tracks SET play_count = play_count + 1, last_played = ?2 WHERE id = ?1",
                params![track_id, now_millis()],
            )?;
            Ok(updated > 0)
        })
    }

    /// Drop and recompute every album and artist aggregate.
    pub fn rebuild_aggregated_data(&self) -> Result<(usize, usize)> {
        self.timed(
            "rebuild_aggregated_data",
            || {
                self.with_write(|conn| {
                    let tx = conn.transaction()?;
                    let rebuilt = Self::rebuild_aggregates_in(&tx)?;
                    tx.commit()?;
                    Ok(rebuilt)
                })
            },
            |(albums, artists): &(usize, usize)| json!({ "albums": albums, "artists": artists }),
        )
    }

    /// Recompute every aggregate; the caller owns the surrounding transaction.
    fn rebuild_aggregates_in(tx: &Connection) -> Result<(usize, usize)> {
        tx.execute("DELETE FROM albums", [])?;
        tx.execute("DELETE FROM artists", [])?;

        let mut keys = AggregateKeys::default();
        {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT album, artist FROM tracks
                 WHERE album IS NOT NULL AND album != '' AND artist IS NOT NULL AND artist != ''",
            )?;
            let pairs = stmt
                .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            keys.albums.extend(pairs);

            let mut stmt = tx.prepare(
                "SELECT artist FROM tracks WHERE artist IS NOT NULL AND artist != ''
                 UNION
                 SELECT album_artist FROM tracks WHERE album_artist IS NOT NULL AND album_artist != ''",
            )?;
            let names = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            keys.artists.extend(names);
        }

        Self::recompute_aggregates(tx, &keys)?;
        info!(
            "Rebuilt aggregates: {} albums, {} artists",
            keys.albums.len(),
            keys.artists.len()
        );
        Ok((keys.albums.len(), keys.artists.len()))
    }

    /// Refresh planner statistics and compact the full-text index.
    pub fn run_maintenance(&self) -> Result<()> {
        self.with_write(|conn| {
            conn.execute_batch(
                "ANALYZE;
                 PRAGMA optimize;
                 INSERT INTO tracks_fts(tracks_fts) VALUES ('optimize');",
            )?;
            Ok(())
        })?;
        debug!("Library store maintenance complete");
        Ok(())
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get_track_by_id(&self, id: &str) -> Result<Option<Track>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM tracks WHERE id = ?1",
                TRACK_COLUMNS
            ))?;
            Ok(stmt.query_row(params![id], Self::parse_track_row).optional()?)
        })
    }

    pub fn get_track_by_path(&self, file_path: &str) -> Result<Option<Track>> {
        self.with_read(|conn| Self::find_track_by_path(conn, file_path))
    }

    pub fn get_all_tracks(&self, limit: usize, offset: usize) -> Result<Vec<Track>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM tracks
                 ORDER BY artist COLLATE NOCASE, album COLLATE NOCASE, track_number, title COLLATE NOCASE
                 LIMIT ?1 OFFSET ?2",
                TRACK_COLUMNS
            ))?;
            let tracks = stmt
                .query_map(params![limit as i64, offset as i64], Self::parse_track_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tracks)
        })
    }

    /// Tracks credited to `artist` either as track artist or album artist.
    pub fn get_tracks_by_artist(&self, artist: &str) -> Result<Vec<Track>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM tracks WHERE artist = ?1 OR album_artist = ?1
                 ORDER BY album COLLATE NOCASE, track_number, title COLLATE NOCASE",
                TRACK_COLUMNS
            ))?;
            let tracks = stmt
                .query_map(params![artist], Self::parse_track_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tracks)
        })
    }

    pub fn get_tracks_by_album(&self, album_id: &str) -> Result<Vec<Track>> {
        self.with_read(|conn| {
            let album: Option<(String, String)> = conn
                .query_row(
                    "SELECT name, artist FROM albums WHERE id = ?1",
                    params![album_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            let Some((name, artist)) = album else {
                return Ok(Vec::new());
            };
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM tracks WHERE album = ?1 AND artist = ?2
                 ORDER BY track_number, title COLLATE NOCASE",
                TRACK_COLUMNS
            ))?;
            let tracks = stmt
                .query_map(params![name, artist], Self::parse_track_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tracks)
        })
    }

    /// Stored paths that live under `prefix`.
    pub fn get_track_paths_under(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = directory_prefix(prefix);
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT file_path FROM tracks WHERE substr(file_path, 1, length(?1)) = ?1",
            )?;
            let paths = stmt
                .query_map(params![prefix], |r| r.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(paths)
        })
    }

    pub fn get_track_count(&self) -> Result<usize> {
        self.with_read(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM tracks", [], |r| r.get(0))?;
            Ok(count as usize)
        })
    }

    pub fn get_album(&self, id: &str) -> Result<Option<Album>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM albums WHERE id = ?1",
                ALBUM_COLUMNS
            ))?;
            Ok(stmt.query_row(params![id], Self::parse_album_row).optional()?)
        })
    }

    pub fn get_all_albums(&self, limit: usize, offset: usize) -> Result<Vec<Album>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM albums ORDER BY name COLLATE NOCASE, artist COLLATE NOCASE
                 LIMIT ?1 OFFSET ?2",
                ALBUM_COLUMNS
            ))?;
            let albums = stmt
                .query_map(params![limit as i64, offset as i64], Self::parse_album_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(albums)
        })
    }

    pub fn get_artist(&self, id: &str) -> Result<Option<Artist>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM artists WHERE id = ?1",
                ARTIST_COLUMNS
            ))?;
            Ok(stmt.query_row(params![id], Self::parse_artist_row).optional()?)
        })
    }

    pub fn get_all_artists(&self, limit: usize, offset: usize) -> Result<Vec<Artist>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM artists ORDER BY name COLLATE NOCASE LIMIT ?1 OFFSET ?2",
                ARTIST_COLUMNS
            ))?;
            let artists = stmt
                .query_map(params![limit as i64, offset as i64], Self::parse_artist_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(artists)
        })
    }

    pub fn get_library_stats(&self) -> Result<LibraryStats> {
        self.with_read(|conn| {
            let (tracks, total_duration_ms, total_size_bytes) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(duration_ms), 0), COALESCE(SUM(file_size), 0) FROM tracks",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )?;
            let albums = conn.query_row("SELECT COUNT(*) FROM albums", [], |r| r.get(0))?;
            let artists = conn.query_row("SELECT COUNT(*) FROM artists", [], |r| r.get(0))?;
            let artwork = conn.query_row("SELECT COUNT(*) FROM album_artwork", [], |r| r.get(0))?;
            Ok(LibraryStats {
                tracks,
                albums,
                artists,
                artwork,
                total_duration_ms,
                total_size_bytes,
            })
        })
    }

    pub fn get_applied_migrations(&self) -> Result<Vec<AppliedMigration>> {
        self.with_read(|conn| Ok(sqlite_persistence::applied_migrations(conn)?))
    }

    /// Version string of the newest applied migration.
    pub fn schema_version(&self) -> Result<Option<String>> {
        self.with_read(|conn| Ok(sqlite_persistence::current_version(conn)?))
    }
}

/// Album pairs and artist names whose aggregates need recomputing.
#[derive(Default)]
pub(crate) struct AggregateKeys {
    pub albums: BTreeSet<(String, String)>,
    pub artists: BTreeSet<String>,
}

impl AggregateKeys {
    pub fn add(&mut self, track: &Track) {
        if let Some((album, artist)) = track.album_key() {
            self.albums.insert((album.to_string(), artist.to_string()));
        }
        for name in track.artist_names() {
            self.artists.insert(name.to_string());
        }
    }
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Trim text fields and turn blank tags into `None`, so aggregate keys match
/// the stored columns exactly.
fn normalize_track(track: &Track) -> Track {
    Track {
        title: track.title.trim().to_string(),
        artist: clean(&track.artist),
        album: clean(&track.album),
        album_artist: clean(&track.album_artist),
        composer: clean(&track.composer),
        genre: clean(&track.genre),
        comment: clean(&track.comment),
        lyrics: clean(&track.lyrics),
        ..track.clone()
    }
}

/// `prefix` with a single trailing separator, so "/music/a" never matches "/music/ab".
fn directory_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches(['/', '\\']);
    format!("{}{}", trimmed, std::path::MAIN_SEPARATOR)
}
