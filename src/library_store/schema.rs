//! SQLite schema for the local library database.
//!
//! Every step is additive. Plain tables are declared with the table DSL so they
//! can be validated after startup; the FTS index and its sync triggers are raw DDL.

use crate::sqlite_column;
use crate::sqlite_persistence::{Migration, SqlType, Table};
use rusqlite::Connection;

// =============================================================================
// Core Tables
// =============================================================================

const TRACKS_TABLE: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("rowid", SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", SqlType::Text, non_null = true),
        sqlite_column!("title", SqlType::Text, non_null = true),
        sqlite_column!("artist", SqlType::Text),
        sqlite_column!("album", SqlType::Text),
        sqlite_column!("album_artist", SqlType::Text),
        sqlite_column!("composer", SqlType::Text),
        sqlite_column!("genre", SqlType::Text),
        sqlite_column!("comment", SqlType::Text),
        sqlite_column!("lyrics", SqlType::Text),
        sqlite_column!(
            "duration_ms",
            SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("track_number", SqlType::Integer),
        sqlite_column!("year", SqlType::Integer),
        sqlite_column!("format", SqlType::Text, non_null = true),
        sqlite_column!("bitrate", SqlType::Integer), // kbps
        sqlite_column!("sample_rate", SqlType::Integer),
        sqlite_column!("file_path", SqlType::Text, non_null = true),
        sqlite_column!("file_name", SqlType::Text, non_null = true),
        sqlite_column!(
            "file_size",
            SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("artwork_id", SqlType::Text),
        sqlite_column!("date_added", SqlType::Integer, non_null = true),
        sqlite_column!("date_modified", SqlType::Integer, non_null = true), // file mtime, ms
        sqlite_column!("last_played", SqlType::Integer),
        sqlite_column!(
            "play_count",
            SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        ("idx_tracks_artist", "artist"),
        ("idx_tracks_album_artist_pair", "album, artist"),
        ("idx_tracks_album_artist", "album_artist"),
        ("idx_tracks_genre", "genre"),
        ("idx_tracks_year", "year"),
    ],
    unique_constraints: &[&["id"], &["file_path"]],
};

const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("rowid", SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", SqlType::Text, non_null = true),
        sqlite_column!("name", SqlType::Text, non_null = true),
        sqlite_column!("artist", SqlType::Text, non_null = true),
        sqlite_column!("track_count", SqlType::Integer, non_null = true),
        sqlite_column!("total_duration_ms", SqlType::Integer, non_null = true),
        sqlite_column!("artwork_id", SqlType::Text),
        sqlite_column!("year", SqlType::Integer),
        sqlite_column!("genre", SqlType::Text),
        sqlite_column!("updated_at", SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_albums_name", "name"), ("idx_albums_artist", "artist")],
    unique_constraints: &[&["id"]],
};

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("rowid", SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", SqlType::Text, non_null = true),
        sqlite_column!("name", SqlType::Text, non_null = true),
        sqlite_column!("album_count", SqlType::Integer, non_null = true),
        sqlite_column!("track_count", SqlType::Integer, non_null = true),
        sqlite_column!("total_duration_ms", SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_artists_name", "name")],
    unique_constraints: &[&["id"]],
};

const ALBUM_ARTWORK_TABLE: Table = Table {
    name: "album_artwork",
    columns: &[
        sqlite_column!("rowid", SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", SqlType::Text, non_null = true),
        sqlite_column!("track_id", SqlType::Text),
        sqlite_column!("album_id", SqlType::Text),
        sqlite_column!("data", SqlType::Blob, non_null = true),
        sqlite_column!("format", SqlType::Text, non_null = true), // mime type
        sqlite_column!("width", SqlType::Integer),
        sqlite_column!("height", SqlType::Integer),
        sqlite_column!("size", SqlType::Integer, non_null = true),
        sqlite_column!("source", SqlType::Text, non_null = true), // 'embedded', 'directory', 'online'
        sqlite_column!("source_path", SqlType::Text),
        sqlite_column!("created_at", SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_album_artwork_track", "track_id"),
        ("idx_album_artwork_album", "album_id"),
    ],
    unique_constraints: &[&["id"]],
};

// =============================================================================
// Full-Text Index
// =============================================================================

const TRACKS_FTS_DDL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS tracks_fts USING fts5(
    title,
    artist,
    album,
    genre,
    composer,
    lyrics,
    content='tracks',
    content_rowid='rowid',
    tokenize='unicode61 remove_diacritics 2'
);

CREATE TRIGGER IF NOT EXISTS tracks_fts_after_insert AFTER INSERT ON tracks BEGIN
    INSERT INTO tracks_fts(rowid, title, artist, album, genre, composer, lyrics)
    VALUES (new.rowid, new.title, new.artist, new.album, new.genre, new.composer, new.lyrics);
END;

CREATE TRIGGER IF NOT EXISTS tracks_fts_after_delete AFTER DELETE ON tracks BEGIN
    INSERT INTO tracks_fts(tracks_fts, rowid, title, artist, album, genre, composer, lyrics)
    VALUES ('delete', old.rowid, old.title, old.artist, old.album, old.genre, old.composer, old.lyrics);
END;

CREATE TRIGGER IF NOT EXISTS tracks_fts_after_update AFTER UPDATE ON tracks BEGIN
    INSERT INTO tracks_fts(tracks_fts, rowid, title, artist, album, genre, composer, lyrics)
    VALUES ('delete', old.rowid, old.title, old.artist, old.album, old.genre, old.composer, old.lyrics);
    INSERT INTO tracks_fts(rowid, title, artist, album, genre, composer, lyrics)
    VALUES (new.rowid, new.title, new.artist, new.album, new.genre, new.composer, new.lyrics);
END;
"#;

/// Indexes tracks that were stored before the FTS table existed.
fn rebuild_tracks_fts(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("INSERT INTO tracks_fts(tracks_fts) VALUES ('rebuild')", [])?;
    Ok(())
}

// =============================================================================
// User State and Instrumentation
// =============================================================================

const SAVED_FILTERS_TABLE: Table = Table {
    name: "saved_filters",
    columns: &[
        sqlite_column!("rowid", SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", SqlType::Text, non_null = true),
        sqlite_column!("criteria", SqlType::Text, non_null = true), // JSON
        sqlite_column!("created_at", SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", SqlType::Integer, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["name"]],
};

const SEARCH_HISTORY_TABLE: Table = Table {
    name: "search_history",
    columns: &[
        sqlite_column!("rowid", SqlType::Integer, is_primary_key = true),
        sqlite_column!("query", SqlType::Text, non_null = true),
        sqlite_column!("search_type", SqlType::Text, non_null = true),
        sqlite_column!("created_at", SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_search_history_created", "created_at")],
    unique_constraints: &[],
};

const PERFORMANCE_METRICS_TABLE: Table = Table {
    name: "performance_metrics",
    columns: &[
        sqlite_column!("rowid", SqlType::Integer, is_primary_key = true),
        sqlite_column!("operation", SqlType::Text, non_null = true),
        sqlite_column!("duration_ms", SqlType::Integer, non_null = true),
        sqlite_column!("created_at", SqlType::Integer, non_null = true),
        sqlite_column!("metadata", SqlType::Text), // JSON
    ],
    indices: &[
        ("idx_performance_metrics_operation", "operation"),
        ("idx_performance_metrics_created", "created_at"),
    ],
    unique_constraints: &[],
};

// =============================================================================
// Migrations
// =============================================================================

pub const LIBRARY_MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001",
        description: "tracks, albums, artists and artwork",
        tables: &[TRACKS_TABLE, ALBUMS_TABLE, ARTISTS_TABLE, ALBUM_ARTWORK_TABLE],
        statements: &[],
        backfill: None,
    },
    Migration {
        version: "002",
        description: "full-text index over track metadata",
        tables: &[],
        statements: &[TRACKS_FTS_DDL],
        backfill: Some(rebuild_tracks_fts),
    },
    Migration {
        version: "003",
        description: "saved filters and search history",
        tables: &[SAVED_FILTERS_TABLE, SEARCH_HISTORY_TABLE],
        statements: &[],
        backfill: None,
    },
    Migration {
        version: "004",
        description: "performance metrics",
        tables: &[PERFORMANCE_METRICS_TABLE],
        statements: &[],
        backfill: None,
    },
    Migration {
        version: "005",
        description: "filter indices on date added and play count",
        tables: &[],
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_tracks_date_added ON tracks(date_added);",
            "CREATE INDEX IF NOT EXISTS idx_tracks_play_count ON tracks(play_count);",
        ],
        backfill: None,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_persistence::{apply_migrations, current_version, validate_tables};

    #[test]
    fn schema_creates_and_validates() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn, LIBRARY_MIGRATIONS, 0).unwrap();
        validate_tables(&conn, LIBRARY_MIGRATIONS).unwrap();
        assert_eq!(current_version(&conn).unwrap().as_deref(), Some("005"));
    }

    #[test]
    fn fts_triggers_follow_track_rows() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn, LIBRARY_MIGRATIONS, 0).unwrap();

        conn.execute(
            "INSERT INTO tracks (id, title, artist, format, file_path, file_name, date_added, date_modified)
             VALUES ('t1', 'Intro', 'X', 'mp3', '/m/intro.mp3', 'intro.mp3', 0, 0)",
            [],
        )
        .unwrap();
        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tracks_fts WHERE tracks_fts MATCH 'intro'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);

        conn.execute("UPDATE tracks SET title = 'Outro' WHERE id = 't1'", [])
            .unwrap();
        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tracks_fts WHERE tracks_fts MATCH 'intro'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 0);

        conn.execute("DELETE FROM tracks WHERE id = 't1'", []).unwrap();
        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tracks_fts WHERE tracks_fts MATCH 'outro'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 0);
    }
}
