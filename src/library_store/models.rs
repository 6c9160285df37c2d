//! Library models backed by the SQLite store.
//!
//! Tracks are the only rows written directly from scanned files; albums and
//! artists are derived aggregates recomputed from the live track set.

use serde::{Deserialize, Serialize};

use crate::filters::FilterCriteria;

// =============================================================================
// Core Entities
// =============================================================================

/// A single audio file in the library.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Stable id derived from `file_path`.
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub genre: Option<String>,
    pub comment: Option<String>,
    pub lyrics: Option<String>,
    pub duration_ms: i64,
    pub track_number: Option<i32>,
    pub year: Option<i32>,
    /// Lowercase container extension ("mp3", "flac", ...).
    pub format: String,
    /// Kilobits per second.
    pub bitrate: Option<i64>,
    pub sample_rate: Option<i64>,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    /// Artwork row holding the picture embedded in this file, if any.
    pub artwork_id: Option<String>,
    /// Milliseconds since the epoch.
    pub date_added: i64,
    /// File modification time in milliseconds since the epoch.
    pub date_modified: i64,
    pub last_played: Option<i64>,
    pub play_count: i64,
}

impl Track {
    /// Name of the album aggregate this track contributes to, if any.
    pub fn album_key(&self) -> Option<(&str, &str)> {
        match (non_empty(&self.album), non_empty(&self.artist)) {
            (Some(album), Some(artist)) => Some((album, artist)),
            _ => None,
        }
    }

    /// Artist aggregates this track contributes to (artist and, if distinct, album artist).
    pub fn artist_names(&self) -> Vec<&str> {
        let mut names = Vec::with_capacity(2);
        if let Some(artist) = non_empty(&self.artist) {
            names.push(artist);
        }
        if let Some(album_artist) = non_empty(&self.album_artist) {
            if !names.contains(&album_artist) {
                names.push(album_artist);
            }
        }
        names
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Aggregate over tracks sharing an `(album, artist)` pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub track_count: i64,
    pub total_duration_ms: i64,
    pub artwork_id: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
}

/// Aggregate over tracks whose artist or album artist matches `name`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub album_count: i64,
    pub track_count: i64,
    pub total_duration_ms: i64,
}

// =============================================================================
// Artwork
// =============================================================================

/// Where a piece of artwork came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtworkSource {
    Embedded,
    Directory,
    Online,
    /// The built-in placeholder. Never persisted.
    Generated,
}

impl ArtworkSource {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "directory" => ArtworkSource::Directory,
            "online" => ArtworkSource::Online,
            "generated" => ArtworkSource::Generated,
            _ => ArtworkSource::Embedded,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ArtworkSource::Embedded => "embedded",
            ArtworkSource::Directory => "directory",
            ArtworkSource::Online => "online",
            ArtworkSource::Generated => "generated",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlbumArtwork {
    pub id: String,
    pub track_id: Option<String>,
    pub album_id: Option<String>,
    #[serde(skip)]
    pub data: Vec<u8>,
    /// Image mime type ("image/jpeg", "image/png", ...).
    pub format: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size: i64,
    pub source: ArtworkSource,
    pub source_path: Option<String>,
    pub created_at: i64,
}

// =============================================================================
// User State
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedFilter {
    pub name: String,
    pub criteria: FilterCriteria,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub id: i64,
    pub query: String,
    pub search_type: String,
    pub created_at: i64,
}

// =============================================================================
// Instrumentation
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub id: i64,
    pub operation: String,
    pub duration_ms: i64,
    pub created_at: i64,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub operation: String,
    pub count: i64,
    pub avg_duration_ms: f64,
    pub max_duration_ms: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryStats {
    pub tracks: i64,
    pub albums: i64,
    pub artists: i64,
    pub artwork: i64,
    pub total_duration_ms: i64,
    pub total_size_bytes: i64,
}
