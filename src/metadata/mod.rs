//! Turns one audio file into a normalized [`Track`].

mod lofty_extractor;
mod title;

pub use lofty_extractor::LoftyExtractor;
pub use title::title_from_file_name;

use crate::error::Result;
use crate::fs::FileStat;
use crate::library_store::{now_millis, track_id, Track};
use std::path::Path;

/// First embedded picture of a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedPicture {
    pub data: Vec<u8>,
    pub mime: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedTrack {
    pub track: Track,
    pub picture: Option<ExtractedPicture>,
}

/// Tag fields and stream properties as read from the container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub genre: Option<String>,
    pub comment: Option<String>,
    pub lyrics: Option<String>,
    pub track_number: Option<i32>,
    pub year: Option<i32>,
    pub duration_ms: i64,
    pub bitrate: Option<i64>,
    pub sample_rate: Option<i64>,
}

/// Parses one file into a track record. A failure concerns only that file.
pub trait TrackExtractor: Send + Sync {
    /// `existing` is the stored record for the same path, if any; its id and
    /// date added must be carried over.
    fn extract(&self, path: &Path, existing: Option<&Track>) -> Result<ExtractedTrack>;
}

/// Reads only the embedded picture of a file.
pub trait PictureExtractor: Send + Sync {
    fn extract_picture(&self, path: &Path) -> Result<Option<ExtractedPicture>>;
}

fn lowercase_extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Assemble the stored record from parsed tags and the file's stat.
pub fn build_track(path: &Path, stat: &FileStat, tags: TrackTags, existing: Option<&Track>) -> Track {
    let file_path = path.to_string_lossy().into_owned();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_path.clone());
    let title = tags
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| title_from_file_name(&file_name));

    let (id, date_added, play_count, last_played, artwork_id) = match existing {
        Some(existing) => (
            existing.id.clone(),
            existing.date_added,
            existing.play_count,
            existing.last_played,
            existing.artwork_id.clone(),
        ),
        None => (track_id(&file_path), now_millis(), 0, None, None),
    };

    Track {
        id,
        title,
        artist: tags.artist,
        album: tags.album,
        album_artist: tags.album_artist,
        composer: tags.composer,
        genre: tags.genre,
        comment: tags.comment,
        lyrics: tags.lyrics,
        duration_ms: tags.duration_ms,
        track_number: tags.track_number,
        year: tags.year,
        format: lowercase_extension(path),
        bitrate: tags.bitrate,
        sample_rate: tags.sample_rate,
        file_path,
        file_name,
        file_size: stat.size as i64,
        artwork_id,
        date_added,
        date_modified: stat.modified_ms,
        last_played,
        play_count,
    }
}
