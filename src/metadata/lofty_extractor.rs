use super::{build_track, ExtractedPicture, ExtractedTrack, PictureExtractor, TrackExtractor, TrackTags};
use crate::error::{LibraryError, Result};
use crate::fs::{LibraryFs, LocalFs};
use crate::library_store::Track;
use lofty::file::TaggedFile;
use lofty::picture::{Picture, PictureType};
use lofty::prelude::{Accessor, AudioFile, ItemKey, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Tag;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Extractor backed by `lofty`. The file is read once through [`LibraryFs`]
/// and parsed from memory.
#[derive(Clone)]
pub struct LoftyExtractor {
    fs: Arc<dyn LibraryFs>,
}

impl Default for LoftyExtractor {
    fn default() -> Self {
        Self::new(Arc::new(LocalFs))
    }
}

impl LoftyExtractor {
    pub fn new(fs: Arc<dyn LibraryFs>) -> Self {
        Self { fs }
    }

    fn parse(&self, path: &Path, bytes: Vec<u8>) -> Result<TaggedFile> {
        Probe::new(Cursor::new(bytes))
            .guess_file_type()
            .map_err(|e| LibraryError::extraction(path, e))?
            .read()
            .map_err(|e| LibraryError::extraction(path, e))
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim_matches(char::from(0)).trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Leading integer of values like "3/12".
fn parse_number(text: &str) -> Option<i32> {
    text.split('/').next().unwrap_or(text).trim().parse().ok()
}

/// First four digit run of a date-like value ("1999", "1999-04-01").
fn parse_year(text: &str) -> Option<i32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .take(4)
        .collect();
    if digits.len() == 4 {
        digits.parse().ok()
    } else {
        None
    }
}

fn primary_tag(tagged: &TaggedFile) -> Option<&Tag> {
    tagged.primary_tag().or_else(|| tagged.first_tag())
}

fn read_tags(tagged: &TaggedFile) -> TrackTags {
    let properties = tagged.properties();
    let mut tags = TrackTags {
        duration_ms: properties.duration().as_millis().min(i64::MAX as u128) as i64,
        bitrate: properties
            .audio_bitrate()
            .or(properties.overall_bitrate())
            .filter(|b| *b > 0)
            .map(i64::from),
        sample_rate: properties.sample_rate().map(i64::from),
        ..Default::default()
    };

    if let Some(tag) = primary_tag(tagged) {
        tags.title = non_empty(tag.get_string(&ItemKey::TrackTitle));
        tags.artist = non_empty(tag.get_string(&ItemKey::TrackArtist));
        tags.album = non_empty(tag.get_string(&ItemKey::AlbumTitle));
        tags.album_artist = non_empty(tag.get_string(&ItemKey::AlbumArtist));
        tags.composer = non_empty(tag.get_string(&ItemKey::Composer));
        tags.genre = non_empty(tag.get_string(&ItemKey::Genre));
        tags.comment = non_empty(tag.get_string(&ItemKey::Comment));
        tags.lyrics = non_empty(tag.get_string(&ItemKey::Lyrics));
        tags.track_number = tag
            .get_string(&ItemKey::TrackNumber)
            .and_then(parse_number)
            .or_else(|| tag.track().map(|n| n as i32));
        tags.year = tag
            .get_string(&ItemKey::Year)
            .or_else(|| tag.get_string(&ItemKey::RecordingDate))
            .and_then(parse_year)
            .or_else(|| tag.year().map(|y| y as i32));
    }
    tags
}

/// Front cover if present, otherwise the first picture.
fn pick_picture(pictures: &[Picture]) -> Option<&Picture> {
    pictures
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())
}

fn read_picture(tagged: &TaggedFile) -> Option<ExtractedPicture> {
    let picture = pick_picture(primary_tag(tagged)?.pictures())?;
    let data = picture.data().to_vec();
    if data.is_empty() {
        return None;
    }
    let mime = infer::get(&data)
        .map(|kind| kind.mime_type().to_string())
        .or_else(|| picture.mime_type().map(|m| m.as_str().to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Some(ExtractedPicture { data, mime })
}

impl TrackExtractor for LoftyExtractor {
    fn extract(&self, path: &Path, existing: Option<&Track>) -> Result<ExtractedTrack> {
        let stat = self.fs.stat(path)?;
        let bytes = self.fs.read(path)?;
        let tagged = self.parse(path, bytes)?;

        let tags = read_tags(&tagged);
        let picture = read_picture(&tagged);
        debug!(
            "Extracted {:?}: title={:?} artist={:?} picture={}",
            path,
            tags.title,
            tags.artist,
            picture.is_some()
        );
        Ok(ExtractedTrack {
            track: build_track(path, &stat, tags, existing),
            picture,
        })
    }
}

impl PictureExtractor for LoftyExtractor {
    fn extract_picture(&self, path: &Path) -> Result<Option<ExtractedPicture>> {
        let bytes = self.fs.read(path)?;
        let tagged = self.parse(path, bytes)?;
        Ok(read_picture(&tagged))
    }
}
