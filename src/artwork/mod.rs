//! Artwork resolution.
//!
//! A track's artwork is looked up in this order, stopping at the first hit:
//! memory cache, persisted row for the track, the track's own artwork
//! reference, the picture embedded in the file, a cover image in the track's
//! folder, and finally a generated placeholder. Every failure along the way is
//! logged and falls through to the next tier; resolution itself never fails.

mod cache;
mod directory;
mod placeholder;

pub use cache::ArtworkCache;
pub use directory::{best_candidate, is_image_file};
pub use placeholder::{image_dimensions, placeholder_png};

use crate::fs::LibraryFs;
use crate::library_store::{
    album_id, directory_artwork_id, now_millis, AlbumArtwork, ArtworkSource, SqliteLibraryStore,
    Track,
};
use crate::metadata::{ExtractedPicture, PictureExtractor};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cache key and id of the generated fallback image.
pub const PLACEHOLDER_KEY: &str = "__placeholder__";

#[derive(Clone, Debug)]
pub struct ArtworkSettings {
    pub cache_size: usize,
    pub preload_batch_size: usize,
    pub preload_pause: Duration,
}

impl Default for ArtworkSettings {
    fn default() -> Self {
        Self {
            cache_size: 256,
            preload_batch_size: 10,
            preload_pause: Duration::from_millis(50),
        }
    }
}

pub struct ArtworkResolver {
    store: SqliteLibraryStore,
    fs: Arc<dyn LibraryFs>,
    pictures: Arc<dyn PictureExtractor>,
    cache: ArtworkCache,
    placeholder: Arc<AlbumArtwork>,
    settings: ArtworkSettings,
}

impl ArtworkResolver {
    pub fn new(
        store: SqliteLibraryStore,
        fs: Arc<dyn LibraryFs>,
        pictures: Arc<dyn PictureExtractor>,
        settings: ArtworkSettings,
    ) -> Self {
        let data = placeholder_png();
        let placeholder = Arc::new(AlbumArtwork {
            id: PLACEHOLDER_KEY.to_string(),
            track_id: None,
            album_id: None,
            size: data.len() as i64,
            data,
            format: "image/png".to_string(),
            width: Some(placeholder::PLACEHOLDER_SIZE),
            height: Some(placeholder::PLACEHOLDER_SIZE),
            source: ArtworkSource::Generated,
            source_path: None,
            created_at: 0,
        });
        let cache = ArtworkCache::new(settings.cache_size);
        cache.insert(PLACEHOLDER_KEY.to_string(), placeholder.clone());
        Self {
            store,
            fs,
            pictures,
            cache,
            placeholder,
            settings,
        }
    }

    pub fn is_placeholder(artwork: &AlbumArtwork) -> bool {
        artwork.id == PLACEHOLDER_KEY
    }

    fn placeholder(&self) -> Arc<AlbumArtwork> {
        self.cache
            .get(PLACEHOLDER_KEY)
            .unwrap_or_else(|| self.placeholder.clone())
    }

    fn remember(&self, key: String, artwork: AlbumArtwork) -> Arc<AlbumArtwork> {
        let artwork = Arc::new(artwork);
        self.cache.insert(key, artwork.clone());
        artwork
    }

    fn new_artwork(
        &self,
        id: Option<&str>,
        track_id: Option<String>,
        track: &Track,
        data: Vec<u8>,
        mime: String,
        source: ArtworkSource,
        source_path: &Path,
    ) -> AlbumArtwork {
        let (width, height) = match image_dimensions(&data) {
            Some((w, h)) => (Some(w), Some(h)),
            None => (None, None),
        };
        AlbumArtwork {
            id: id
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            track_id,
            album_id: track.album_key().map(|(album, artist)| album_id(artist, album)),
            size: data.len() as i64,
            data,
            format: mime,
            width,
            height,
            source,
            source_path: Some(source_path.to_string_lossy().into_owned()),
            created_at: now_millis(),
        }
    }

    /// Persist the picture embedded in `track`'s file and cache it.
    ///
    /// Reuses the track's existing artwork id so rescans update the row in
    /// place. Returns `None` (after logging) if the row could not be written.
    pub fn store_embedded(&self, track: &Track, picture: ExtractedPicture) -> Option<AlbumArtwork> {
        let artwork = self.new_artwork(
            track.artwork_id.as_deref(),
            Some(track.id.clone()),
            track,
            picture.data,
            picture.mime,
            ArtworkSource::Embedded,
            Path::new(&track.file_path),
        );
        match self.store.save_artwork(&artwork) {
            Ok(()) => {
                self.cache
                    .insert(ArtworkCache::track_key(&track.id), Arc::new(artwork.clone()));
                Some(artwork)
            }
            Err(e) => {
                warn!("Failed to persist embedded artwork for {}: {}", track.file_path, e);
                None
            }
        }
    }

    pub fn get_track_artwork(&self, track: &Track) -> Arc<AlbumArtwork> {
        let key = ArtworkCache::track_key(&track.id);
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }

        match self.store.get_artwork_for_track(&track.id) {
            Ok(Some(artwork)) => return self.remember(key, artwork),
            Ok(None) => {}
            Err(e) => warn!("Artwork lookup for track {} failed: {}", track.id, e),
        }

        if let Some(artwork_id) = &track.artwork_id {
            match self.store.get_artwork(artwork_id) {
                Ok(Some(artwork)) => return self.remember(key, artwork),
                Ok(None) => debug!("Track {} references missing artwork {}", track.id, artwork_id),
                Err(e) => warn!("Artwork lookup {} failed: {}", artwork_id, e),
            }
        }

        let path = Path::new(&track.file_path);
        match self.pictures.extract_picture(path) {
            Ok(Some(picture)) => {
                if let Some(artwork) = self.store_embedded(track, picture) {
                    return self.remember(key, artwork);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Embedded artwork extraction failed for {:?}: {}", path, e),
        }

        if let Some(artwork) = self.find_directory_artwork(track) {
            return self.remember(key, artwork);
        }

        let placeholder = self.placeholder();
        self.cache.insert(key, placeholder.clone());
        placeholder
    }

    /// Drop the embedded picture persisted for `track`, after a rescan found
    /// its file no longer carries one.
    pub fn forget_embedded(&self, track: &Track) {
        self.invalidate_track(&track.id);
        match self.store.delete_track_artwork(&track.id, ArtworkSource::Embedded) {
            Ok(albums) => {
                for album in albums {
                    self.invalidate_album(&album);
                }
            }
            Err(e) => warn!("Failed to drop embedded artwork for {}: {}", track.file_path, e),
        }
    }

    /// Persist the cover image in `track`'s folder as artwork of its album.
    ///
    /// Tracks without an album have nothing to attach to and are skipped.
    pub fn attach_directory_artwork(&self, track: &Track) -> Option<AlbumArtwork> {
        let (album, artist) = track.album_key()?;
        let artwork = self.find_directory_artwork(track)?;
        self.invalidate_album(&album_id(artist, album));
        Some(artwork)
    }

    /// Folder cover for `track`, one row per image and album. An existing row
    /// whose size still matches the file is reused without reading it again.
    fn find_directory_artwork(&self, track: &Track) -> Option<AlbumArtwork> {
        let dir = Path::new(&track.file_path).parent()?;
        let entries = match self.fs.list_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not list {:?} for artwork: {}", dir, e);
                return None;
            }
        };
        let candidate = best_candidate(&entries)?;
        let album = track.album_key().map(|(album, artist)| album_id(artist, album));
        let id = directory_artwork_id(&candidate.to_string_lossy(), album.as_deref());
        if let Some(existing) = self.current_directory_row(&id, &candidate) {
            return Some(existing);
        }
        let data = match self.fs.read(&candidate) {
            Ok(data) if !data.is_empty() => data,
            Ok(_) => return None,
            Err(e) => {
                warn!("Could not read artwork {:?}: {}", candidate, e);
                return None;
            }
        };
        let mime = infer::get(&data)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let artwork = self.new_artwork(
            Some(&id),
            None,
            track,
            data,
            mime,
            ArtworkSource::Directory,
            &candidate,
        );
        if let Err(e) = self.store.save_artwork(&artwork) {
            warn!("Failed to persist directory artwork {:?}: {}", candidate, e);
        }
        debug!("Using {:?} as artwork for {}", candidate, track.file_path);
        Some(artwork)
    }

    fn current_directory_row(&self, id: &str, candidate: &Path) -> Option<AlbumArtwork> {
        let existing = match self.store.get_artwork(id) {
            Ok(row) => row?,
            Err(e) => {
                warn!("Artwork lookup {} failed: {}", id, e);
                return None;
            }
        };
        let stat = self.fs.stat(candidate).ok()?;
        (existing.size >= 0 && existing.size as u64 == stat.size).then_some(existing)
    }

    pub fn get_album_artwork(&self, album_id: &str) -> Arc<AlbumArtwork> {
        let key = ArtworkCache::album_key(album_id);
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }

        match self.store.get_artwork_for_album(album_id) {
            Ok(Some(artwork)) => return self.remember(key, artwork),
            Ok(None) => {}
            Err(e) => warn!("Artwork lookup for album {} failed: {}", album_id, e),
        }

        match self.store.get_album(album_id) {
            Ok(Some(album)) => {
                if let Some(artwork_id) = &album.artwork_id {
                    if let Ok(Some(artwork)) = self.store.get_artwork(artwork_id) {
                        return self.remember(key, artwork);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Album lookup {} failed: {}", album_id, e),
        }

        let from_track = match self.store.get_tracks_by_album(album_id) {
            Ok(tracks) => tracks.first().map(|t| self.get_track_artwork(t)),
            Err(e) => {
                warn!("Track lookup for album {} failed: {}", album_id, e);
                None
            }
        };
        let artwork = from_track.unwrap_or_else(|| self.placeholder());
        self.cache.insert(key, artwork.clone());
        artwork
    }

    /// Warm the cache for `tracks` in small batches on the blocking pool,
    /// pausing between batches. Returns how many tracks have real artwork.
    pub async fn preload_artwork(self: &Arc<Self>, tracks: Vec<Track>) -> usize {
        let batch_size = self.settings.preload_batch_size.max(1);
        let mut found = 0;
        let batches: Vec<Vec<Track>> = tracks.chunks(batch_size).map(|c| c.to_vec()).collect();
        let batch_count = batches.len();
        for (index, batch) in batches.into_iter().enumerate() {
            let resolver = Arc::clone(self);
            let result = tokio::task::spawn_blocking(move || {
                batch
                    .iter()
                    .filter(|t| !Self::is_placeholder(&resolver.get_track_artwork(t)))
                    .count()
            })
            .await;
            match result {
                Ok(count) => found += count,
                Err(e) => warn!("Artwork preload batch failed: {}", e),
            }
            if index + 1 < batch_count && !self.settings.preload_pause.is_zero() {
                tokio::time::sleep(self.settings.preload_pause).await;
            }
        }
        debug!("Preloaded artwork for {} tracks ({} with art)", tracks.len(), found);
        found
    }

    /// Drop a track's cached artwork, e.g. after its file changed.
    pub fn invalidate_track(&self, track_id: &str) {
        self.cache.remove(&ArtworkCache::track_key(track_id));
    }

    pub fn invalidate_album(&self, album_id: &str) {
        self.cache.remove(&ArtworkCache::album_key(album_id));
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        self.cache
            .insert(PLACEHOLDER_KEY.to_string(), self.placeholder.clone());
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}
