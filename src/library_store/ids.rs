//! Deterministic identifiers.
//!
//! Album and artist ids are URL-safe base64 of their names, so distinct names
//! can never collide and the id can be decoded back for debugging. Album ids
//! encode artist and album separately and join them with '.', which is outside
//! the base64 alphabet, so a ':' inside a name cannot shift the split point.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

fn sha256_hex(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn track_id(file_path: &str) -> String {
    sha256_hex(file_path)
}

/// Artwork row id for the image at `source_path` used as cover of `album_id`.
/// A folder image gets one row per album, however many tracks share it.
pub fn directory_artwork_id(source_path: &str, album_id: Option<&str>) -> String {
    let key = format!("{}\n{}", source_path, album_id.unwrap_or_default());
    format!("dir-{}", &sha256_hex(&key)[..32])
}

pub fn album_id(artist: &str, album: &str) -> String {
    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(artist),
        URL_SAFE_NO_PAD.encode(album)
    )
}

pub fn artist_id(artist: &str) -> String {
    URL_SAFE_NO_PAD.encode(artist)
}

/// Reverses [`artist_id`].
pub fn decode_artist_id(id: &str) -> Option<String> {
    URL_SAFE_NO_PAD
        .decode(id)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}
