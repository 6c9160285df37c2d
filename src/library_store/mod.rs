mod artwork_rows;
mod history;
mod ids;
mod metrics;
mod models;
mod schema;
mod store;

pub use ids::{album_id, artist_id, decode_artist_id, directory_artwork_id, track_id};
pub use models::*;
pub use schema::LIBRARY_MIGRATIONS;
pub use store::{SqliteLibraryStore, DEFAULT_READ_POOL_SIZE};

pub(crate) use store::{ALBUM_COLUMNS, ARTIST_COLUMNS, TRACK_COLUMNS};

/// Current wall clock time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
