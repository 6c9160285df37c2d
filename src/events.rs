//! Typed event streams, one broadcast channel per category.
//!
//! Consumers subscribe only to the categories they care about and unsubscribe
//! by dropping the receiver. Sending never blocks and is a no-op without
//! subscribers.

use crate::scanner::{ScanProgress, ScanSummary};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Started { roots: Vec<PathBuf> },
    Progress(ScanProgress),
    Completed(ScanSummary),
    Error { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackEvent {
    /// A file went through the pipeline (whatever the outcome).
    Scanned { path: String },
    Added { track_id: String, path: String },
    Changed { track_id: String, path: String },
    Removed { track_id: String, path: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryEvent {
    Added { path: PathBuf },
    Removed { path: PathBuf, tracks_removed: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatcherEvent {
    Started { root: PathBuf },
    Stopped { root: PathBuf },
    Error { root: PathBuf, message: String },
}

#[derive(Clone)]
pub struct LibraryEvents {
    scan_tx: broadcast::Sender<ScanEvent>,
    track_tx: broadcast::Sender<TrackEvent>,
    directory_tx: broadcast::Sender<DirectoryEvent>,
    watcher_tx: broadcast::Sender<WatcherEvent>,
}

impl Default for LibraryEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryEvents {
    pub fn new() -> Self {
        let (scan_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (track_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (directory_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (watcher_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            scan_tx,
            track_tx,
            directory_tx,
            watcher_tx,
        }
    }

    pub fn subscribe_scan(&self) -> broadcast::Receiver<ScanEvent> {
        self.scan_tx.subscribe()
    }

    pub fn subscribe_tracks(&self) -> broadcast::Receiver<TrackEvent> {
        self.track_tx.subscribe()
    }

    pub fn subscribe_directories(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.directory_tx.subscribe()
    }

    pub fn subscribe_watcher(&self) -> broadcast::Receiver<WatcherEvent> {
        self.watcher_tx.subscribe()
    }

    pub(crate) fn scan(&self, event: ScanEvent) {
        let _ = self.scan_tx.send(event);
    }

    pub(crate) fn track(&self, event: TrackEvent) {
        let _ = self.track_tx.send(event);
    }

    pub(crate) fn directory(&self, event: DirectoryEvent) {
        let _ = self.directory_tx.send(event);
    }

    pub(crate) fn watcher(&self, event: WatcherEvent) {
        let _ = self.watcher_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_only_their_category() {
        let events = LibraryEvents::new();
        let mut tracks = events.subscribe_tracks();
        let mut directories = events.subscribe_directories();

        events.track(TrackEvent::Scanned {
            path: "/m/a.mp3".to_string(),
        });
        assert_eq!(
            tracks.recv().await.unwrap(),
            TrackEvent::Scanned {
                path: "/m/a.mp3".to_string()
            }
        );
        assert!(directories.try_recv().is_err());
    }

    #[test]
    fn sending_without_subscribers_is_harmless() {
        let events = LibraryEvents::new();
        events.watcher(WatcherEvent::Started {
            root: PathBuf::from("/m"),
        });
    }
}
