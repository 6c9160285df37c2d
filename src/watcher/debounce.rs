use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

struct PendingTask {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Per-path table of delayed actions.
///
/// Scheduling a path that already has a pending action cancels that action
/// first, so a burst of events fires once, after the delay of the last one.
/// An action that already started is left to finish.
pub struct PathDebouncer {
    pending: Arc<Mutex<HashMap<PathBuf, PendingTask>>>,
    next_generation: AtomicU64,
    tracker: TaskTracker,
}

impl Default for PathDebouncer {
    fn default() -> Self {
        Self::new()
    }
}

impl PathDebouncer {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            tracker: TaskTracker::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, PendingTask>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `action` once `delay` has passed without another schedule for `path`.
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, path: PathBuf, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let mut pending = self.lock();
        if let Some(previous) = pending.remove(&path) {
            previous.handle.abort();
        }

        let table = Arc::clone(&self.pending);
        let key = path.clone();
        let handle = self.tracker.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
                match table.get(&key) {
                    Some(task) if task.generation == generation => {
                        table.remove(&key);
                    }
                    _ => return,
                }
            }
            action().await;
        });
        pending.insert(path, PendingTask { generation, handle });
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Cancel the pending action for `path`. Returns whether one was pending.
    pub fn cancel(&self, path: &Path) -> bool {
        match self.lock().remove(path) {
            Some(task) => {
                task.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending action for paths under `dir`.
    pub fn cancel_under(&self, dir: &Path) -> usize {
        let mut pending = self.lock();
        let keys: Vec<PathBuf> = pending
            .keys()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect();
        for key in &keys {
            if let Some(task) = pending.remove(key) {
                task.handle.abort();
            }
        }
        keys.len()
    }

    /// Cancel everything pending and wait for actions already running.
    pub async fn shutdown(&self) {
        let drained: Vec<PendingTask> = self.lock().drain().map(|(_, task)| task).collect();
        for task in drained {
            task.handle.abort();
        }
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_action(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_fires_once() {
        let debouncer = PathDebouncer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let path = PathBuf::from("/m/a.mp3");

        debouncer.schedule(path.clone(), Duration::from_millis(100), counter_action(&fired));
        tokio::time::sleep(Duration::from_millis(50)).await;
        debouncer.schedule(path.clone(), Duration::from_millis(100), counter_action(&fired));
        assert_eq!(debouncer.pending_count(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending(&path));
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_paths_fire_independently() {
        let debouncer = PathDebouncer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        debouncer.schedule("/m/a.mp3".into(), Duration::from_millis(10), counter_action(&fired));
        debouncer.schedule("/m/b.mp3".into(), Duration::from_millis(10), counter_action(&fired));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_under_only_touches_that_directory() {
        let debouncer = PathDebouncer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let delay = Duration::from_millis(10);
        debouncer.schedule("/m/rock/a.mp3".into(), delay, counter_action(&fired));
        debouncer.schedule("/m/rock/b.mp3".into(), delay, counter_action(&fired));
        debouncer.schedule("/m/jazz/c.mp3".into(), delay, counter_action(&fired));

        assert_eq!(debouncer.cancel_under(Path::new("/m/rock")), 2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_pending_actions() {
        let debouncer = PathDebouncer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        debouncer.schedule("/m/a.mp3".into(), Duration::from_secs(5), counter_action(&fired));
        debouncer.shutdown().await;
        assert_eq!(debouncer.pending_count(), 0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
