use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Counting,
    Processing,
    PostProcessing,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub current_file: Option<String>,
    /// Sub-operation in flight ("extracting", "saving", "rebuilding aggregates", ...).
    pub operation: String,
    pub processed: usize,
    pub total: usize,
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub eta_ms: Option<u64>,
}

/// Tracks counts and decides when the next progress report is due.
pub(crate) struct ProgressTracker {
    interval: Duration,
    last_report: Option<Instant>,
    started: Instant,
    work_time: Duration,
    worked_files: usize,
    pub progress: ScanProgress,
}

impl ProgressTracker {
    pub fn new(total: usize, interval: Duration) -> Self {
        Self {
            interval,
            last_report: None,
            started: Instant::now(),
            work_time: Duration::ZERO,
            worked_files: 0,
            progress: ScanProgress {
                phase: ScanPhase::Processing,
                current_file: None,
                operation: "starting".to_string(),
                processed: 0,
                total,
                added: 0,
                updated: 0,
                skipped: 0,
                errors: 0,
                eta_ms: None,
            },
        }
    }

    /// Fold the processing time of `files` files into the running average.
    pub fn record_work(&mut self, files: usize, elapsed: Duration) {
        self.work_time += elapsed;
        self.worked_files += files;
    }

    fn eta(&self) -> Option<u64> {
        if self.worked_files == 0 {
            return None;
        }
        let remaining = self.progress.total.saturating_sub(self.progress.processed) as u128;
        let average = self.work_time.as_millis() / self.worked_files as u128;
        Some((average * remaining).min(u64::MAX as u128) as u64)
    }

    /// Returns a snapshot when the throttle interval has passed, or when
    /// `force` is set (phase changes and the final file).
    pub fn report(&mut self, force: bool) -> Option<ScanProgress> {
        let now = Instant::now();
        let due = match self.last_report {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };
        if !(due || force) {
            return None;
        }
        self.last_report = Some(now);
        self.progress.eta_ms = self.eta();
        Some(self.progress.clone())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
