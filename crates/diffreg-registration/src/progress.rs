//! Progress tracking and callbacks for inference runs.
//!
//! The orchestrator reports each evaluated sample to a [`ProgressTracker`],
//! which fans the report out to every registered [`ProgressCallback`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::inference::RunOutcome;

/// Per-sample progress information.
#[derive(Debug, Clone)]
pub struct SampleReport {
    /// Zero-based position of the sample in the dataset.
    pub index: usize,
    /// Total number of samples in the dataset.
    pub total: usize,
    /// Sample identifier.
    pub id: String,
    /// Mean Dice of the moving labels against the fixed labels.
    pub pre_dice: f64,
    /// Mean Dice of the warped moving labels against the fixed labels.
    pub post_dice: f64,
    /// Duration of the model feed and inference calls.
    pub inference_time: Duration,
    /// Whether artifacts were written for this sample.
    pub saved: bool,
    /// Time elapsed since the run started.
    pub elapsed: Duration,
}

impl SampleReport {
    /// Number of samples evaluated so far, this one included.
    pub fn completed(&self) -> usize {
        self.index + 1
    }

    /// Calculate progress percentage.
    pub fn progress_percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed() as f64 / self.total as f64 * 100.0
    }

    /// Estimated time to finish the remaining samples.
    pub fn estimated_remaining(&self) -> Duration {
        let per_sample = self.elapsed.as_secs_f64() / self.completed() as f64;
        let remaining = self.total.saturating_sub(self.completed());
        Duration::from_secs_f64(per_sample * remaining as f64)
    }
}

/// Progress callback trait for monitoring inference runs.
pub trait ProgressCallback: Send + Sync {
    /// Called after every evaluated sample.
    fn on_sample(&self, report: &SampleReport);

    /// Called when the run starts.
    fn on_start(&self, _total: usize) {
        // Default: no-op
    }

    /// Called when the run ends without error.
    fn on_finish(&self, _outcome: &RunOutcome) {
        // Default: no-op
    }

    /// Called when the run fails.
    fn on_error(&self, _error: &str) {
        // Default: no-op
    }
}

/// Console progress callback that logs to tracing.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    /// Log interval (samples).
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 1 }
    }
}

impl ConsoleProgressCallback {
    /// Create a new console progress callback.
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_sample(&self, report: &SampleReport) {
        if report.completed() % self.log_interval == 0 || report.completed() == report.total {
            tracing::info!(
                "Sample {}/{} ({:.1}%) | {} | Dice {:.4} -> {:.4} | {:.3}s | ETA: {:.1}s",
                report.completed(),
                report.total,
                report.progress_percent(),
                report.id,
                report.pre_dice,
                report.post_dice,
                report.inference_time.as_secs_f64(),
                report.estimated_remaining().as_secs_f64()
            );
        }
    }

    fn on_start(&self, total: usize) {
        tracing::info!("Begin model evaluation over {} samples", total);
    }

    fn on_finish(&self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Completed(summary) => {
                tracing::info!("Evaluation completed over {} samples", summary.len())
            }
            RunOutcome::StopRequested { reason, partial } => tracing::warn!(
                "Evaluation stopped after {} samples: {}",
                partial.len(),
                reason
            ),
            RunOutcome::Cancelled { partial } => {
                tracing::warn!("Evaluation cancelled after {} samples", partial.len())
            }
        }
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Evaluation failed: {}", error);
    }
}

/// History callback that records every sample report.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<SampleReport>>>,
}

impl HistoryCallback {
    /// Create a new history callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the recorded history.
    pub fn get_history(&self) -> Vec<SampleReport> {
        lock(&self.history).clone()
    }

    /// Clear the history.
    pub fn clear(&self) {
        lock(&self.history).clear();
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_sample(&self, report: &SampleReport) {
        lock(&self.history).push(report.clone());
    }
}

/// Progress tracker that manages multiple callbacks.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    start_time: Arc<Mutex<Option<Instant>>>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback.
    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    /// Start tracking.
    pub fn start(&self, total: usize) {
        *lock(&self.start_time) = Some(Instant::now());
        for callback in &self.callbacks {
            callback.on_start(total);
        }
    }

    /// Time elapsed since [`ProgressTracker::start`].
    pub fn elapsed(&self) -> Duration {
        lock(&self.start_time)
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Report an evaluated sample.
    pub fn sample(&self, report: &SampleReport) {
        for callback in &self.callbacks {
            callback.on_sample(report);
        }
    }

    /// Report the end of the run.
    pub fn finish(&self, outcome: &RunOutcome) {
        for callback in &self.callbacks {
            callback.on_finish(outcome);
        }
    }

    /// Report error.
    pub fn error(&self, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(error);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(index: usize, total: usize, elapsed: u64) -> SampleReport {
        SampleReport {
            index,
            total,
            id: format!("patient{index:03}"),
            pre_dice: 0.5,
            post_dice: 0.8,
            inference_time: Duration::from_millis(100),
            saved: false,
            elapsed: Duration::from_secs(elapsed),
        }
    }

    #[test]
    fn test_sample_report_progress() {
        let info = report(9, 100, 10);
        assert_eq!(info.completed(), 10);
        assert_eq!(info.progress_percent(), 10.0);
        assert_eq!(info.estimated_remaining(), Duration::from_secs(90));
    }

    #[test]
    fn test_history_callback() {
        let history = Arc::new(HistoryCallback::new());
        let mut tracker = ProgressTracker::new();
        tracker.add_callback(history.clone());

        tracker.start(2);
        tracker.sample(&report(0, 2, 1));
        tracker.sample(&report(1, 2, 2));

        let recorded = history.get_history();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[1].id, "patient001");

        history.clear();
        assert!(history.get_history().is_empty());
    }
}
