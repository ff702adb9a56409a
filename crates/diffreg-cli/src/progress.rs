//! Terminal progress bar over samples.

use diffreg_registration::{ProgressCallback, RunOutcome, SampleReport};
use indicatif::{ProgressBar, ProgressStyle};

pub struct ProgressBarCallback {
    bar: ProgressBar,
}

impl ProgressBarCallback {
    pub fn new() -> anyhow::Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Ok(Self { bar })
    }

    /// True when stderr is not a terminal and nothing would be drawn.
    pub fn is_hidden(&self) -> bool {
        self.bar.is_hidden()
    }
}

impl ProgressCallback for ProgressBarCallback {
    fn on_start(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_sample(&self, report: &SampleReport) {
        self.bar.set_message(format!(
            "{} Dice {:.3} -> {:.3}",
            report.id, report.pre_dice, report.post_dice
        ));
        self.bar.inc(1);
    }

    fn on_finish(&self, outcome: &RunOutcome) {
        let message = match outcome {
            RunOutcome::Completed(_) => "done",
            RunOutcome::StopRequested { .. } => "stopped",
            RunOutcome::Cancelled { .. } => "cancelled",
        };
        self.bar.finish_with_message(message);
    }

    fn on_error(&self, error: &str) {
        self.bar.abandon_with_message(error.to_string());
    }
}
