//! Dataset-level inference driver.
//!
//! For every sample the orchestrator runs the diffusion model, warps the
//! moving labels by the final flow of the trajectory, scores both the raw and
//! the warped labels against the fixed labels, optionally saves artifacts and
//! accumulates the scores into a [`RunSummary`].
//!
//! Three caller-visible endings exist:
//! - [`RunOutcome::Completed`] once the dataset is exhausted,
//! - [`RunOutcome::StopRequested`] when the save cap is reached and the
//!   configuration asks to stop there,
//! - [`RunOutcome::Cancelled`] when the [`CancellationToken`] is set.
//!
//! Any error aborts the run.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use burn::tensor::backend::Backend;
use diffreg_core::filter::warp_labels_by_flow;
use diffreg_core::transform::DisplacementField;
use tracing::{debug, info, warn};

use super::cancel::CancellationToken;
use super::config::{InferenceConfig, OutputMode};
use super::dataset::{RegistrationDataset, Sample};
use super::model::{DiffusionModel, Trajectory};
use super::output::ExampleWriter;
use super::summary::{RunSummary, SampleRecord};
use crate::error::Result;
use crate::metric::DiceMetric;
use crate::progress::{ProgressCallback, ProgressTracker, SampleReport};

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every sample was evaluated.
    Completed(RunSummary),
    /// The save cap was reached with `stop_after_save_cap` set.
    StopRequested { reason: String, partial: RunSummary },
    /// The cancellation token was set.
    Cancelled { partial: RunSummary },
}

impl RunOutcome {
    /// Summary of the samples evaluated before the run ended.
    pub fn summary(&self) -> &RunSummary {
        match self {
            RunOutcome::Completed(summary) => summary,
            RunOutcome::StopRequested { partial, .. } => partial,
            RunOutcome::Cancelled { partial } => partial,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// Drives a [`DiffusionModel`] over a [`RegistrationDataset`].
pub struct InferenceOrchestrator<B, M, W>
where
    B: Backend,
    M: DiffusionModel<B>,
    W: ExampleWriter<B>,
{
    config: InferenceConfig,
    dice: DiceMetric,
    model: M,
    writer: W,
    tracker: ProgressTracker,
    cancel: CancellationToken,
    _backend: PhantomData<B>,
}

impl<B, M, W> InferenceOrchestrator<B, M, W>
where
    B: Backend,
    M: DiffusionModel<B>,
    W: ExampleWriter<B>,
{
    /// Create an orchestrator. The configuration is validated here.
    pub fn new(config: InferenceConfig, model: M, writer: W) -> Result<Self> {
        let selection = config.validate()?;
        Ok(Self {
            config,
            dice: DiceMetric::new(selection),
            model,
            writer,
            tracker: ProgressTracker::new(),
            cancel: CancellationToken::new(),
            _backend: PhantomData,
        })
    }

    /// Register a progress callback.
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.tracker.add_callback(callback);
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token observed at every sample boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Evaluate every sample of `dataset` in order.
    pub fn run<D: RegistrationDataset<B>>(&mut self, dataset: &D) -> Result<RunOutcome> {
        let total = dataset.len();
        self.tracker.start(total);
        info!(
            "Scoring labels {:?} ({})",
            self.dice.selection().labels(),
            self.dice.selection().name()
        );

        let mut summary = RunSummary::new(self.dice.selection().labels().to_vec());
        let mut saved = 0;

        for index in 0..total {
            if self.config.stop_after_save_cap && self.config.save_cap_reached(saved) {
                let reason = format!("stopping after {saved} saved example(s)");
                warn!("{}", reason);
                return Ok(self.finish(RunOutcome::StopRequested {
                    reason,
                    partial: summary,
                }));
            }
            if self.cancel.is_cancelled() {
                return Ok(self.finish(RunOutcome::Cancelled { partial: summary }));
            }

            let record = match self.evaluate(dataset, index, saved) {
                Ok(Some(record)) => record,
                Ok(None) => return Ok(self.finish(RunOutcome::Cancelled { partial: summary })),
                Err(e) => {
                    self.tracker.error(&e.to_string());
                    return Err(e);
                }
            };

            if record.saved {
                saved += 1;
            }
            self.tracker.sample(&SampleReport {
                index,
                total,
                id: record.id.clone(),
                pre_dice: record.pre.mean(),
                post_dice: record.post.mean(),
                inference_time: record.inference_time,
                saved: record.saved,
                elapsed: self.tracker.elapsed(),
            });
            summary.push(record)?;
        }

        Ok(self.finish(RunOutcome::Completed(summary)))
    }

    /// Evaluate one sample. `None` means the model was cancelled mid-sample.
    fn evaluate<D: RegistrationDataset<B>>(
        &mut self,
        dataset: &D,
        index: usize,
        saved: usize,
    ) -> Result<Option<SampleRecord>> {
        let sample = dataset.get(index)?;
        sample.validate()?;
        self.config.validate_sample(&sample)?;
        info!("Test Data: {}", sample.id);

        let return_all_steps = self.config.return_all_steps;
        let start = Instant::now();
        let inferred = self
            .model
            .feed(&sample)
            .and_then(|()| self.model.infer(return_all_steps));
        let inference_time = start.elapsed();
        match inferred {
            Err(_) if self.cancel.is_cancelled() => return Ok(None),
            other => other?,
        }

        let trajectory = self.model.current_outputs()?;
        debug!("trajectory of {} frames for {}", trajectory.len(), sample.id);

        let flow = DisplacementField::from_array(&trajectory.final_frame().flow, &sample.device())?;
        let warped = warp_labels_by_flow(&sample.moving_label, &flow)?;

        let post = self.dice.compute(&warped, &sample.fixed_label)?;
        let pre = self.dice.compute(&sample.moving_label, &sample.fixed_label)?;
        info!(
            "---- Original Dice: {:.6} | Deformed Dice: {:.6}",
            pre.mean(),
            post.mean()
        );

        let saved_now = if self.config.save_cap_reached(saved) {
            false
        } else {
            self.save(&sample, &trajectory)?
        };

        Ok(Some(SampleRecord {
            id: sample.id,
            pre,
            post,
            inference_time,
            saved: saved_now,
        }))
    }

    fn save(&mut self, sample: &Sample<B>, trajectory: &Trajectory) -> Result<bool> {
        let written = match self.config.output_mode {
            OutputMode::None => return Ok(false),
            OutputMode::Nifti => self.writer.write_volumes(sample, trajectory)?,
            OutputMode::Png => {
                self.writer
                    .write_snapshots(sample, trajectory, self.config.snapshot_slice)?
            }
        };
        if let Some(last) = written.last() {
            info!("Saved {} files to: {}", written.len(), last.display());
        }
        Ok(true)
    }

    fn finish(&self, outcome: RunOutcome) -> RunOutcome {
        self.tracker.finish(&outcome);
        outcome
    }
}
