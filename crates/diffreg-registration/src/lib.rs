//! Losses, Dice evaluation and the inference orchestrator for diffusion-model
//! deformable registration.

pub mod error;
pub mod inference;
pub mod metric;
pub mod progress;
pub mod regularization;

pub use error::{RegistrationError, Result};
pub use inference::{InferenceConfig, InferenceOrchestrator, RunOutcome, RunSummary};
pub use metric::{DiceMetric, DiceScores, LabelSelection, LocalCrossCorrelation, Metric};
pub use progress::{ConsoleProgressCallback, HistoryCallback, ProgressCallback, ProgressTracker, SampleReport};
pub use regularization::{GradientPenalty, Penalty, Regularizer};
