//! Inference-time evaluation of a diffusion registration model.
//!
//! The model and dataset are collaborators behind the [`DiffusionModel`] and
//! [`RegistrationDataset`] traits; artifacts are persisted through an
//! [`ExampleWriter`].

pub mod cancel;
pub mod config;
pub mod dataset;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod summary;

pub use cancel::CancellationToken;
pub use config::{InferenceConfig, OutputMode};
pub use dataset::{sample_id_from_path, InMemoryDataset, RegistrationDataset, Sample};
pub use model::{DiffusionModel, Trajectory, TrajectoryFrame};
pub use orchestrator::{InferenceOrchestrator, RunOutcome};
pub use output::ExampleWriter;
pub use summary::{RunSummary, SampleRecord, Stats};
