//! Reference denoising diffusion registration model.
//!
//! A small convolutional denoiser driven by a linear DDPM schedule. It
//! implements the [`DiffusionModel`](diffreg_registration::inference::DiffusionModel)
//! seam so that the inference orchestrator can run end to end without an
//! external network.

pub mod denoiser;
pub mod diffusion;
pub mod schedule;

pub use denoiser::{ConvDenoiser, ConvDenoiserConfig, Denoiser, DenoiserOutput};
pub use diffusion::{DiffusionConfig, DiffusionRegistration};
pub use schedule::{NoiseSchedule, NoiseScheduleConfig};
