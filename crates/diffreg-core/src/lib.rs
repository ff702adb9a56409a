//! Core types for diffusion-model deformable registration.
//!
//! Volumes and label volumes in (depth, height, width) order, displacement
//! fields and sampling grids, the flow-to-grid coordinate convention, grid
//! sampling, and the box filter used by local cross-correlation.

pub mod error;
pub mod image;
pub mod transform;
pub mod interpolation;
pub mod filter;

pub use error::{RegistrationError, Result};
pub use image::{LabelVolume, Volume};
pub use transform::{flow_to_sampling_grid, DisplacementField, SamplingGrid};
