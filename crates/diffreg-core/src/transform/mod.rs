//! Displacement fields and the flow-to-grid coordinate convention.
//!
//! This module provides the dense displacement field emitted by the
//! diffusion model, the normalized sampling grid consumed by the resampler,
//! and the single conversion between the two.

pub mod displacement_field;
pub mod convention;

pub use displacement_field::{DisplacementField, SamplingGrid};
pub use convention::{
    flow_to_sampling_grid, identity_sampling_grid, normalize_coordinates, Axis,
    FLOW_CHANNEL_ORDER, GRID_CHANNEL_ORDER,
};
