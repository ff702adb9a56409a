//! Interpolation types and operations.
//!
//! This module provides the grid sampler used to resample volumes through
//! a normalized sampling grid.

pub mod grid_sampler;

pub use grid_sampler::{GridSampler, InterpolationMode, PaddingMode};
