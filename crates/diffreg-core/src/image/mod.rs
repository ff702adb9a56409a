//! Volume types and grids.
//!
//! This module provides the intensity and label volumes that flow through
//! registration, plus the identity voxel grid used to turn displacements
//! into absolute coordinates.

pub mod volume;
pub mod grid;

pub use volume::{float_tensor_to_vec, LabelVolume, Volume};
pub use grid::identity_grid;
