//! Image filters.
//!
//! Local window sums for cross-correlation and grid-based warping of
//! intensity and label volumes.

pub mod box_filter;
pub mod resample;

pub use box_filter::BoxFilter;
pub use resample::{warp_labels, warp_labels_by_flow, warp_volume, warp_volume_by_flow};
