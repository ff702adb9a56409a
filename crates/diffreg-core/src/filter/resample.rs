//! Warping volumes through sampling grids.
//!
//! Labels are always resampled with nearest neighbour so that every output
//! voxel carries a label that exists in the source. Intensities are resampled
//! trilinearly. Both use zero padding and aligned corners.

use burn::tensor::backend::Backend;

use crate::error::{ensure_same_shape, Result};
use crate::image::{LabelVolume, Volume};
use crate::interpolation::GridSampler;
use crate::transform::{flow_to_sampling_grid, DisplacementField, SamplingGrid};

/// Warp a label volume with nearest-neighbour sampling.
///
/// The grid must describe a single volume (`N = 1`).
pub fn warp_labels<B: Backend>(
    labels: &LabelVolume<B>,
    grid: &SamplingGrid<B>,
) -> Result<LabelVolume<B>> {
    let sampled = GridSampler::nearest().sample(labels.to_batched_float(), grid)?;
    let [d, h, w] = grid.spatial_shape();
    Ok(LabelVolume::from_float(sampled.reshape([d, h, w])))
}

/// Warp an intensity volume with trilinear sampling.
///
/// The grid must describe a single volume (`N = 1`).
pub fn warp_volume<B: Backend>(volume: &Volume<B>, grid: &SamplingGrid<B>) -> Result<Volume<B>> {
    let sampled = GridSampler::trilinear().sample(volume.to_batched(), grid)?;
    Volume::from_batched(sampled)
}

/// Warp a label volume by a displacement field of the same spatial shape.
pub fn warp_labels_by_flow<B: Backend>(
    labels: &LabelVolume<B>,
    flow: &DisplacementField<B>,
) -> Result<LabelVolume<B>> {
    ensure_same_shape(&labels.shape(), &flow.spatial_shape())?;
    warp_labels(labels, &flow_to_sampling_grid(flow))
}

/// Warp an intensity volume by a displacement field of the same spatial shape.
pub fn warp_volume_by_flow<B: Backend>(
    volume: &Volume<B>,
    flow: &DisplacementField<B>,
) -> Result<Volume<B>> {
    ensure_same_shape(&volume.shape(), &flow.spatial_shape())?;
    warp_volume(volume, &flow_to_sampling_grid(flow))
}
