//! Coordinate-convention conversion from displacement fields to sampling grids.
//!
//! The diffusion model emits displacements with channels in volume axis order
//! (depth, height, width) and in voxel units. The resampler expects normalized
//! coordinates in [-1, 1] with the coordinate axis last and ordered
//! (x, y, z) = (width, height, depth). [`flow_to_sampling_grid`] is the only
//! place where that permutation happens.
//!
//! ```text
//! DisplacementField [N, 3, D, H, W]   channels (d, h, w), voxels
//!        + identity grid              absolute voxel coordinates
//!        / (size - 1), - 0.5, * 2     normalized to [-1, 1]
//!        reverse channels             (w, h, d) = (x, y, z)
//!        channels last                SamplingGrid [N, D, H, W, 3]
//! ```

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::displacement_field::{DisplacementField, SamplingGrid};
use crate::image::grid::identity_grid;

/// Spatial axis of a (depth, height, width) volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Depth,
    Height,
    Width,
}

impl Axis {
    /// Position of the axis in a `[D, H, W]` shape.
    pub const fn index(self) -> usize {
        match self {
            Axis::Depth => 0,
            Axis::Height => 1,
            Axis::Width => 2,
        }
    }
}

/// Channel order of a [`DisplacementField`].
pub const FLOW_CHANNEL_ORDER: [Axis; 3] = [Axis::Depth, Axis::Height, Axis::Width];

/// Last-axis order of a [`SamplingGrid`]: x = width, y = height, z = depth.
pub const GRID_CHANNEL_ORDER: [Axis; 3] = [Axis::Width, Axis::Height, Axis::Depth];

/// Map absolute voxel coordinates along an axis of `size` voxels to [-1, 1].
///
/// Index 0 maps to -1 and index `size - 1` maps to +1. A singleton axis maps
/// every coordinate to 0.
pub fn normalize_coordinates<B: Backend, const D: usize>(
    coords: Tensor<B, D>,
    size: usize,
) -> Tensor<B, D> {
    if size <= 1 {
        return coords.zeros_like();
    }
    coords
        .div_scalar((size - 1) as f32)
        .sub_scalar(0.5)
        .mul_scalar(2.0)
}

/// Convert a voxel-unit displacement field into a normalized sampling grid.
///
/// Output voxel `(d, h, w)` samples the source at `(d, h, w) + flow(d, h, w)`.
pub fn flow_to_sampling_grid<B: Backend>(flow: &DisplacementField<B>) -> SamplingGrid<B> {
    let [n, _, d, h, w] = flow.dims();
    let sizes = [d, h, w];
    let device = flow.device();

    let identity = identity_grid::<B>(sizes, &device).repeat(&[n, 1, 1, 1, 1]);
    let absolute = flow.tensor().clone() + identity;

    let channels = GRID_CHANNEL_ORDER
        .iter()
        .map(|axis| {
            // Flow channels follow FLOW_CHANNEL_ORDER, i.e. the axis index.
            let c = axis.index();
            let coords = absolute.clone().slice([0..n, c..c + 1, 0..d, 0..h, 0..w]);
            normalize_coordinates(coords, sizes[axis.index()])
        })
        .collect::<Vec<_>>();

    let grid = Tensor::cat(channels, 1).permute([0, 2, 3, 4, 1]);
    SamplingGrid::from_tensor(grid)
}

/// Sampling grid that reproduces a `[D, H, W]` volume unchanged.
pub fn identity_sampling_grid<B: Backend>(shape: [usize; 3], device: &B::Device) -> SamplingGrid<B> {
    flow_to_sampling_grid(&DisplacementField::zeros(shape, device))
}
